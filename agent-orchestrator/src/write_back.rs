use common::{error::AppError, storage::db::SurrealDbClient};
use job_queue::job::{EnqueueOptions, Job};
use serde_json::json;

use crate::classify::IntentType;
use crate::tools::ToolSpec;
use crate::TurnContext;

/// System-prompt instruction telling the model to write asserted facts back
/// into the knowledge base without asking permission, per §4.8's Write
/// responsibility. Appended to the system message only when the turn's
/// intent makes write-back eligible.
pub const WRITE_BACK_INSTRUCTION: &str = "When the user states a fact about the deal (a number, \
    a correction, a decision), call index_to_knowledge_base with that fact and acknowledge it \
    naturally in your reply. Do not ask permission first. Do not call index_to_knowledge_base for \
    questions, greetings, opinions, or remarks about the conversation itself.";

/// Whether to attach the write-back tool/instruction to this turn at all.
/// The actual "is this an assertion worth persisting" judgment is the
/// model's, per `WRITE_BACK_INSTRUCTION` — this only saves the tool-spec
/// tokens on turns the classifier is confident are pure greeting/meta
/// chatter, where a persistable assertion is very unlikely.
pub fn is_write_back_eligible(intent: IntentType) -> bool {
    !matches!(intent, IntentType::Conversational)
}

fn source_channel_str(is_correction: bool) -> &'static str {
    if is_correction {
        "qa_response"
    } else {
        "analyst_chat"
    }
}

/// Enqueues an `index_episode` job rather than ingesting synchronously, so
/// the conversational hot path never blocks on embedding/extraction latency.
pub async fn index_to_knowledge_base(
    content: &str,
    intent: IntentType,
    ctx: &TurnContext,
    db: &SurrealDbClient,
) -> Result<String, AppError> {
    let payload = json!({
        "org_id": ctx.org_id,
        "deal_id": ctx.deal_id,
        "body": content,
        "source_channel": source_channel_str(matches!(intent, IntentType::Correction)),
        "source_description": format!("conversational write-back from {}", ctx.user_id),
    });

    Job::enqueue("index_episode", payload, EnqueueOptions::default(), db).await
}

/// The tool spec exposed to the LLM for the write-back responsibility. Not
/// part of `tools.rs`'s tier registry: every tier can write back, since
/// the instruction fires regardless of which tool tier loaded for the turn.
pub fn write_back_tool_spec() -> ToolSpec {
    ToolSpec {
        name: "index_to_knowledge_base",
        description: "Record an analyst-asserted fact into the deal's knowledge base.",
        parameters: json!({
            "type": "object",
            "properties": {
                "content": { "type": "string" },
                "source_type": { "type": "string", "enum": ["analyst_chat", "qa_response", "meeting_note"] }
            },
            "required": ["content"]
        }),
    }
}
