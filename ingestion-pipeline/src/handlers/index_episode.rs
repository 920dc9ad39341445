use async_trait::async_trait;
use chrono::Utc;
use common::error::AppError;
use job_queue::{runtime::Context, HandlerOutcome, JobHandler};
use knowledge_graph::SourceChannel;
use serde_json::{json, Value};

use super::common::{group_id, outcome_for_error, require_str, IngestionDeps};

/// Handles `index_episode`, enqueued by the agent orchestrator's write-back
/// tool when a user utterance asserts a fact worth persisting outside the
/// document pipeline (a Q&A answer, an analyst correction, a meeting note).
pub struct IndexEpisodeHandler {
    pub deps: IngestionDeps,
}

#[async_trait]
impl JobHandler for IndexEpisodeHandler {
    async fn handle(&self, payload: Value, ctx: Context) -> HandlerOutcome {
        match self.run(payload, &ctx).await {
            Ok(output) => HandlerOutcome::Success(output),
            Err(err) => outcome_for_error(err),
        }
    }
}

impl IndexEpisodeHandler {
    async fn run(&self, payload: Value, ctx: &Context) -> Result<Value, AppError> {
        let body = require_str(&payload, "body")?;
        let deal_id = ctx
            .deal_id
            .as_deref()
            .ok_or_else(|| AppError::Validation("job payload missing deal_id".into()))?;

        let source_channel = match payload.get("source_channel").and_then(Value::as_str) {
            Some("qa_response") => SourceChannel::QaResponse,
            Some("analyst_chat") => SourceChannel::AnalystChat,
            Some("meeting_note") => SourceChannel::MeetingNote,
            _ => SourceChannel::AnalystChat,
        };
        let source_description = payload
            .get("source_description")
            .and_then(Value::as_str)
            .unwrap_or("conversational write-back")
            .to_string();

        let group = group_id(&ctx.org_id, deal_id);
        let episode_id = self
            .deps
            .graph
            .add_episode(&group, body, source_channel, Utc::now(), &source_description, None)
            .await?;

        Ok(json!({ "episode_id": episode_id }))
    }
}
