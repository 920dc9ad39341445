pub mod classify;
pub mod compress;
pub mod routing;
pub mod specialists;
pub mod streaming;
pub mod tools;
pub mod write_back;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
        ChatCompletionRequestSystemMessage, ChatCompletionRequestToolMessageArgs,
        ChatCompletionRequestUserMessage, ChatCompletionTool, ChatCompletionToolType,
        CreateChatCompletionRequestArgs, FunctionObject,
    },
    Client,
};
use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            llm_usage::LlmUsage,
            message::{format_history, Message, MessageRole},
        },
    },
    utils::cache::SharedCache,
};
use knowledge_graph::KnowledgeGraphStore;
use retrieval_pipeline::{RetrievalFilters, RetrievalService};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use classify::{classify_cached, skips_retrieval, Complexity};
use routing::{route_for_complexity, ModelRoute};
use tools::{registry_for_tier, ToolOutput, ToolTier};

const TOOL_CACHE_NAMESPACE: &str = "cache:tool:";
const TOOL_CACHE_TTL: Duration = Duration::from_secs(1800);
const MAX_TOOL_ROUNDS: u32 = 4;

/// Everything a turn needs that isn't conversation content: tenancy,
/// identity, and the cancellation signal the caller can fire mid-turn.
#[derive(Debug, Clone)]
pub struct TurnContext {
    pub org_id: String,
    pub deal_id: String,
    pub user_id: String,
    pub conversation_id: String,
    pub cancel: CancellationToken,
}

#[derive(Debug, Clone)]
pub struct TurnResult {
    pub content: String,
    pub sources: Vec<String>,
    pub tool_calls: Value,
    pub tokens_used: u32,
    pub cancelled: bool,
}

fn base_system_prompt() -> &'static str {
    "You are a due-diligence analyst assistant. Answer using the provided context and tools; \
     cite sources by name when you use them. If you don't know, say so rather than guessing."
}

fn tool_to_chat_completion_tool(spec: tools::ToolSpec) -> ChatCompletionTool {
    ChatCompletionTool {
        r#type: ChatCompletionToolType::Function,
        function: FunctionObject {
            name: spec.name.to_string(),
            description: Some(spec.description.to_string()),
            parameters: Some(spec.parameters),
            strict: None,
        },
    }
}

pub struct OrchestratorService {
    db: Arc<SurrealDbClient>,
    graph: Arc<KnowledgeGraphStore>,
    retrieval: Arc<RetrievalService>,
    llm: Client<OpenAIConfig>,
    cache: Arc<SharedCache>,
}

impl OrchestratorService {
    pub fn new(
        db: Arc<SurrealDbClient>,
        graph: Arc<KnowledgeGraphStore>,
        retrieval: Arc<RetrievalService>,
        llm: Client<OpenAIConfig>,
        cache: Arc<SharedCache>,
    ) -> Self {
        Self { db, graph, retrieval, llm, cache }
    }

    fn tier_for_complexity(complexity: Complexity) -> ToolTier {
        match complexity {
            Complexity::Simple => ToolTier::Simple,
            Complexity::Medium => ToolTier::Medium,
            Complexity::Complex => ToolTier::Complex,
        }
    }

    /// Runs one conversational turn end to end: classify, retrieve (Select),
    /// compress history, dispatch to a specialist or the generic tool loop,
    /// persist the assistant message, and log LLM usage. This is C10's
    /// single entrypoint — `api-router`'s HTTP layer streams by calling
    /// `streaming::stream_final_answer` against the request this builds
    /// instead, once the tool-call loop below has settled.
    #[tracing::instrument(skip(self, history, user_message), fields(org_id = %ctx.org_id, deal_id = %ctx.deal_id))]
    pub async fn process_turn(
        &self,
        ctx: &TurnContext,
        history: &[Message],
        user_message: &str,
    ) -> Result<TurnResult, AppError> {
        let classification = classify_cached(user_message, &self.cache).await;
        tracing::info!(intent = ?classification.intent, complexity = ?classification.complexity, "turn classified");

        if ctx.cancel.is_cancelled() {
            return Ok(TurnResult {
                content: String::new(),
                sources: vec![],
                tool_calls: Value::Null,
                tokens_used: 0,
                cancelled: true,
            });
        }

        let (summary, recent_history) =
            compress::compress_history(history, &self.llm, &classification.suggested_model, &self.cache).await?;

        let route = route_for_complexity(classification.complexity);

        if classification.complexity == Complexity::Complex {
            if let Some(specialist_output) =
                specialists::dispatch(user_message, ctx, &self.db, &self.graph, &self.llm, &route.model).await?
            {
                let (content, citations) = specialists::synthesize(vec![specialist_output]);
                self.finish_turn(ctx, &recent_history, user_message, &content, &citations, &route, Value::Null, 0)
                    .await?;
                return Ok(TurnResult {
                    content,
                    sources: citations,
                    tool_calls: Value::Null,
                    tokens_used: 0,
                    cancelled: false,
                });
            }
        }

        let retrieved_context = if skips_retrieval(user_message, classification.intent) {
            None
        } else {
            let filters = RetrievalFilters::default();
            let assembled = self.retrieval.retrieve(&ctx.org_id, &ctx.deal_id, user_message, Some(5), filters).await?;
            if assembled.is_empty() {
                None
            } else {
                Some(assembled)
            }
        };

        let tier = Self::tier_for_complexity(classification.complexity);
        let result = self
            .run_tool_loop(
                ctx,
                &recent_history,
                summary.as_deref(),
                retrieved_context.as_ref(),
                user_message,
                classification.intent,
                tier,
                &route,
            )
            .await?;

        Ok(result)
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_tool_loop(
        &self,
        ctx: &TurnContext,
        history: &[Message],
        summary: Option<&str>,
        retrieved: Option<&retrieval_pipeline::assembly::AssembledContext>,
        user_message: &str,
        intent: classify::IntentType,
        mut tier: ToolTier,
        route: &ModelRoute,
    ) -> Result<TurnResult, AppError> {
        let mut system_prompt = base_system_prompt().to_string();
        if let Some(summary) = summary {
            system_prompt.push_str("\n\nEarlier in this conversation: ");
            system_prompt.push_str(summary);
        }
        if let Some(context) = retrieved {
            system_prompt.push_str("\n\nRelevant context:\n");
            system_prompt.push_str(&context.text);
        }
        let write_back_eligible = write_back::is_write_back_eligible(intent);
        if write_back_eligible {
            system_prompt.push_str("\n\n");
            system_prompt.push_str(write_back::WRITE_BACK_INSTRUCTION);
        }

        let mut registry = registry_for_tier(tier, self.db.clone(), self.graph.clone(), self.retrieval.clone());
        let mut sources: Vec<String> = retrieved.map(|c| c.citations.iter().map(|ci| ci.source.clone()).collect()).unwrap_or_default();

        let mut messages: Vec<async_openai::types::ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessage::from(system_prompt.as_str()).into(),
        ];
        if !history.is_empty() {
            messages.push(ChatCompletionRequestSystemMessage::from(format_history(history)).into());
        }
        messages.push(ChatCompletionRequestUserMessage::from(user_message).into());

        let mut total_tokens = 0u32;
        let mut last_tool_calls_json = Value::Null;

        for _round in 0..MAX_TOOL_ROUNDS {
            if ctx.cancel.is_cancelled() {
                return Ok(TurnResult { content: String::new(), sources, tool_calls: last_tool_calls_json, tokens_used: total_tokens, cancelled: true });
            }

            let mut openai_tools: Vec<ChatCompletionTool> = registry.values().map(|t| tool_to_chat_completion_tool(t.spec())).collect();
            if write_back_eligible {
                openai_tools.push(tool_to_chat_completion_tool(write_back::write_back_tool_spec()));
            }

            let started_at = Instant::now();
            let request = CreateChatCompletionRequestArgs::default()
                .model(route.model.as_str())
                .max_tokens(route.max_tokens)
                .temperature(route.temperature)
                .messages(messages.clone())
                .tools(openai_tools)
                .build()?;

            let response = match self.llm.chat().create(request).await {
                Ok(response) => response,
                Err(primary_err) => {
                    let Some(fallback) = &route.fallback else {
                        return Err(AppError::from(primary_err));
                    };
                    warn!(error = %primary_err, model = %route.model, "primary model failed, retrying with fallback");
                    let fallback_request = CreateChatCompletionRequestArgs::default()
                        .model(fallback.model.as_str())
                        .max_tokens(fallback.max_tokens)
                        .temperature(fallback.temperature)
                        .messages(messages.clone())
                        .build()?;
                    self.llm.chat().create(fallback_request).await?
                }
            };

            let usage = response.usage.as_ref();
            let input_tokens = usage.map(|u| u.prompt_tokens).unwrap_or(0);
            let output_tokens = usage.map(|u| u.completion_tokens).unwrap_or(0);
            total_tokens += input_tokens + output_tokens;

            let _ = LlmUsage::new(
                ctx.org_id.clone(),
                Some(ctx.deal_id.clone()),
                ctx.user_id.clone(),
                route.provider.clone(),
                route.model.clone(),
                "agent_orchestrator".to_string(),
                input_tokens,
                output_tokens,
                0.0,
                started_at.elapsed().as_millis() as u64,
            )
            .record(&self.db)
            .await;

            let Some(choice) = response.choices.first() else {
                return Err(AppError::ProviderContract("no choices in chat response".into()));
            };

            let tool_calls = choice.message.tool_calls.clone().unwrap_or_default();
            if tool_calls.is_empty() {
                let content = choice.message.content.clone().unwrap_or_default();
                self.finish_turn(ctx, history, user_message, &content, &sources, route, last_tool_calls_json.clone(), total_tokens).await?;
                return Ok(TurnResult { content, sources, tool_calls: last_tool_calls_json, tokens_used: total_tokens, cancelled: false });
            }

            last_tool_calls_json = serde_json::to_value(&tool_calls)?;
            messages.push(
                ChatCompletionRequestAssistantMessageArgs::default()
                    .tool_calls(tool_calls.clone())
                    .build()?
                    .into(),
            );

            let mut needs_escalation = false;
            for call in &tool_calls {
                if call.function.name == "index_to_knowledge_base" {
                    let args: Value = serde_json::from_str(&call.function.arguments).unwrap_or(Value::Null);
                    let content = args.get("content").and_then(Value::as_str).unwrap_or_default();
                    if !content.is_empty() {
                        let _ = write_back::index_to_knowledge_base(content, intent, ctx, &self.db).await;
                    }
                    messages.push(tool_result_message(call, "Recorded."));
                    continue;
                }

                match registry.get(call.function.name.as_str()) {
                    Some(tool) => {
                        let output = self.invoke_tool(tool.as_ref(), call, ctx).await?;
                        sources.push(call.function.name.clone());
                        messages.push(tool_result_message(call, &output.summary));
                    }
                    None => {
                        needs_escalation = true;
                        messages.push(tool_result_message(
                            call,
                            "That tool isn't available at the current tier; retrying at a higher tier.",
                        ));
                    }
                }
            }

            if needs_escalation {
                let Some(escalated) = tier.escalate() else {
                    continue;
                };
                info!(from = ?tier, to = ?escalated, "escalating tool tier after out-of-tier call");
                tier = escalated;
                registry = registry_for_tier(tier, self.db.clone(), self.graph.clone(), self.retrieval.clone());
            }
        }

        Err(AppError::ProviderContract("tool-call loop exceeded max rounds without a final answer".into()))
    }

    async fn invoke_tool(
        &self,
        tool: &dyn tools::Tool,
        call: &ChatCompletionMessageToolCall,
        ctx: &TurnContext,
    ) -> Result<ToolOutput, AppError> {
        let args: Value = serde_json::from_str(&call.function.arguments)
            .map_err(|e| AppError::ProviderContract(format!("invalid tool arguments: {e}")))?;
        let output = tool.call(&args, ctx).await?;

        if let Ok(serialized) = serde_json::to_string(&output.full) {
            self.cache.set(TOOL_CACHE_NAMESPACE, &call.id, &serialized, TOOL_CACHE_TTL).await;
        }

        Ok(output)
    }

    async fn finish_turn(
        &self,
        ctx: &TurnContext,
        _history: &[Message],
        _user_message: &str,
        content: &str,
        sources: &[String],
        _route: &ModelRoute,
        tool_calls: Value,
        tokens_used: u32,
    ) -> Result<(), AppError> {
        let mut message = Message::new(
            ctx.conversation_id.clone(),
            MessageRole::Assistant,
            content.to_string(),
            Some(sources.to_vec()),
        );
        if !matches!(tool_calls, Value::Null) {
            message = message.with_tool_calls(tool_calls, tokens_used);
        }
        self.db.store_item(message).await?;
        Ok(())
    }

    /// Fetches a previously cached full tool result by the tool-call id that
    /// produced it, per §4.8's "subsequent tool calls may reference prior
    /// results by id" isolation rule.
    pub async fn get_cached_tool_result(&self, tool_call_id: &str) -> Option<Value> {
        let cached = self.cache.get(TOOL_CACHE_NAMESPACE, tool_call_id).await?;
        serde_json::from_str(&cached).ok()
    }
}

fn tool_result_message(call: &ChatCompletionMessageToolCall, content: &str) -> async_openai::types::ChatCompletionRequestMessage {
    ChatCompletionRequestToolMessageArgs::default()
        .content(content)
        .tool_call_id(call.id.clone())
        .build()
        .expect("tool message builder never fails on these inputs")
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_for_complexity_maps_one_to_one() {
        assert_eq!(OrchestratorService::tier_for_complexity(Complexity::Simple), ToolTier::Simple);
        assert_eq!(OrchestratorService::tier_for_complexity(Complexity::Medium), ToolTier::Medium);
        assert_eq!(OrchestratorService::tier_for_complexity(Complexity::Complex), ToolTier::Complex);
    }
}
