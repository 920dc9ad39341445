use std::sync::Arc;

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use common::{error::AppError, storage::db::SurrealDbClient};
use knowledge_graph::KnowledgeGraphStore;

use crate::tools::{FinancialAnalysisTool, GraphTraversalTool, SearchKnowledgeGraphTool, Tool};
use crate::TurnContext;

/// A domain specialist a complex-tier turn can be routed to, per §4.8's
/// supervisor graph. Each specialist only sees the tools relevant to its
/// domain rather than the full complex tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Specialist {
    FinancialAnalyst,
    KnowledgeGraph,
}

impl Specialist {
    /// Routes on keyword presence rather than an LLM call: the supervisor
    /// step itself must stay cheap, since the specialist it dispatches to
    /// does the expensive reasoning.
    pub fn route(message: &str) -> Option<Self> {
        let lower = message.to_lowercase();
        const FINANCIAL_TERMS: &[&str] = &["revenue", "ebitda", "margin", "ratio", "cash flow", "earnings"];
        const GRAPH_TERMS: &[&str] = &["relationship", "connected to", "who owns", "entity", "subsidiary"];

        if FINANCIAL_TERMS.iter().any(|t| lower.contains(t)) {
            Some(Specialist::FinancialAnalyst)
        } else if GRAPH_TERMS.iter().any(|t| lower.contains(t)) {
            Some(Specialist::KnowledgeGraph)
        } else {
            None
        }
    }
}

pub struct SpecialistOutput {
    pub specialist: Specialist,
    pub content: String,
    pub citations: Vec<String>,
}

async fn run_financial_analyst(
    message: &str,
    ctx: &TurnContext,
    db: &Arc<SurrealDbClient>,
    client: &Client<OpenAIConfig>,
    model: &str,
) -> Result<SpecialistOutput, AppError> {
    let tool = FinancialAnalysisTool { db: db.clone() };
    let result = tool.call(&serde_json::json!({}), ctx).await?;

    let request = CreateChatCompletionRequestArgs::default()
        .model(model)
        .messages([
            ChatCompletionRequestSystemMessage::from(
                "You are a financial analyst specialist. Use the metrics below to answer the \
                 question with ratios and period comparisons where relevant.",
            )
            .into(),
            ChatCompletionRequestUserMessage::from(format!("Metrics: {}\n\nQuestion: {message}", result.summary)).into(),
        ])
        .build()?;

    let response = client.chat().create(request).await?;
    let content = response
        .choices
        .first()
        .and_then(|c| c.message.content.clone())
        .ok_or_else(|| AppError::ProviderContract("no content in specialist response".into()))?;

    Ok(SpecialistOutput {
        specialist: Specialist::FinancialAnalyst,
        content,
        citations: vec!["financial_analysis".to_string()],
    })
}

async fn run_knowledge_graph_specialist(
    message: &str,
    ctx: &TurnContext,
    graph: &Arc<KnowledgeGraphStore>,
    db: &Arc<SurrealDbClient>,
    client: &Client<OpenAIConfig>,
    model: &str,
) -> Result<SpecialistOutput, AppError> {
    let search = SearchKnowledgeGraphTool { graph: graph.clone() };
    let search_result = search.call(&serde_json::json!({ "query": message }), ctx).await?;

    let traversal = GraphTraversalTool { graph: graph.clone(), db: db.clone() };
    let entity_hint = message.split_whitespace().last().unwrap_or_default();
    let traversal_result = traversal
        .call(&serde_json::json!({ "entity_name": entity_hint }), ctx)
        .await
        .unwrap_or(crate::tools::ToolOutput {
            summary: "no relationships available".to_string(),
            full: serde_json::Value::Null,
        });

    let request = CreateChatCompletionRequestArgs::default()
        .model(model)
        .messages([
            ChatCompletionRequestSystemMessage::from(
                "You are a knowledge-graph specialist. Use the entity and relationship context \
                 below to answer the question, citing entity names.",
            )
            .into(),
            ChatCompletionRequestUserMessage::from(format!(
                "Entities: {}\nRelationships: {}\n\nQuestion: {message}",
                search_result.summary, traversal_result.summary
            ))
            .into(),
        ])
        .build()?;

    let response = client.chat().create(request).await?;
    let content = response
        .choices
        .first()
        .and_then(|c| c.message.content.clone())
        .ok_or_else(|| AppError::ProviderContract("no content in specialist response".into()))?;

    Ok(SpecialistOutput {
        specialist: Specialist::KnowledgeGraph,
        content,
        citations: vec!["search_knowledge_graph".to_string(), "graph_traversal".to_string()],
    })
}

/// Dispatches to the routed specialist, or returns `None` when nothing
/// matches — the caller falls back to the generic complex agent.
pub async fn dispatch(
    message: &str,
    ctx: &TurnContext,
    db: &Arc<SurrealDbClient>,
    graph: &Arc<KnowledgeGraphStore>,
    client: &Client<OpenAIConfig>,
    model: &str,
) -> Result<Option<SpecialistOutput>, AppError> {
    match Specialist::route(message) {
        Some(Specialist::FinancialAnalyst) => {
            Ok(Some(run_financial_analyst(message, ctx, db, client, model).await?))
        }
        Some(Specialist::KnowledgeGraph) => {
            Ok(Some(run_knowledge_graph_specialist(message, ctx, graph, db, client, model).await?))
        }
        None => Ok(None),
    }
}

/// Merges one or more specialist outputs into a single response with
/// preserved citations, per §4.8's synthesizer node. A single specialist
/// passes through unchanged; multiple specialists are concatenated under
/// their own headers rather than re-summarized by another LLM call, since
/// the specialists already wrote final, citable prose.
pub fn synthesize(outputs: Vec<SpecialistOutput>) -> (String, Vec<String>) {
    if outputs.len() == 1 {
        let output = outputs.into_iter().next().expect("len checked above");
        return (output.content, output.citations);
    }

    let mut content = String::new();
    let mut citations = Vec::new();
    for output in outputs {
        content.push_str(&output.content);
        content.push_str("\n\n");
        citations.extend(output.citations);
    }
    (content.trim_end().to_string(), citations)
}
