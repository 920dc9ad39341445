use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs, ResponseFormat,
        ResponseFormatJsonSchema,
    },
    Client,
};
use common::error::AppError;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::entity::{CompanyRole, EntityType, PersonRole};

const EXTRACTION_SYSTEM_PROMPT: &str = "You extract entities and factual relationships from \
    due-diligence source text for a knowledge graph. Only extract what the text states; never \
    invent figures. Prefer the canonical company/person/deal/document/financial_metric/finding/risk \
    kinds; use any other short lowercase kind when nothing fits.";

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractedEntity {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub metric_type: Option<String>,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub period: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub basis: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub summary: String,
}

impl ExtractedEntity {
    /// Maps the LLM's free-text `kind`/`role` pair onto the closed spine of
    /// `EntityType`, falling back to `Other` for anything not recognized.
    pub fn to_entity_type(&self) -> EntityType {
        match self.kind.to_lowercase().as_str() {
            "company" => EntityType::Company {
                role: parse_company_role(self.role.as_deref()),
            },
            "person" => EntityType::Person {
                role: parse_person_role(self.role.as_deref()),
            },
            "deal" => EntityType::Deal,
            "document" => EntityType::Document,
            "financial_metric" | "metric" => EntityType::FinancialMetric {
                metric_type: self.metric_type.clone().unwrap_or_default(),
                value: self.value.unwrap_or_default(),
                period: self.period.clone().unwrap_or_default(),
                currency: self.currency.clone().unwrap_or_default(),
                basis: self.basis.clone().unwrap_or_default(),
            },
            "finding" => EntityType::Finding,
            "risk" => EntityType::Risk {
                severity: self.severity.clone().unwrap_or_default(),
                category: self.category.clone().unwrap_or_default(),
            },
            other => EntityType::Other(other.to_string()),
        }
    }
}

fn parse_company_role(role: Option<&str>) -> CompanyRole {
    match role.unwrap_or_default().to_lowercase().as_str() {
        "acquirer" => CompanyRole::Acquirer,
        "competitor" => CompanyRole::Competitor,
        "customer" => CompanyRole::Customer,
        "supplier" => CompanyRole::Supplier,
        "investor" => CompanyRole::Investor,
        _ => CompanyRole::Target,
    }
}

fn parse_person_role(role: Option<&str>) -> PersonRole {
    match role.unwrap_or_default().to_lowercase().as_str() {
        "advisor" => PersonRole::Advisor,
        "board" => PersonRole::Board,
        "investor" => PersonRole::Investor,
        "employee" => PersonRole::Employee,
        _ => PersonRole::Executive,
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractedFact {
    pub subject: String,
    pub relation: String,
    pub object: String,
    #[serde(default)]
    pub period: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionResult {
    #[serde(default)]
    pub entities: Vec<ExtractedEntity>,
    #[serde(default)]
    pub facts: Vec<ExtractedFact>,
}

fn extraction_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "entities": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": { "type": "string" },
                        "kind": { "type": "string" },
                        "role": { "type": ["string", "null"] },
                        "metric_type": { "type": ["string", "null"] },
                        "value": { "type": ["number", "null"] },
                        "period": { "type": ["string", "null"] },
                        "currency": { "type": ["string", "null"] },
                        "basis": { "type": ["string", "null"] },
                        "severity": { "type": ["string", "null"] },
                        "category": { "type": ["string", "null"] },
                        "aliases": { "type": "array", "items": { "type": "string" } },
                        "summary": { "type": "string" }
                    },
                    "required": ["name", "kind", "aliases", "summary"],
                    "additionalProperties": false
                }
            },
            "facts": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "subject": { "type": "string" },
                        "relation": { "type": "string" },
                        "object": { "type": "string" },
                        "period": { "type": ["string", "null"] }
                    },
                    "required": ["subject", "relation", "object"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["entities", "facts"],
        "additionalProperties": false
    })
}

fn build_request(body: &str, model: &str) -> Result<CreateChatCompletionRequest, OpenAIError> {
    let response_format = ResponseFormat::JsonSchema {
        json_schema: ResponseFormatJsonSchema {
            description: Some("Entity and fact extraction for the knowledge graph".into()),
            name: "episode_extraction".into(),
            schema: Some(extraction_schema()),
            strict: Some(true),
        },
    };

    CreateChatCompletionRequestArgs::default()
        .model(model)
        .messages([
            ChatCompletionRequestSystemMessage::from(EXTRACTION_SYSTEM_PROMPT).into(),
            ChatCompletionRequestUserMessage::from(body).into(),
        ])
        .response_format(response_format)
        .build()
}

/// Calls the LLM to extract entity and fact candidates from an episode body.
pub async fn extract(
    client: &Client<OpenAIConfig>,
    model: &str,
    body: &str,
) -> Result<ExtractionResult, AppError> {
    let request = build_request(body, model)?;
    let response = client.chat().create(request).await?;

    let content = response
        .choices
        .first()
        .and_then(|choice| choice.message.content.as_ref())
        .ok_or_else(|| AppError::ProviderContract("no content in extraction response".into()))?;

    serde_json::from_str::<ExtractionResult>(content).map_err(|e| {
        AppError::ProviderContract(format!("failed to parse extraction response: {e}"))
    })
}
