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
use common::{
    error::AppError,
    storage::types::finding::{Domain, FindingType},
};
use serde::Deserialize;
use serde_json::{json, Value};

const FINDINGS_SYSTEM_PROMPT: &str = "You analyze due-diligence source text and surface discrete \
    findings an M&A analyst would want flagged: metrics, facts, risks, opportunities, and \
    contradictions with other statements in the text. Only report what the text supports; never \
    invent figures. Each finding must quote or closely paraphrase the supporting text.";

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractedFinding {
    pub text: String,
    pub finding_type: String,
    pub domain: String,
    pub confidence: f32,
    #[serde(default)]
    pub page_number: Option<u32>,
}

impl ExtractedFinding {
    pub fn finding_type(&self) -> FindingType {
        match self.finding_type.to_lowercase().as_str() {
            "metric" => FindingType::Metric,
            "risk" => FindingType::Risk,
            "opportunity" => FindingType::Opportunity,
            "contradiction" => FindingType::Contradiction,
            _ => FindingType::Fact,
        }
    }

    pub fn domain(&self) -> Domain {
        match self.domain.to_lowercase().as_str() {
            "operational" => Domain::Operational,
            "market" => Domain::Market,
            "legal" => Domain::Legal,
            "technical" => Domain::Technical,
            _ => Domain::Financial,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FindingsExtractionResult {
    #[serde(default)]
    pub findings: Vec<ExtractedFinding>,
}

fn findings_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "findings": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "text": { "type": "string" },
                        "finding_type": { "type": "string" },
                        "domain": { "type": "string" },
                        "confidence": { "type": "number" },
                        "page_number": { "type": ["integer", "null"] }
                    },
                    "required": ["text", "finding_type", "domain", "confidence"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["findings"],
        "additionalProperties": false
    })
}

fn build_request(body: &str, model: &str) -> Result<CreateChatCompletionRequest, OpenAIError> {
    let response_format = ResponseFormat::JsonSchema {
        json_schema: ResponseFormatJsonSchema {
            description: Some("Finding extraction for due-diligence documents".into()),
            name: "document_findings".into(),
            schema: Some(findings_schema()),
            strict: Some(true),
        },
    };

    CreateChatCompletionRequestArgs::default()
        .model(model)
        .messages([
            ChatCompletionRequestSystemMessage::from(FINDINGS_SYSTEM_PROMPT).into(),
            ChatCompletionRequestUserMessage::from(body).into(),
        ])
        .response_format(response_format)
        .build()
}

/// Calls the LLM to extract findings from a document's full text.
pub async fn extract_findings(
    client: &Client<OpenAIConfig>,
    model: &str,
    body: &str,
) -> Result<FindingsExtractionResult, AppError> {
    let request = build_request(body, model)?;
    let response = client.chat().create(request).await?;

    let content = response
        .choices
        .first()
        .and_then(|choice| choice.message.content.as_ref())
        .ok_or_else(|| AppError::ProviderContract("no content in findings response".into()))?;

    serde_json::from_str::<FindingsExtractionResult>(content)
        .map_err(|err| AppError::ProviderContract(format!("failed to parse findings response: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_finding_type_falls_back_to_fact() {
        let finding = ExtractedFinding {
            text: "Revenue grew 12% YoY".into(),
            finding_type: "trend".into(),
            domain: "financial".into(),
            confidence: 0.8,
            page_number: Some(3),
        };
        assert_eq!(finding.finding_type(), FindingType::Fact);
        assert_eq!(finding.domain(), Domain::Financial);
    }

    #[test]
    fn recognized_finding_type_maps_directly() {
        let finding = ExtractedFinding {
            text: "Customer concentration risk: top client is 40% of revenue".into(),
            finding_type: "risk".into(),
            domain: "operational".into(),
            confidence: 0.9,
            page_number: None,
        };
        assert_eq!(finding.finding_type(), FindingType::Risk);
        assert_eq!(finding.domain(), Domain::Operational);
    }
}
