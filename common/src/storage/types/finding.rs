use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

#[derive(Deserialize, Debug, Clone, Serialize, PartialEq)]
pub enum FindingType {
    Metric,
    Fact,
    Risk,
    Opportunity,
    Contradiction,
}

#[derive(Deserialize, Debug, Clone, Serialize, PartialEq)]
pub enum Domain {
    Financial,
    Operational,
    Market,
    Legal,
    Technical,
}

#[derive(Deserialize, Debug, Clone, Serialize, PartialEq)]
pub enum FindingStatus {
    Pending,
    Validated,
    Rejected,
}

#[derive(Deserialize, Debug, Clone, Serialize, PartialEq)]
pub struct ValidationEvent {
    pub action: String,
    pub analyst_id: String,
    pub at: chrono::DateTime<chrono::Utc>,
}

stored_object!(Finding, "finding", {
    deal_id: String,
    document_id: Option<String>,
    chunk_id: Option<String>,
    text: String,
    source_document: String,
    page_number: Option<u32>,
    confidence: f32,
    finding_type: FindingType,
    domain: Domain,
    status: FindingStatus,
    validation_history: Vec<ValidationEvent>,
    needs_review: bool,
    review_reason: Option<String>,
    last_corrected_at: Option<chrono::DateTime<chrono::Utc>>
});

impl Finding {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        deal_id: String,
        document_id: Option<String>,
        chunk_id: Option<String>,
        text: String,
        source_document: String,
        confidence: f32,
        finding_type: FindingType,
        domain: Domain,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            deal_id,
            document_id,
            chunk_id,
            text,
            source_document,
            page_number: None,
            confidence,
            finding_type,
            domain,
            status: FindingStatus::Pending,
            validation_history: Vec::new(),
            needs_review: confidence < 0.85,
            review_reason: if confidence < 0.85 {
                Some("confidence below entity resolution threshold".to_string())
            } else {
                None
            },
            last_corrected_at: None,
        }
    }

    pub async fn apply_validation(
        id: &str,
        action: &str,
        analyst_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Self, AppError> {
        let mut finding: Finding = db
            .get_item(id)
            .await?
            .ok_or_else(|| AppError::NotFound("finding not found".to_string()))?;

        finding.status = match action {
            "validate" => FindingStatus::Validated,
            "reject" => FindingStatus::Rejected,
            other => {
                return Err(AppError::Validation(format!(
                    "unknown validation action: {other}"
                )))
            }
        };
        finding.validation_history.push(ValidationEvent {
            action: action.to_string(),
            analyst_id: analyst_id.to_string(),
            at: Utc::now(),
        });
        finding.needs_review = false;
        finding.updated_at = Utc::now();

        db.store_item(finding.clone()).await?;
        Ok(finding)
    }

    pub async fn list_for_deal(deal_id: &str, db: &SurrealDbClient) -> Result<Vec<Self>, AppError> {
        let findings: Vec<Self> = db
            .client
            .query("SELECT * FROM finding WHERE deal_id = $deal_id")
            .bind(("deal_id", deal_id.to_string()))
            .await?
            .take(0)?;
        Ok(findings)
    }

    pub async fn list_for_document(
        document_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        let findings: Vec<Self> = db
            .client
            .query("SELECT * FROM finding WHERE document_id = $document_id")
            .bind(("document_id", document_id.to_string()))
            .await?
            .take(0)?;
        Ok(findings)
    }

    /// Flags every finding sourced from `document_id` as needing review, used
    /// by the source-error cascade when a correction indicts the document
    /// itself rather than a single finding.
    pub async fn flag_all_for_document(
        document_id: &str,
        reason: &str,
        db: &SurrealDbClient,
    ) -> Result<u64, AppError> {
        let mut response = db
            .client
            .query(
                "UPDATE finding SET needs_review = true, review_reason = $reason, \
                 updated_at = time::now() WHERE document_id = $document_id",
            )
            .bind(("document_id", document_id.to_string()))
            .bind(("reason", reason.to_string()))
            .await?;
        let flagged: Vec<Self> = response.take(0)?;
        Ok(flagged.len() as u64)
    }
}
