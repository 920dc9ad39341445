use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

#[derive(Deserialize, Debug, Clone, Serialize, PartialEq)]
pub enum CorrectionType {
    Value,
    Source,
    Confidence,
    Text,
}

#[derive(Deserialize, Debug, Clone, Serialize, PartialEq)]
pub enum CorrectionValidationStatus {
    Pending,
    ConfirmedWithSource,
    OverrideWithoutSource,
    SourceError,
}

stored_object!(FindingCorrection, "finding_correction", {
    finding_id: String,
    original_value: String,
    corrected_value: String,
    correction_type: CorrectionType,
    reason: String,
    user_source_reference: Option<String>,
    validation_status: CorrectionValidationStatus,
    analyst_id: String
});

impl FindingCorrection {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        finding_id: String,
        original_value: String,
        corrected_value: String,
        correction_type: CorrectionType,
        reason: String,
        user_source_reference: Option<String>,
        analyst_id: String,
    ) -> Self {
        let now = Utc::now();
        let validation_status = if user_source_reference.is_some() {
            CorrectionValidationStatus::ConfirmedWithSource
        } else {
            CorrectionValidationStatus::OverrideWithoutSource
        };
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            finding_id,
            original_value,
            corrected_value,
            correction_type,
            reason,
            user_source_reference,
            validation_status,
            analyst_id,
        }
    }

    /// Append-only: corrections are never updated or deleted once recorded.
    pub async fn append(self, db: &SurrealDbClient) -> Result<Self, AppError> {
        db.store_item(self.clone()).await?;
        Ok(self)
    }

    pub async fn list_for_finding(
        finding_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        let corrections: Vec<Self> = db
            .client
            .query("SELECT * FROM finding_correction WHERE finding_id = $finding_id ORDER BY created_at")
            .bind(("finding_id", finding_id.to_string()))
            .await?
            .take(0)?;
        Ok(corrections)
    }
}
