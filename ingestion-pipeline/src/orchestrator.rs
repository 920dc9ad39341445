use common::{
    error::AppError,
    storage::db::SurrealDbClient,
    storage::types::{
        document::{Document, ReliabilityStatus},
        finding::Finding,
        finding_correction::{CorrectionValidationStatus, FindingCorrection},
    },
};

use crate::config::IngestionTuning;

/// Runs the source-error cascade for an already-persisted `FindingCorrection`.
/// A no-op unless `validation_status=source_error` and
/// `sourceErrorCascadeEnabled` is on; both gates default off per the
/// correction workflow's conservative default.
pub async fn apply_source_error_cascade(
    correction: &FindingCorrection,
    tuning: &IngestionTuning,
    db: &SurrealDbClient,
) -> Result<(), AppError> {
    if correction.validation_status != CorrectionValidationStatus::SourceError {
        return Ok(());
    }
    if !tuning.source_error_cascade_enabled {
        return Ok(());
    }

    let finding: Finding = db
        .get_item(&correction.finding_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("finding {} not found", correction.finding_id)))?;

    let Some(document_id) = &finding.document_id else {
        // A finding with no source document (e.g. written back from chat)
        // has nothing to cascade to.
        return Ok(());
    };

    Document::mark_reliability(document_id, ReliabilityStatus::ContainsErrors, db).await?;

    if tuning.auto_flag_document_findings {
        Finding::flag_all_for_document(
            document_id,
            "source document flagged as containing errors",
            db,
        )
        .await?;
    }

    Ok(())
}
