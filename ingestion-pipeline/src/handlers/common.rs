use std::path::PathBuf;
use std::sync::Arc;

use async_openai::{config::OpenAIConfig, Client};
use common::{error::AppError, storage::db::SurrealDbClient, storage::store::StorageManager};
use job_queue::runtime::HandlerOutcome;
use knowledge_graph::store::KnowledgeGraphStore;
use serde_json::Value;

use crate::config::IngestionTuning;

/// Shared handles every ingestion handler needs. Cheap to clone: every field
/// is itself an `Arc` or internally reference-counted.
#[derive(Clone)]
pub struct IngestionDeps {
    pub db: Arc<SurrealDbClient>,
    pub storage: Arc<StorageManager>,
    pub llm: Arc<Client<OpenAIConfig>>,
    pub graph: Arc<KnowledgeGraphStore>,
    pub tuning: Arc<IngestionTuning>,
}

/// Pulls `document_id` and `deal_id` out of a job payload, failing terminally
/// (not retryably) if either is missing — a malformed payload will never
/// become well-formed on retry.
pub fn require_str<'a>(payload: &'a Value, field: &str) -> Result<&'a str, AppError> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::Validation(format!("job payload missing '{field}'")))
}

/// Downloads an object's bytes to a fresh temp file and returns its path.
/// Several parsing libraries (`lopdf`, `calamine`, `docx-rust`, headless
/// Chrome) need a real filesystem path rather than an in-memory buffer.
pub async fn materialize_to_tempfile(
    storage: &StorageManager,
    blob_path: &str,
    suffix: &str,
) -> Result<(tempfile::TempPath, PathBuf), AppError> {
    let bytes = storage.get(blob_path).await.map_err(AppError::ObjectStore)?;

    let file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .map_err(AppError::Io)?;
    tokio::fs::write(file.path(), &bytes)
        .await
        .map_err(AppError::Io)?;

    let path = file.path().to_path_buf();
    Ok((file.into_temp_path(), path))
}

/// Routes an `AppError` to the job-runtime's retryable/terminal outcome per
/// the handler failure-semantics contract.
pub fn outcome_for_error(err: AppError) -> HandlerOutcome {
    if err.is_retryable() {
        HandlerOutcome::Retryable(err.to_string())
    } else {
        HandlerOutcome::Terminal(err.to_string())
    }
}

pub fn group_id(org_id: &str, deal_id: &str) -> String {
    format!("{org_id}:{deal_id}")
}
