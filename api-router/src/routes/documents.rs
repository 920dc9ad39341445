use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use axum_typed_multipart::{FieldData, TryFromMultipart, TypedMultipart};
use common::storage::types::document::{CompletedStage, Document};
use job_queue::job::{EnqueueOptions, Job};
use serde::Deserialize;
use serde_json::json;
use tempfile::NamedTempFile;
use tracing::info;

use crate::{api_state::ApiState, error::ApiError, principal::Principal, rate_limit::check_upload_rate_limit};

/// Documents are scoped to a deal, but the external interfaces table's
/// `/documents/{id}` paths carry no deal segment; the caller supplies it as
/// a query parameter instead.
#[derive(Debug, Deserialize)]
pub struct DealScope {
    pub deal_id: String,
}

#[derive(Debug, TryFromMultipart)]
pub struct UploadParams {
    pub deal_id: String,
    #[form_data(default)]
    pub folder_path: String,
    pub file: FieldData<NamedTempFile>,
}

fn parse_document_singleton_key(document_id: &str) -> String {
    format!("parse_document:{document_id}")
}

async fn enqueue_parse_document(document_id: &str, deal_id: &str, state: &ApiState) -> Result<(), ApiError> {
    Job::enqueue(
        "parse_document",
        json!({ "document_id": document_id, "deal_id": deal_id }),
        EnqueueOptions { singleton_key: Some(parse_document_singleton_key(document_id)), ..Default::default() },
        &state.db,
    )
    .await?;
    Ok(())
}

/// `POST /documents/upload`: direct-upload of a deal document. The external
/// interfaces table describes a signed-URL object-store handoff, but the
/// object store this crate actually has (`StorageManager`) exposes no
/// presign capability, and the real blob backend is an explicitly external
/// collaborator — so this endpoint collapses the two-step flow into one
/// synchronous upload that also enqueues the first ingestion stage.
pub async fn upload_document(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    TypedMultipart(input): TypedMultipart<UploadParams>,
) -> Result<impl IntoResponse, ApiError> {
    if !check_upload_rate_limit(&state.cache, &principal.org_id).await {
        return Err(ApiError::TooManyRequests("upload rate limit exceeded, try again shortly".to_string()));
    }

    let file_name = input
        .file
        .metadata
        .file_name
        .ok_or_else(|| ApiError::ValidationError("missing file name".to_string()))?;
    let bytes = tokio::fs::read(input.file.contents.path())
        .await
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    let document = Document::upload(&input.deal_id, &file_name, &input.folder_path, bytes, &state.db, &state.storage).await?;
    enqueue_parse_document(&document.id, &document.deal_id, &state).await?;

    info!(document_id = %document.id, deal_id = %document.deal_id, "document uploaded and queued for parsing");
    Ok((StatusCode::ACCEPTED, Json(json!({ "document_id": document.id, "status": "accepted" }))))
}

/// `GET /documents/{id}`: row-scoped by `deal_id`. `Document::get_scoped`
/// returns `NotAuthorized` (not `NotFound`) when the id exists but belongs
/// to a different deal; translated to a 404 here so a caller outside the
/// owning deal can't distinguish "wrong deal" from "no such document".
pub async fn get_document(
    State(state): State<ApiState>,
    Path(document_id): Path<String>,
    Query(scope): Query<DealScope>,
    Extension(_principal): Extension<Principal>,
) -> Result<impl IntoResponse, ApiError> {
    let document = Document::get_scoped(&document_id, &scope.deal_id, &state.db).await.map_err(|err| match err {
        common::error::AppError::NotAuthorized(_) => ApiError::NotFound("document not found".to_string()),
        other => ApiError::from(other),
    })?;

    Ok(Json(document))
}

/// `POST /documents/{id}/retry`: re-enqueues whichever ingestion job comes
/// after the document's `last_completed_stage`. A document already at
/// `Analyzed`/`Complete` has nothing left to retry.
pub async fn retry_document(
    State(state): State<ApiState>,
    Path(document_id): Path<String>,
    Query(scope): Query<DealScope>,
    Extension(_principal): Extension<Principal>,
) -> Result<impl IntoResponse, ApiError> {
    let document = Document::get_scoped(&document_id, &scope.deal_id, &state.db).await.map_err(|err| match err {
        common::error::AppError::NotAuthorized(_) => ApiError::NotFound("document not found".to_string()),
        other => ApiError::from(other),
    })?;

    let next_job = match document.last_completed_stage {
        None => Some(("parse_document", parse_document_singleton_key(&document.id))),
        Some(CompletedStage::Parsed) => Some(("graphiti_ingest", format!("graphiti_ingest:{}", document.id))),
        Some(CompletedStage::GraphitiIngested) => Some(("analyze_document", format!("analyze_document:{}", document.id))),
        Some(CompletedStage::Analyzed) | Some(CompletedStage::Complete) => None,
    };

    let Some((job_name, singleton_key)) = next_job else {
        return Err(ApiError::Conflict("document has already completed processing".to_string()));
    };

    Document::record_retry(&document.id, document.processing_status.clone(), "manual retry requested", &state.db).await?;

    let existing = Job::enqueue(
        job_name,
        json!({ "document_id": document.id, "deal_id": document.deal_id }),
        EnqueueOptions { singleton_key: Some(singleton_key), ..Default::default() },
        &state.db,
    )
    .await?;

    info!(document_id = %document.id, job_name, job_id = %existing, "document retry enqueued");
    Ok((StatusCode::ACCEPTED, Json(json!({ "document_id": document.id, "job_id": existing, "status": "accepted" }))))
}
