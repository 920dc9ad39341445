use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use common::storage::types::document::Document;
use job_queue::job::{EnqueueOptions, Job};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct DocumentUploadedPayload {
    pub document_id: String,
    pub deal_id: String,
}

/// `POST /webhooks/document-uploaded`: confirmation from an external object
/// store that a presigned upload landed. Gated by `internal_webhook_auth`
/// rather than a `User` API key. Idempotent: enqueuing `parse_document` is
/// itself a singleton-keyed no-op if the job is already queued, so a
/// redelivered webhook is harmless.
pub async fn document_uploaded(
    State(state): State<ApiState>,
    Json(payload): Json<DocumentUploadedPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let document = Document::get_scoped(&payload.document_id, &payload.deal_id, &state.db)
        .await
        .map_err(|err| match err {
            common::error::AppError::NotAuthorized(_) => ApiError::NotFound("document not found".to_string()),
            other => ApiError::from(other),
        })?;

    let job_id = Job::enqueue(
        "parse_document",
        json!({ "document_id": document.id, "deal_id": document.deal_id }),
        EnqueueOptions { singleton_key: Some(format!("parse_document:{}", document.id)), ..Default::default() },
        &state.db,
    )
    .await?;

    info!(document_id = %document.id, job_id = %job_id, "document-uploaded webhook enqueued parse_document");
    Ok((StatusCode::ACCEPTED, Json(json!({ "document_id": document.id, "job_id": job_id, "status": "accepted" }))))
}
