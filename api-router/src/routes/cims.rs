use axum::{extract::Path, extract::State, response::IntoResponse, Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{api_state::ApiState, error::ApiError, principal::Principal};

#[derive(Debug, Deserialize)]
pub struct CimStepRequest {
    pub deal_id: String,
    /// Caller-supplied delta merged into the workflow's prior state. The CIM
    /// slide-authoring workflow itself is an explicitly out-of-scope
    /// external collaborator here — this endpoint's job is only the
    /// checkpoint persistence contract C11 specifies, not the authoring
    /// logic that decides what the next state should be.
    pub state_patch: Value,
}

fn merge_state(mut base: Value, patch: Value) -> Value {
    let (Value::Object(base_map), Value::Object(patch_map)) = (&mut base, patch) else {
        return base;
    };
    for (key, value) in patch_map {
        base_map.insert(key, value);
    }
    base
}

/// `POST /cims/{id}/step`: advances the named CIM's workflow by one step.
/// Resumes from the latest checkpoint under `"cim"`, merges the caller's
/// state patch, and writes the result as the next checkpoint in the chain.
pub async fn step_cim(
    State(state): State<ApiState>,
    Path(cim_id): Path<String>,
    Extension(_principal): Extension<Principal>,
    Json(request): Json<CimStepRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let thread_id = checkpointer::thread_id_for_cim(&request.deal_id, &cim_id);

    let previous = state.checkpoints.get_latest(&thread_id, "cim").await?;
    let previous_state = previous.as_ref().map(|c| c.state_blob.clone()).unwrap_or(json!({}));
    let next_state = merge_state(previous_state, request.state_patch);
    let checkpoint_id = uuid::Uuid::new_v4().to_string();
    let parent_id = previous.map(|c| c.checkpoint_id);

    let checkpoint = state
        .checkpoints
        .put(thread_id, "cim", checkpoint_id, parent_id, next_state.clone(), Value::Null)
        .await?;

    Ok(Json(json!({ "checkpoint_id": checkpoint.checkpoint_id, "state": next_state })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_state_overwrites_matching_keys() {
        let base = json!({"phase": "outline", "slides": []});
        let patch = json!({"phase": "draft"});
        let merged = merge_state(base, patch);
        assert_eq!(merged["phase"], "draft");
        assert_eq!(merged["slides"], json!([]));
    }
}
