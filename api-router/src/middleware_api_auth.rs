use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use common::storage::types::user::User;

use crate::{api_state::ApiState, error::ApiError, principal::Principal};

const DEFAULT_ORG_ID: &str = "default";

pub async fn api_auth(
    State(state): State<ApiState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let api_key = extract_api_key(&request)
        .ok_or_else(|| ApiError::Unauthorized("You have to be authenticated".to_string()))?;

    let user = User::find_by_api_key(&api_key, &state.db).await?;
    let user = user.ok_or_else(|| ApiError::Unauthorized("You have to be authenticated".to_string()))?;

    let org_id = extract_org_id(&request).unwrap_or_else(|| DEFAULT_ORG_ID.to_string());
    let principal = Principal { user_id: user.id.clone(), org_id, is_admin: user.admin };

    request.extensions_mut().insert(user);
    request.extensions_mut().insert(principal);

    Ok(next.run(request).await)
}

/// Gate for internal-only endpoints (the document-upload webhook): checks a
/// shared secret header instead of a `User`-bound API key, since the caller
/// is another service, not a signed-in analyst.
pub async fn internal_webhook_auth(
    State(state): State<ApiState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let configured = state
        .config
        .internal_webhook_secret
        .as_ref()
        .ok_or_else(|| ApiError::Unauthorized("webhook endpoint is not configured".to_string()))?;

    let provided = request
        .headers()
        .get("X-Internal-Webhook-Secret")
        .and_then(|v| v.to_str().ok());

    match provided {
        Some(secret) if secret == configured => Ok(next.run(request).await),
        _ => Err(ApiError::Unauthorized("invalid webhook secret".to_string())),
    }
}

fn extract_api_key(request: &Request) -> Option<String> {
    request
        .headers()
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            request
                .headers()
                .get("Authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|auth| auth.strip_prefix("Bearer ").map(str::trim))
        })
        .map(String::from)
}

fn extract_org_id(request: &Request) -> Option<String> {
    request
        .headers()
        .get("X-Org-Id")
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}
