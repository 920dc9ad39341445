use api_state::ApiState;
use axum::{
    extract::{DefaultBodyLimit, FromRef},
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use middleware_api_auth::{api_auth, internal_webhook_auth};
use routes::{
    admin::{usage_by_deal, usage_by_feature, usage_by_model, usage_daily, usage_recent_errors, usage_summary},
    chat::chat,
    cims::step_cim,
    documents::{get_document, retry_document, upload_document},
    liveness::live,
    readiness::ready,
    search::hybrid_search,
    webhooks::document_uploaded,
};

pub mod api_state;
pub mod error;
mod middleware_api_auth;
mod principal;
mod rate_limit;
mod routes;

/// Router for API functionality, version 1
pub fn api_routes_v1<S>(app_state: &ApiState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    // Public, unauthenticated endpoints (for k8s/systemd probes)
    let public = Router::new().route("/ready", get(ready)).route("/live", get(live));

    // Internal service-to-service endpoint, gated by a shared secret rather
    // than a `User` API key.
    let webhooks = Router::new()
        .route("/webhooks/document-uploaded", post(document_uploaded))
        .route_layer(from_fn_with_state(app_state.clone(), internal_webhook_auth));

    // Protected API endpoints, require an authenticated `User`/`Principal`.
    let protected = Router::new()
        .route(
            "/documents/upload",
            post(upload_document).layer(DefaultBodyLimit::max(app_state.config.document_upload_max_body_bytes)),
        )
        .route("/documents/{id}", get(get_document))
        .route("/documents/{id}/retry", post(retry_document))
        .route("/chat", post(chat))
        .route("/search/hybrid", post(hybrid_search))
        .route("/cims/{id}/step", post(step_cim))
        .route("/admin/usage/daily", get(usage_daily))
        .route("/admin/usage/by-feature", get(usage_by_feature))
        .route("/admin/usage/by-model", get(usage_by_model))
        .route("/admin/usage/by-deal", get(usage_by_deal))
        .route("/admin/usage/errors", get(usage_recent_errors))
        .route("/admin/usage/summary", get(usage_summary))
        .route_layer(from_fn_with_state(app_state.clone(), api_auth));

    public.merge(webhooks).merge(protected)
}
