use std::sync::Arc;

use agent_orchestrator::OrchestratorService;
use api_router::{api_routes_v1, api_state::ApiState};
use async_openai::{config::OpenAIConfig, Client};
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use common::{
    storage::{db::SurrealDbClient, store::StorageManager},
    utils::{cache::SharedCache, config::AppConfig, embedding::EmbeddingProvider},
};
use knowledge_graph::store::KnowledgeGraphStore;
use retrieval_pipeline::RetrievalService;
use tower::ServiceExt;
use uuid::Uuid;

async fn build_test_state(internal_webhook_secret: Option<String>) -> ApiState {
    let namespace = "api_router_test_ns";
    let database = format!("api_router_test_db_{}", Uuid::new_v4());

    let db = Arc::new(SurrealDbClient::memory(namespace, &database).await.expect("failed to start in-memory surrealdb"));
    db.apply_migrations().await.expect("failed to apply migrations");

    let mut config = AppConfig::default();
    config.internal_webhook_secret = internal_webhook_secret;

    let storage = StorageManager::new(&config).await.expect("failed to build storage manager");
    let embedding = EmbeddingProvider::new(&config);
    let llm = Client::<OpenAIConfig>::with_config(OpenAIConfig::new().with_api_key(&config.openai_api_key));
    let cache = Arc::new(SharedCache::from_config(&config).await);

    let graph = Arc::new(KnowledgeGraphStore::new(
        (*db).clone(),
        embedding,
        llm.clone(),
        "gpt-4o-mini".to_string(),
        &config,
    ));
    let retrieval = Arc::new(RetrievalService::new(graph.clone(), None, cache.clone()));
    let orchestrator = Arc::new(OrchestratorService::new(db.clone(), graph, retrieval.clone(), llm, cache.clone()));

    ApiState::new(db, config, storage, orchestrator, retrieval, cache)
}

fn app(state: &ApiState) -> Router {
    Router::new().merge(api_routes_v1(state)).with_state(state.clone())
}

#[tokio::test]
async fn liveness_probe_returns_ok_without_auth() {
    let state = build_test_state(None).await;
    let response = app(&state)
        .oneshot(Request::builder().uri("/live").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn readiness_probe_reports_ok_against_live_db() {
    let state = build_test_state(None).await;
    let response = app(&state)
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn protected_route_without_api_key_is_unauthorized() {
    let state = build_test_state(None).await;
    let response = app(&state)
        .oneshot(
            Request::builder()
                .uri("/documents/doc_1?deal_id=deal_1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn webhook_without_configured_secret_is_unauthorized() {
    let state = build_test_state(None).await;
    let response = app(&state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks/document-uploaded")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"document_id":"doc_1","deal_id":"deal_1"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn webhook_with_wrong_secret_is_unauthorized() {
    let state = build_test_state(Some("correct-secret".to_string())).await;
    let response = app(&state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks/document-uploaded")
                .header("content-type", "application/json")
                .header("X-Internal-Webhook-Secret", "wrong-secret")
                .body(Body::from(r#"{"document_id":"doc_1","deal_id":"deal_1"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn webhook_with_correct_secret_but_missing_document_is_not_found() {
    let state = build_test_state(Some("correct-secret".to_string())).await;
    let response = app(&state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks/document-uploaded")
                .header("content-type", "application/json")
                .header("X-Internal-Webhook-Secret", "correct-secret")
                .body(Body::from(r#"{"document_id":"doc_missing","deal_id":"deal_1"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_usage_route_requires_authenticated_principal() {
    let state = build_test_state(None).await;
    let response = app(&state)
        .oneshot(
            Request::builder()
                .uri("/admin/usage/summary")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
