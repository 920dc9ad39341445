use std::sync::Arc;

use agent_orchestrator::OrchestratorService;
use api_router::{api_routes_v1, api_state::ApiState};
use async_openai::{config::OpenAIConfig, Client};
use axum::Router;
use common::{
    storage::{db::SurrealDbClient, store::StorageManager},
    utils::{cache::SharedCache, config::get_config, embedding::EmbeddingProvider},
};
use knowledge_graph::KnowledgeGraphStore;
use retrieval_pipeline::{reranking::RerankerPool, RetrievalService};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let config = get_config()?;

    let db = Arc::new(
        SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await?,
    );
    db.apply_migrations().await?;

    let storage = StorageManager::new(&config).await?;
    let cache = Arc::new(SharedCache::from_config(&config).await);
    let llm = Client::<OpenAIConfig>::with_config(
        OpenAIConfig::new()
            .with_api_key(&config.openai_api_key)
            .with_api_base(&config.openai_base_url),
    );
    let embedding = EmbeddingProvider::new(&config);
    let reranker_pool = RerankerPool::maybe_from_config(&config)?;

    let extraction_model = std::env::var("INGESTION_EXTRACTION_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
    let graph = Arc::new(KnowledgeGraphStore::new((*db).clone(), embedding, llm.clone(), extraction_model, &config));
    let retrieval = Arc::new(RetrievalService::new(graph.clone(), reranker_pool, cache.clone()));
    let orchestrator = Arc::new(OrchestratorService::new(db.clone(), graph, retrieval.clone(), llm, cache.clone()));

    let api_state = ApiState::new(db, config.clone(), storage, orchestrator, retrieval, cache);

    let app: Router = Router::new().merge(api_routes_v1(&api_state)).with_state(api_state);

    info!("Starting server listening on 0.0.0.0:{}", config.http_port);
    let serve_address = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(serve_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
