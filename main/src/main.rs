use std::{sync::Arc, time::Duration as StdDuration};

use agent_orchestrator::OrchestratorService;
use api_router::{api_routes_v1, api_state::ApiState};
use async_openai::{config::OpenAIConfig, Client};
use axum::Router;
use common::{
    storage::{db::SurrealDbClient, store::StorageManager},
    utils::{cache::SharedCache, config::get_config, embedding::EmbeddingProvider},
};
use job_queue::{EnqueueOptions, Job};
use knowledge_graph::KnowledgeGraphStore;
use retrieval_pipeline::{reranking::RerankerPool, RetrievalService};
use serde_json::json;
use tokio::task::LocalSet;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const RETENTION_SWEEP_SINGLETON_KEY: &str = "checkpoint_retention_sweep:daily";
const RETENTION_SWEEP_INTERVAL: StdDuration = StdDuration::from_secs(24 * 60 * 60);
const POLL_INTERVAL: StdDuration = StdDuration::from_secs(2);

/// Single-process deployment: runs the API server on its own OS thread and
/// the job-queue worker loop on a `LocalSet` on the main thread, so both
/// share one binary without either blocking the other's async runtime.
#[tokio::main]
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

    let api_state = ApiState::new(db.clone(), config.clone(), storage.clone(), orchestrator, retrieval, cache);
    let app: Router = Router::new().merge(api_routes_v1(&api_state)).with_state(api_state);

    info!("Starting server listening on 0.0.0.0:{}", config.http_port);
    let serve_address = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(serve_address).await?;

    let server_handle = std::thread::spawn(move || {
        let rt = tokio::runtime::Runtime::new().expect("failed to start server runtime");
        rt.block_on(async {
            if let Err(e) = axum::serve(listener, app).await {
                error!("Server error: {}", e);
            }
        });
    });

    let local = LocalSet::new();
    let worker_db = db.clone();
    let worker_storage = Arc::new(storage);
    local.spawn_local(async move {
        let (mut runtime, _deps) = ingestion_pipeline::build_runtime(&config, worker_db.clone(), worker_storage);
        checkpointer::register_handlers(&mut runtime, worker_db.clone());

        tokio::spawn(schedule_retention_sweeps(worker_db));

        info!("Starting worker process");
        if let Err(e) = ingestion_pipeline::run_worker(runtime, POLL_INTERVAL).await {
            error!("Worker process error: {}", e);
        }
    });
    local.await;

    if let Err(e) = server_handle.join() {
        error!("Server thread panicked: {:?}", e);
    }

    Ok(())
}

async fn schedule_retention_sweeps(db: Arc<SurrealDbClient>) {
    loop {
        if let Err(err) = Job::enqueue(
            "checkpoint_retention_sweep",
            json!({}),
            EnqueueOptions { singleton_key: Some(RETENTION_SWEEP_SINGLETON_KEY.to_string()), ..Default::default() },
            &db,
        )
        .await
        {
            error!(error = %err, "failed to enqueue checkpoint retention sweep");
        }
        tokio::time::sleep(RETENTION_SWEEP_INTERVAL).await;
    }
}
