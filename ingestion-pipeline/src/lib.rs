#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod chunking;
pub mod config;
pub mod findings;
pub mod handlers;
pub mod orchestrator;

use std::sync::Arc;
use std::time::Duration;

use async_openai::{config::OpenAIConfig, Client};
use common::{
    error::AppError,
    storage::{db::SurrealDbClient, store::StorageManager},
    utils::{config::AppConfig, embedding::EmbeddingProvider},
};
use job_queue::WorkerRuntime;
use knowledge_graph::KnowledgeGraphStore;
use uuid::Uuid;

pub use config::IngestionTuning;
pub use handlers::{register_handlers, IngestionDeps};

/// Wires every shared client the document pipeline needs (LLM, embeddings,
/// the knowledge graph store) and returns a ready-to-run worker runtime with
/// every C8 stage handler already registered.
pub fn build_runtime(
    cfg: &AppConfig,
    db: Arc<SurrealDbClient>,
    storage: Arc<StorageManager>,
) -> (WorkerRuntime, IngestionDeps) {
    let tuning = Arc::new(IngestionTuning::from_env(cfg));
    let llm = Arc::new(Client::with_config(
        OpenAIConfig::new()
            .with_api_key(cfg.openai_api_key.clone())
            .with_api_base(cfg.openai_base_url.clone()),
    ));
    let embedding = EmbeddingProvider::new(cfg);
    let graph = Arc::new(KnowledgeGraphStore::new(
        (*db).clone(),
        embedding,
        (*llm).clone(),
        tuning.extraction_model.clone(),
        cfg,
    ));

    let deps = IngestionDeps {
        db: db.clone(),
        storage,
        llm,
        graph,
        tuning,
    };

    let worker_id = format!("ingestion-worker-{}", Uuid::new_v4());
    let visibility_timeout = chrono::Duration::seconds(cfg.visibility_timeout_seconds as i64);
    let mut runtime = WorkerRuntime::new(
        db,
        worker_id,
        visibility_timeout,
        cfg.max_job_concurrency as usize,
    );
    register_handlers(&mut runtime, deps.clone());

    (runtime, deps)
}

/// Runs the worker poll loop until `runtime.shutdown_signal()` is cancelled.
pub async fn run_worker(runtime: WorkerRuntime, poll_interval: Duration) -> Result<(), AppError> {
    runtime.run(poll_interval).await;
    Ok(())
}
