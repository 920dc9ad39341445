use std::sync::Arc;

use agent_orchestrator::OrchestratorService;
use checkpointer::CheckpointStore;
use common::{
    storage::{db::SurrealDbClient, store::StorageManager},
    utils::{cache::SharedCache, config::AppConfig},
};
use retrieval_pipeline::RetrievalService;

#[derive(Clone)]
pub struct ApiState {
    pub db: Arc<SurrealDbClient>,
    pub config: AppConfig,
    pub storage: StorageManager,
    pub orchestrator: Arc<OrchestratorService>,
    pub retrieval: Arc<RetrievalService>,
    pub checkpoints: CheckpointStore,
    pub cache: Arc<SharedCache>,
}

impl ApiState {
    /// Assembles the router's state from already-constructed collaborators.
    /// `db`, `orchestrator`, and `retrieval` are built by the caller (the
    /// binary wiring every crate together) since they each carry their own
    /// heavier dependencies (an LLM client, the knowledge graph store, an
    /// optional reranker pool) that this crate has no need to know about
    /// beyond the narrow interfaces it calls through.
    pub fn new(
        db: Arc<SurrealDbClient>,
        config: AppConfig,
        storage: StorageManager,
        orchestrator: Arc<OrchestratorService>,
        retrieval: Arc<RetrievalService>,
        cache: Arc<SharedCache>,
    ) -> Self {
        let checkpoints = CheckpointStore::new(db.clone());
        Self { db, config, storage, orchestrator, retrieval, checkpoints, cache }
    }
}
