pub mod retention;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{error::AppError, storage::db::SurrealDbClient};
use job_queue::{runtime::HandlerOutcome, WorkerRuntime};
use serde_json::Value;

pub use common::storage::types::workflow_checkpoint::{deal_id_from_thread_id, WorkflowCheckpoint};
pub use retention::CheckpointRetentionHandler;

/// Checkpoints older than this are eligible for the retention sweep, per
/// §4.9's 30-day cleanup window.
pub const RETENTION_DAYS: i64 = 30;

/// The checkpoint type used when a caller doesn't supply one of its own.
/// §4.9's `put` signature omits a type argument entirely; every checkpoint
/// in this system is a full state snapshot, so "state" covers every caller.
const DEFAULT_CHECKPOINT_TYPE: &str = "state";

fn outcome_for_error(err: AppError) -> HandlerOutcome {
    if err.is_retryable() {
        HandlerOutcome::Retryable(err.to_string())
    } else {
        HandlerOutcome::Terminal(err.to_string())
    }
}

/// Builds the `"cim-{deal_id}-{cim_id}"` thread id a CIM authoring workflow
/// checkpoints under.
pub fn thread_id_for_cim(deal_id: &str, cim_id: &str) -> String {
    format!("cim-{deal_id}-{cim_id}")
}

/// Builds the `"supervisor-{deal_id}-{timestamp}"` thread id a supervisor
/// graph run checkpoints under. `timestamp` is a caller-supplied epoch
/// second, not sampled here, since this crate never calls `Utc::now()` for
/// anything but the retention cutoff.
pub fn thread_id_for_supervisor(deal_id: &str, timestamp: i64) -> String {
    format!("supervisor-{deal_id}-{timestamp}")
}

/// A task's write to a single channel within one checkpoint, queued for
/// atomic persistence alongside the checkpoint row.
pub type PendingWrite = (String, String, Value);

/// A large value stored out-of-line from the checkpoint's `state_blob`.
pub type PendingBlob = (String, Value);

/// Thin facade over `WorkflowCheckpoint`'s storage methods, per §4.9's
/// durable checkpointer contract. Kept separate from the `common` type so
/// that callers (the CIM authoring graph, the supervisor graph) depend on
/// a narrow crate rather than reaching into `common::storage::types`
/// directly for workflow-specific persistence.
#[derive(Clone)]
pub struct CheckpointStore {
    db: Arc<SurrealDbClient>,
}

impl CheckpointStore {
    pub fn new(db: Arc<SurrealDbClient>) -> Self {
        Self { db }
    }

    /// Atomic write of a checkpoint with no per-task writes or blobs.
    /// Idempotent on `(thread_id, checkpoint_ns, checkpoint_id)`.
    pub async fn put(
        &self,
        thread_id: impl Into<String>,
        checkpoint_ns: impl Into<String>,
        checkpoint_id: impl Into<String>,
        parent_id: Option<String>,
        state: Value,
        metadata: Value,
    ) -> Result<WorkflowCheckpoint, AppError> {
        self.put_with_writes(thread_id, checkpoint_ns, checkpoint_id, parent_id, state, metadata, Vec::new(), Vec::new())
            .await
    }

    /// Full form of `put`, carrying per-task writes and out-of-line blobs
    /// through the same atomic transaction.
    #[allow(clippy::too_many_arguments)]
    pub async fn put_with_writes(
        &self,
        thread_id: impl Into<String>,
        checkpoint_ns: impl Into<String>,
        checkpoint_id: impl Into<String>,
        parent_id: Option<String>,
        state: Value,
        metadata: Value,
        writes: Vec<PendingWrite>,
        blobs: Vec<PendingBlob>,
    ) -> Result<WorkflowCheckpoint, AppError> {
        let thread_id = thread_id.into();
        let checkpoint_ns = checkpoint_ns.into();
        tracing::debug!(%thread_id, %checkpoint_ns, write_count = writes.len(), blob_count = blobs.len(), "writing checkpoint");
        WorkflowCheckpoint::put(
            thread_id,
            checkpoint_ns,
            checkpoint_id.into(),
            parent_id,
            DEFAULT_CHECKPOINT_TYPE.to_string(),
            state,
            metadata,
            writes,
            blobs,
            &self.db,
        )
        .await
    }

    /// Replays the most recent checkpoint for a thread/namespace, for a
    /// caller resuming a graph after a restart.
    pub async fn get_latest(&self, thread_id: &str, checkpoint_ns: &str) -> Result<Option<WorkflowCheckpoint>, AppError> {
        WorkflowCheckpoint::get_latest(thread_id, checkpoint_ns, &self.db).await
    }

    /// All checkpoints ever written for a thread, oldest first, across every
    /// namespace.
    pub async fn list(&self, thread_id: &str) -> Result<Vec<WorkflowCheckpoint>, AppError> {
        WorkflowCheckpoint::list(thread_id, &self.db).await
    }

    /// Deletes checkpoints (and their writes/blobs) created before `cutoff`.
    /// Returns the number of checkpoints removed.
    pub async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        WorkflowCheckpoint::delete_before(cutoff, &self.db).await
    }
}

/// Registers the retention-sweep handler on `runtime`. A single worker slot
/// is enough: the sweep runs to completion in one pass and is cheap relative
/// to any ingestion or agent-turn handler.
pub fn register_handlers(runtime: &mut WorkerRuntime, db: Arc<SurrealDbClient>) {
    let store = CheckpointStore::new(db);
    runtime.register("checkpoint_retention_sweep", Arc::new(CheckpointRetentionHandler { store }), 1);
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn thread_id_helpers_match_the_documented_format() {
        assert_eq!(thread_id_for_cim("deal_1", "cim_9"), "cim-deal_1-cim_9");
        assert_eq!(thread_id_for_supervisor("deal_2", 1_700_000_000), "supervisor-deal_2-1700000000");
    }

    #[tokio::test]
    async fn put_is_idempotent_and_get_latest_resumes_state() {
        let db = Arc::new(
            SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
                .await
                .expect("in-memory db"),
        );
        db.apply_migrations().await.expect("migrations");
        let store = CheckpointStore::new(db);

        let thread_id = thread_id_for_cim("deal_1", "cim_1");
        let first = store
            .put(
                thread_id.clone(),
                "cim",
                "checkpoint_1",
                None,
                serde_json::json!({"phase": "outline"}),
                serde_json::json!({}),
            )
            .await
            .expect("put checkpoint");

        let second = store
            .put(
                thread_id.clone(),
                "cim",
                "checkpoint_1",
                None,
                serde_json::json!({"phase": "different"}),
                serde_json::json!({}),
            )
            .await
            .expect("idempotent put");
        assert_eq!(first.id, second.id);

        let latest = store.get_latest(&thread_id, "cim").await.expect("get latest").expect("checkpoint exists");
        assert_eq!(latest.state_blob, serde_json::json!({"phase": "outline"}));
    }

    #[tokio::test]
    async fn list_returns_every_checkpoint_for_a_thread() {
        let db = Arc::new(
            SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
                .await
                .expect("in-memory db"),
        );
        db.apply_migrations().await.expect("migrations");
        let store = CheckpointStore::new(db);
        let thread_id = thread_id_for_cim("deal_1", "cim_1");

        store.put(thread_id.clone(), "cim", "checkpoint_1", None, Value::Null, Value::Null).await.expect("put 1");
        store
            .put(thread_id.clone(), "cim", "checkpoint_2", Some("checkpoint_1".to_string()), Value::Null, Value::Null)
            .await
            .expect("put 2");

        let all = store.list(&thread_id).await.expect("list");
        assert_eq!(all.len(), 2);
    }
}
