use async_trait::async_trait;
use chrono::{Duration, Utc};
use common::storage::types::workflow_checkpoint::WorkflowCheckpoint;
use job_queue::{runtime::Context, HandlerOutcome, JobHandler};
use serde_json::{json, Value};
use tracing::info;

use crate::{outcome_for_error, CheckpointStore, RETENTION_DAYS};

/// Scheduled sweep that deletes checkpoints (and their writes/blobs) older
/// than `RETENTION_DAYS`, per §4.9's retention contract. Enqueued on a
/// recurring schedule rather than triggered per-workflow, since it has no
/// natural per-thread trigger.
pub struct CheckpointRetentionHandler {
    pub store: CheckpointStore,
}

#[async_trait]
impl JobHandler for CheckpointRetentionHandler {
    async fn handle(&self, _payload: Value, _ctx: Context) -> HandlerOutcome {
        let cutoff = Utc::now() - Duration::days(RETENTION_DAYS);
        match self.store.delete_before(cutoff).await {
            Ok(deleted) => {
                info!(deleted, cutoff = %cutoff, "swept stale workflow checkpoints");
                HandlerOutcome::Success(json!({ "deleted": deleted }))
            }
            Err(err) => outcome_for_error(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use common::storage::db::SurrealDbClient;
    use job_queue::runtime::Context;
    use serde_json::Value;
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    use super::*;

    fn ctx() -> Context {
        Context {
            org_id: "org_1".to_string(),
            deal_id: None,
            trace_id: Uuid::new_v4().to_string(),
            cancel_signal: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn sweep_deletes_only_stale_checkpoints() {
        let db = Arc::new(
            SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
                .await
                .expect("in-memory db"),
        );
        db.apply_migrations().await.expect("migrations");
        let store = CheckpointStore::new(db.clone());

        store
            .put("cim-deal_1-cim_1", "cim", "checkpoint_1", None, Value::Null, Value::Null)
            .await
            .expect("put checkpoint");

        let stale = WorkflowCheckpoint::get_latest("cim-deal_1-cim_1", "cim", &db)
            .await
            .expect("get latest")
            .expect("checkpoint exists");
        let backdated = Utc::now() - Duration::days(31);
        db.client
            .query("UPDATE workflow_checkpoint SET created_at = $created_at WHERE id = $id")
            .bind(("created_at", backdated))
            .bind(("id", format!("workflow_checkpoint:{}", stale.id)))
            .await
            .expect("backdate checkpoint");

        let handler = CheckpointRetentionHandler { store };
        let outcome = handler.handle(Value::Null, ctx()).await;
        match outcome {
            HandlerOutcome::Success(value) => assert_eq!(value["deleted"], 1),
            _ => panic!("expected success outcome"),
        }
    }
}
