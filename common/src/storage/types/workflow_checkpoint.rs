use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(WorkflowCheckpoint, "workflow_checkpoint", {
    thread_id: String,
    checkpoint_ns: String,
    checkpoint_id: String,
    parent_checkpoint_id: Option<String>,
    checkpoint_type: String,
    state_blob: Value,
    metadata: Value
});

stored_object!(CheckpointWrite, "checkpoint_write", {
    checkpoint_id: String,
    task_id: String,
    channel: String,
    value: Value
});

stored_object!(CheckpointBlob, "checkpoint_blob", {
    checkpoint_id: String,
    channel: String,
    data: Value
});

/// `thread_id` encodes tenancy via a deterministic prefix:
/// `cim-{deal_id}-{cim_id}` or `supervisor-{deal_id}-{timestamp}`.
pub fn deal_id_from_thread_id(thread_id: &str) -> Option<&str> {
    let rest = thread_id
        .strip_prefix("cim-")
        .or_else(|| thread_id.strip_prefix("supervisor-"))?;
    rest.split('-').next()
}

impl WorkflowCheckpoint {
    /// Atomic write of a checkpoint plus its per-task writes and blobs.
    /// Idempotent on `(thread_id, checkpoint_ns, checkpoint_id)`.
    #[allow(clippy::too_many_arguments)]
    pub async fn put(
        thread_id: String,
        checkpoint_ns: String,
        checkpoint_id: String,
        parent_checkpoint_id: Option<String>,
        checkpoint_type: String,
        state_blob: Value,
        metadata: Value,
        writes: Vec<(String, String, Value)>,
        blobs: Vec<(String, Value)>,
        db: &SurrealDbClient,
    ) -> Result<Self, AppError> {
        let existing: Vec<Self> = db
            .client
            .query(
                "SELECT * FROM workflow_checkpoint WHERE thread_id = $thread_id \
                 AND checkpoint_ns = $checkpoint_ns AND checkpoint_id = $checkpoint_id LIMIT 1",
            )
            .bind(("thread_id", thread_id.clone()))
            .bind(("checkpoint_ns", checkpoint_ns.clone()))
            .bind(("checkpoint_id", checkpoint_id.clone()))
            .await?
            .take(0)?;
        if let Some(checkpoint) = existing.into_iter().next() {
            return Ok(checkpoint);
        }

        let now = Utc::now();
        let checkpoint = Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            thread_id,
            checkpoint_ns,
            checkpoint_id: checkpoint_id.clone(),
            parent_checkpoint_id,
            checkpoint_type,
            state_blob,
            metadata,
        };
        db.store_item(checkpoint.clone()).await?;

        for (task_id, channel, value) in writes {
            let write = CheckpointWrite {
                id: Uuid::new_v4().to_string(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
                checkpoint_id: checkpoint.id.clone(),
                task_id,
                channel,
                value,
            };
            db.store_item(write).await?;
        }

        for (channel, data) in blobs {
            let blob = CheckpointBlob {
                id: Uuid::new_v4().to_string(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
                checkpoint_id: checkpoint.id.clone(),
                channel,
                data,
            };
            db.store_item(blob).await?;
        }

        Ok(checkpoint)
    }

    pub async fn get_latest(
        thread_id: &str,
        checkpoint_ns: &str,
        db: &SurrealDbClient,
    ) -> Result<Option<Self>, AppError> {
        let rows: Vec<Self> = db
            .client
            .query(
                "SELECT * FROM workflow_checkpoint WHERE thread_id = $thread_id \
                 AND checkpoint_ns = $checkpoint_ns ORDER BY created_at DESC LIMIT 1",
            )
            .bind(("thread_id", thread_id.to_string()))
            .bind(("checkpoint_ns", checkpoint_ns.to_string()))
            .await?
            .take(0)?;
        Ok(rows.into_iter().next())
    }

    pub async fn list(thread_id: &str, db: &SurrealDbClient) -> Result<Vec<Self>, AppError> {
        let rows: Vec<Self> = db
            .client
            .query("SELECT * FROM workflow_checkpoint WHERE thread_id = $thread_id ORDER BY created_at ASC")
            .bind(("thread_id", thread_id.to_string()))
            .await?
            .take(0)?;
        Ok(rows)
    }

    /// Retention sweep: removes checkpoints older than `cutoff`, cascading
    /// through their writes and blobs.
    pub async fn delete_before(cutoff: DateTime<Utc>, db: &SurrealDbClient) -> Result<u64, AppError> {
        let stale: Vec<Self> = db
            .client
            .query("SELECT * FROM workflow_checkpoint WHERE created_at < $cutoff")
            .bind(("cutoff", cutoff))
            .await?
            .take(0)?;

        let count = stale.len() as u64;
        for checkpoint in stale {
            db.client
                .query("DELETE checkpoint_write WHERE checkpoint_id = $id; DELETE checkpoint_blob WHERE checkpoint_id = $id; DELETE workflow_checkpoint WHERE id = $full_id;")
                .bind(("id", checkpoint.id.clone()))
                .bind(("full_id", format!("workflow_checkpoint:{}", checkpoint.id)))
                .await?;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_deal_id_from_thread_id() {
        assert_eq!(deal_id_from_thread_id("cim-deal_1-cim_9"), Some("deal_1"));
        assert_eq!(
            deal_id_from_thread_id("supervisor-deal_2-1700000000"),
            Some("deal_2")
        );
        assert_eq!(deal_id_from_thread_id("not-a-thread"), None);
    }

    #[tokio::test]
    async fn test_put_is_idempotent_and_get_latest() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");
        db.apply_migrations().await.expect("migrations");

        let thread_id = "cim-deal_1-cim_1".to_string();
        let first = WorkflowCheckpoint::put(
            thread_id.clone(),
            "cim".into(),
            "checkpoint_1".into(),
            None,
            "state".into(),
            serde_json::json!({"phase": "outline"}),
            serde_json::json!({}),
            vec![("task_1".into(), "outline".into(), serde_json::json!(["s1"]))],
            vec![],
            &db,
        )
        .await
        .expect("put checkpoint");

        let second = WorkflowCheckpoint::put(
            thread_id.clone(),
            "cim".into(),
            "checkpoint_1".into(),
            None,
            "state".into(),
            serde_json::json!({"phase": "different"}),
            serde_json::json!({}),
            vec![],
            vec![],
            &db,
        )
        .await
        .expect("idempotent put");
        assert_eq!(first.id, second.id);

        let latest = WorkflowCheckpoint::get_latest(&thread_id, "cim", &db)
            .await
            .expect("get latest")
            .expect("checkpoint exists");
        assert_eq!(latest.checkpoint_id, "checkpoint_1");
    }

    #[tokio::test]
    async fn test_delete_before_cutoff() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");
        db.apply_migrations().await.expect("migrations");

        WorkflowCheckpoint::put(
            "cim-deal_1-cim_1".into(),
            "cim".into(),
            "checkpoint_1".into(),
            None,
            "state".into(),
            serde_json::json!({}),
            serde_json::json!({}),
            vec![],
            vec![],
            &db,
        )
        .await
        .expect("put checkpoint");

        let future_cutoff = Utc::now() + Duration::days(31);
        let deleted = WorkflowCheckpoint::delete_before(future_cutoff, &db)
            .await
            .expect("delete before");
        assert_eq!(deleted, 1);

        let remaining = WorkflowCheckpoint::list("cim-deal_1-cim_1", &db)
            .await
            .expect("list");
        assert!(remaining.is_empty());
    }
}
