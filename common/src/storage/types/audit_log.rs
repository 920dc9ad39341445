use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(AuditLog, "audit_log", {
    org_id: String,
    deal_id: Option<String>,
    actor_id: String,
    action: String,
    resource_type: String,
    resource_id: String,
    details: Value
});

impl AuditLog {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        org_id: String,
        deal_id: Option<String>,
        actor_id: String,
        action: String,
        resource_type: String,
        resource_id: String,
        details: Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            org_id,
            deal_id,
            actor_id,
            action,
            resource_type,
            resource_id,
            details,
        }
    }

    /// Append-only write. The `audit_log` table is defined with
    /// `PERMISSIONS FOR update, delete NONE`, so this is the only
    /// mutation ever available on an entry.
    pub async fn append(self, db: &SurrealDbClient) -> Result<Self, AppError> {
        db.store_item(self.clone()).await?;
        Ok(self)
    }

    pub async fn list_for_deal(deal_id: &str, db: &SurrealDbClient) -> Result<Vec<Self>, AppError> {
        let rows: Vec<Self> = db
            .client
            .query("SELECT * FROM audit_log WHERE deal_id = $deal_id ORDER BY created_at ASC")
            .bind(("deal_id", deal_id.to_string()))
            .await?
            .take(0)?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append_and_list() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");
        db.apply_migrations().await.expect("migrations");

        let entry = AuditLog::new(
            "org_1".into(),
            Some("deal_1".into()),
            "user_1".into(),
            "finding.validate".into(),
            "finding".into(),
            "finding_1".into(),
            serde_json::json!({"previous_status": "pending"}),
        );
        entry.append(&db).await.expect("append entry");

        let entries = AuditLog::list_for_deal("deal_1", &db).await.expect("list");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, "finding.validate");
    }

    #[tokio::test]
    async fn test_update_is_rejected_by_table_permissions() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");
        db.apply_migrations().await.expect("migrations");

        let entry = AuditLog::new(
            "org_1".into(),
            None,
            "user_1".into(),
            "document.upload".into(),
            "document".into(),
            "document_1".into(),
            Value::Null,
        );
        let stored = entry.append(&db).await.expect("append entry");

        let result = db
            .client
            .query("UPDATE audit_log SET action = 'tampered' WHERE id = $id")
            .bind(("id", stored.id.clone()))
            .await;

        match result {
            Ok(mut response) => {
                let updated: Vec<AuditLog> = response.take(0).unwrap_or_default();
                assert!(updated.is_empty(), "audit_log rows must reject updates");
            }
            Err(_) => {}
        }
    }
}
