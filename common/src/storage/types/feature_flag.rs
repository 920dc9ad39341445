use chrono::Utc;
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(FeatureFlag, "feature_flag", {
    org_id: Option<String>,
    key: String,
    enabled: bool,
    description: String
});

impl FeatureFlag {
    pub fn new(org_id: Option<String>, key: String, enabled: bool, description: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            org_id,
            key,
            enabled,
            description,
        }
    }

    /// Resolve a flag for an org: an org-scoped row takes precedence over the
    /// global default for the same `key`.
    pub async fn resolve(key: &str, org_id: &str, db: &SurrealDbClient) -> Result<bool, AppError> {
        let scoped: Vec<Self> = db
            .client
            .query("SELECT * FROM feature_flag WHERE key = $key AND org_id = $org_id LIMIT 1")
            .bind(("key", key.to_string()))
            .bind(("org_id", org_id.to_string()))
            .await?
            .take(0)?;
        if let Some(flag) = scoped.into_iter().next() {
            return Ok(flag.enabled);
        }

        let global: Vec<Self> = db
            .client
            .query("SELECT * FROM feature_flag WHERE key = $key AND org_id = NONE LIMIT 1")
            .bind(("key", key.to_string()))
            .await?
            .take(0)?;
        Ok(global.into_iter().next().is_some_and(|flag| flag.enabled))
    }

    pub async fn set(self, db: &SurrealDbClient) -> Result<Self, AppError> {
        db.store_item(self.clone()).await?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_org_scoped_flag_overrides_global() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");
        db.apply_migrations().await.expect("migrations");

        FeatureFlag::new(None, "agent_orchestrator".into(), false, "global default off".into())
            .set(&db)
            .await
            .expect("store global");
        FeatureFlag::new(
            Some("org_1".into()),
            "agent_orchestrator".into(),
            true,
            "enabled for pilot org".into(),
        )
        .set(&db)
        .await
        .expect("store scoped");

        let resolved = FeatureFlag::resolve("agent_orchestrator", "org_1", &db)
            .await
            .expect("resolve");
        assert!(resolved);

        let resolved_other = FeatureFlag::resolve("agent_orchestrator", "org_2", &db)
            .await
            .expect("resolve other org");
        assert!(!resolved_other);
    }
}
