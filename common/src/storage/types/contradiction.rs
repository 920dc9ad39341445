use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

#[derive(Deserialize, Debug, Clone, Serialize, PartialEq)]
pub enum ContradictionStatus {
    Unresolved,
    Resolved,
    Noted,
    Investigating,
}

stored_object!(Contradiction, "contradiction", {
    deal_id: String,
    finding_a_id: String,
    finding_b_id: String,
    confidence: f32,
    status: ContradictionStatus,
    resolution: Option<String>,
    resolved_by: Option<String>
});

impl Contradiction {
    pub fn new(
        deal_id: String,
        finding_a_id: String,
        finding_b_id: String,
        confidence: f32,
    ) -> Result<Self, AppError> {
        if finding_a_id == finding_b_id {
            return Err(AppError::Validation(
                "a finding cannot contradict itself".to_string(),
            ));
        }

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            deal_id,
            finding_a_id,
            finding_b_id,
            confidence,
            status: ContradictionStatus::Unresolved,
            resolution: None,
            resolved_by: None,
        })
    }

    pub async fn resolve(
        id: &str,
        resolution: &str,
        resolved_by: &str,
        db: &SurrealDbClient,
    ) -> Result<Self, AppError> {
        let mut contradiction: Contradiction = db
            .get_item(id)
            .await?
            .ok_or_else(|| AppError::NotFound("contradiction not found".to_string()))?;

        contradiction.status = ContradictionStatus::Resolved;
        contradiction.resolution = Some(resolution.to_string());
        contradiction.resolved_by = Some(resolved_by.to_string());
        contradiction.updated_at = Utc::now();

        db.store_item(contradiction.clone()).await?;
        Ok(contradiction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_self_contradiction() {
        let result = Contradiction::new("deal_1".into(), "finding_1".into(), "finding_1".into(), 0.8);
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_resolve() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");
        db.apply_migrations().await.expect("migrations");

        let contradiction =
            Contradiction::new("deal_1".into(), "finding_1".into(), "finding_2".into(), 0.8)
                .expect("construct contradiction");
        let id = contradiction.id.clone();
        db.store_item(contradiction).await.expect("store");

        let resolved = Contradiction::resolve(&id, "confirmed with updated filing", "analyst_1", &db)
            .await
            .expect("resolve");
        assert_eq!(resolved.status, ContradictionStatus::Resolved);
    }
}
