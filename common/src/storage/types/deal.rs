use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

#[derive(Deserialize, Debug, Clone, Serialize, PartialEq)]
pub enum DealStatus {
    Active,
    Archived,
    Completed,
}

stored_object!(Deal, "deal", {
    organization_id: String,
    user_id: String,
    name: String,
    company_name: String,
    industry: String,
    status: DealStatus,
    metadata: Value
});

impl Deal {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        organization_id: String,
        user_id: String,
        name: String,
        company_name: String,
        industry: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            organization_id,
            user_id,
            name,
            company_name,
            industry,
            status: DealStatus::Active,
            metadata: Value::Object(serde_json::Map::new()),
        }
    }

    /// Composite namespace used to scope knowledge graph writes and reads.
    pub fn group_id(organization_id: &str, deal_id: &str) -> String {
        format!("{organization_id}:{deal_id}")
    }

    pub async fn get_scoped(
        id: &str,
        organization_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Self, AppError> {
        let deal: Deal = db
            .get_item(id)
            .await?
            .ok_or_else(|| AppError::NotFound("deal not found".to_string()))?;

        if deal.organization_id != organization_id {
            return Err(AppError::NotAuthorized(
                "deal does not belong to this organization".to_string(),
            ));
        }

        Ok(deal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_group_id_format() {
        assert_eq!(Deal::group_id("org_1", "deal_1"), "org_1:deal_1");
    }

    #[tokio::test]
    async fn test_get_scoped_rejects_foreign_org() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");

        let deal = Deal::new(
            "org_1".into(),
            "user_1".into(),
            "Project Falcon".into(),
            "Falcon Industries".into(),
            "manufacturing".into(),
        );
        let deal_id = deal.id.clone();
        db.store_item(deal).await.expect("store deal");

        let result = Deal::get_scoped(&deal_id, "org_2", &db).await;
        assert!(matches!(result, Err(AppError::NotAuthorized(_))));
    }
}
