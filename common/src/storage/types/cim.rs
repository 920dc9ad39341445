use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

#[derive(Deserialize, Debug, Clone, Serialize, PartialEq)]
pub enum CimStatus {
    Generating,
    Ready,
    Failed,
}

stored_object!(Cim, "cim", {
    deal_id: String,
    title: String,
    status: CimStatus,
    sections: Value,
    blob_path: Option<String>,
    error: Option<String>
});

impl Cim {
    pub fn new(deal_id: String, title: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            deal_id,
            title,
            status: CimStatus::Generating,
            sections: Value::Object(serde_json::Map::new()),
            blob_path: None,
            error: None,
        }
    }

    pub async fn mark_ready(id: &str, sections: Value, blob_path: String, db: &SurrealDbClient) -> Result<Self, AppError> {
        let mut cim: Cim = db
            .get_item(id)
            .await?
            .ok_or_else(|| AppError::NotFound("cim not found".to_string()))?;

        cim.status = CimStatus::Ready;
        cim.sections = sections;
        cim.blob_path = Some(blob_path);
        cim.error = None;
        cim.updated_at = Utc::now();

        db.store_item(cim.clone()).await?;
        Ok(cim)
    }

    pub async fn mark_failed(id: &str, error: String, db: &SurrealDbClient) -> Result<Self, AppError> {
        let mut cim: Cim = db
            .get_item(id)
            .await?
            .ok_or_else(|| AppError::NotFound("cim not found".to_string()))?;

        cim.status = CimStatus::Failed;
        cim.error = Some(error);
        cim.updated_at = Utc::now();

        db.store_item(cim.clone()).await?;
        Ok(cim)
    }

    pub async fn list_for_deal(deal_id: &str, db: &SurrealDbClient) -> Result<Vec<Self>, AppError> {
        let rows: Vec<Self> = db
            .client
            .query("SELECT * FROM cim WHERE deal_id = $deal_id ORDER BY created_at DESC")
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
    async fn test_mark_ready_and_failed() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");
        db.apply_migrations().await.expect("migrations");

        let cim = Cim::new("deal_1".into(), "Project Falcon CIM".into());
        let id = cim.id.clone();
        db.store_item(cim).await.expect("store cim");

        let ready = Cim::mark_ready(
            &id,
            serde_json::json!({"overview": "..."}),
            "deal_1/cim/final.pdf".into(),
            &db,
        )
        .await
        .expect("mark ready");
        assert_eq!(ready.status, CimStatus::Ready);
        assert!(ready.blob_path.is_some());

        let cim2 = Cim::new("deal_1".into(), "Second attempt".into());
        let id2 = cim2.id.clone();
        db.store_item(cim2).await.expect("store cim2");
        let failed = Cim::mark_failed(&id2, "provider timeout".into(), &db)
            .await
            .expect("mark failed");
        assert_eq!(failed.status, CimStatus::Failed);
    }
}
