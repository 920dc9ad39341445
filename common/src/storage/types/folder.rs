use chrono::Utc;
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(Folder, "folder", {
    deal_id: String,
    name: String,
    path: String,
    parent_path: Option<String>,
    sort_order: u32
});

impl Folder {
    pub fn new(deal_id: String, name: String, path: String, parent_path: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            deal_id,
            name,
            path,
            parent_path,
            sort_order: 0,
        }
    }

    /// Enforce `path` uniqueness per deal before insert.
    pub async fn create_unique(self, db: &SurrealDbClient) -> Result<Self, AppError> {
        let existing: Vec<Folder> = db
            .client
            .query("SELECT * FROM folder WHERE deal_id = $deal_id AND path = $path")
            .bind(("deal_id", self.deal_id.clone()))
            .bind(("path", self.path.clone()))
            .await?
            .take(0)?;

        if !existing.is_empty() {
            return Err(AppError::Conflict(format!(
                "folder path {} already exists for this deal",
                self.path
            )));
        }

        db.store_item(self.clone()).await?;
        Ok(self)
    }

    pub async fn list_for_deal(deal_id: &str, db: &SurrealDbClient) -> Result<Vec<Self>, AppError> {
        let folders: Vec<Self> = db
            .client
            .query("SELECT * FROM folder WHERE deal_id = $deal_id ORDER BY sort_order")
            .bind(("deal_id", deal_id.to_string()))
            .await?
            .take(0)?;
        Ok(folders)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_unique_rejects_duplicate_path() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");
        db.apply_migrations().await.expect("migrations");

        let first = Folder::new("deal_1".into(), "Financials".into(), "/financials".into(), None);
        first.create_unique(&db).await.expect("create first");

        let second = Folder::new("deal_1".into(), "Financials Dup".into(), "/financials".into(), None);
        let result = second.create_unique(&db).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }
}
