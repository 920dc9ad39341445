use chrono::Utc;
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(FeatureUsage, "feature_usage", {
    org_id: String,
    deal_id: Option<String>,
    user_id: String,
    feature: String,
    count: u32
});

impl FeatureUsage {
    pub fn new(org_id: String, deal_id: Option<String>, user_id: String, feature: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            org_id,
            deal_id,
            user_id,
            feature,
            count: 1,
        }
    }

    /// Increment the usage counter for `(org_id, user_id, feature)`, creating
    /// a new row on first use.
    pub async fn record_use(
        org_id: &str,
        deal_id: Option<&str>,
        user_id: &str,
        feature: &str,
        db: &SurrealDbClient,
    ) -> Result<Self, AppError> {
        let existing: Vec<Self> = db
            .client
            .query(
                "SELECT * FROM feature_usage WHERE org_id = $org_id AND user_id = $user_id \
                 AND feature = $feature LIMIT 1",
            )
            .bind(("org_id", org_id.to_string()))
            .bind(("user_id", user_id.to_string()))
            .bind(("feature", feature.to_string()))
            .await?
            .take(0)?;

        if let Some(mut row) = existing.into_iter().next() {
            row.count += 1;
            row.updated_at = Utc::now();
            db.store_item(row.clone()).await?;
            return Ok(row);
        }

        let row = Self::new(
            org_id.to_string(),
            deal_id.map(str::to_string),
            user_id.to_string(),
            feature.to_string(),
        );
        db.store_item(row.clone()).await?;
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_use_increments_existing_row() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");
        db.apply_migrations().await.expect("migrations");

        let first = FeatureUsage::record_use("org_1", Some("deal_1"), "user_1", "qa_builder", &db)
            .await
            .expect("first use");
        assert_eq!(first.count, 1);

        let second = FeatureUsage::record_use("org_1", Some("deal_1"), "user_1", "qa_builder", &db)
            .await
            .expect("second use");
        assert_eq!(second.count, 2);
        assert_eq!(second.id, first.id);
    }
}
