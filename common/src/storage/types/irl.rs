use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::stored_object;

stored_object!(Irl, "irl", {
    deal_id: String,
    name: String
});

#[derive(Deserialize, Debug, Clone, Serialize, PartialEq)]
pub enum IrlItemStatus {
    Requested,
    Received,
    Waived,
}

stored_object!(IrlItem, "irl_item", {
    irl_id: String,
    parent_item_id: Option<String>,
    description: String,
    priority: String,
    status: IrlItemStatus,
    fulfilled: bool
});

impl Irl {
    pub fn new(deal_id: String, name: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            deal_id,
            name,
        }
    }
}

impl IrlItem {
    pub fn new(irl_id: String, description: String, priority: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            irl_id,
            parent_item_id: None,
            description,
            priority,
            status: IrlItemStatus::Requested,
            fulfilled: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::db::SurrealDbClient;

    #[tokio::test]
    async fn test_irl_item_defaults() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");
        db.apply_migrations().await.expect("migrations");

        let irl = Irl::new("deal_1".into(), "Initial Request List".into());
        db.store_item(irl.clone()).await.expect("store irl");

        let item = IrlItem::new(irl.id.clone(), "Three years of audited financials".into(), "high".into());
        assert!(!item.fulfilled);
        assert_eq!(item.status, IrlItemStatus::Requested);
    }
}
