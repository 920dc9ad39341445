use uuid::Uuid;

use crate::stored_object;

stored_object!(Organization, "organization", {
    name: String,
    slug: String,
    created_by: String
});

impl Organization {
    pub fn new(name: String, slug: String, created_by: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            name,
            slug,
            created_by,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::db::SurrealDbClient;

    #[tokio::test]
    async fn test_organization_persistence() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");

        let org = Organization::new(
            "Acme Capital".to_string(),
            "acme-capital".to_string(),
            "user_1".to_string(),
        );

        db.store_item(org.clone()).await.expect("store org");

        let fetched: Option<Organization> = db.get_item(&org.id).await.expect("fetch org");
        assert_eq!(fetched, Some(org));
    }
}
