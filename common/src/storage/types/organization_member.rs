use uuid::Uuid;

use crate::stored_object;

#[derive(Deserialize, Debug, Clone, Serialize, PartialEq)]
pub enum OrgRole {
    Superadmin,
    Admin,
    Member,
}

stored_object!(OrganizationMember, "organization_member", {
    org_id: String,
    user_id: String,
    role: OrgRole
});

impl OrganizationMember {
    pub fn new(org_id: String, user_id: String, role: OrgRole) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            org_id,
            user_id,
            role,
        }
    }

    pub async fn list_for_org(
        org_id: &str,
        db: &crate::storage::db::SurrealDbClient,
    ) -> Result<Vec<Self>, crate::error::AppError> {
        let members: Vec<Self> = db
            .client
            .query("SELECT * FROM organization_member WHERE org_id = $org_id")
            .bind(("org_id", org_id.to_string()))
            .await?
            .take(0)?;
        Ok(members)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::db::SurrealDbClient;

    #[tokio::test]
    async fn test_list_for_org() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");

        let m1 = OrganizationMember::new("org_1".into(), "user_1".into(), OrgRole::Admin);
        let m2 = OrganizationMember::new("org_1".into(), "user_2".into(), OrgRole::Member);
        let m3 = OrganizationMember::new("org_2".into(), "user_3".into(), OrgRole::Member);

        db.store_item(m1).await.expect("store m1");
        db.store_item(m2).await.expect("store m2");
        db.store_item(m3).await.expect("store m3");

        let members = OrganizationMember::list_for_org("org_1", &db)
            .await
            .expect("list members");
        assert_eq!(members.len(), 2);
    }
}
