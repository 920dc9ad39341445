use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(User, "user", {
    email: String,
    api_key: Option<String>,
    admin: bool
});

impl User {
    /// Creates a platform user and issues their API key. Callers that need a
    /// key up front (onboarding an analyst, provisioning a service account)
    /// read it off the returned `User` before it's ever persisted elsewhere.
    pub async fn create_new(email: String, admin: bool, db: &SurrealDbClient) -> Result<Self, AppError> {
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        let api_key = format!("sk_{}", Uuid::new_v4().to_string().replace('-', ""));

        let user: Option<User> = db
            .client
            .query(
                "CREATE type::thing('user', $id) SET
                    email = $email,
                    api_key = $api_key,
                    admin = $admin,
                    created_at = $created_at,
                    updated_at = $updated_at",
            )
            .bind(("id", id))
            .bind(("email", email))
            .bind(("api_key", api_key))
            .bind(("admin", admin))
            .bind(("created_at", surrealdb::Datetime::from(now)))
            .bind(("updated_at", surrealdb::Datetime::from(now)))
            .await?
            .take(0)?;

        user.ok_or_else(|| AppError::Internal("user failed to create".to_string()))
    }

    pub async fn find_by_api_key(api_key: &str, db: &SurrealDbClient) -> Result<Option<Self>, AppError> {
        let user: Option<User> = db
            .client
            .query("SELECT * FROM user WHERE api_key = $api_key LIMIT 1")
            .bind(("api_key", api_key.to_string()))
            .await?
            .take(0)?;

        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::db::SurrealDbClient;

    async fn test_db() -> SurrealDbClient {
        let namespace = "user_test_ns";
        let database = Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory(namespace, &database).await.expect("in-memory db");
        db.apply_migrations().await.expect("migrations");
        db
    }

    #[tokio::test]
    async fn create_new_issues_a_distinct_api_key_per_user() {
        let db = test_db().await;

        let analyst = User::create_new("analyst@example.com".to_string(), false, &db).await.expect("create analyst");
        let admin = User::create_new("admin@example.com".to_string(), true, &db).await.expect("create admin");

        assert!(analyst.api_key.is_some());
        assert_ne!(analyst.api_key, admin.api_key);
        assert!(!analyst.admin);
        assert!(admin.admin);
    }

    #[tokio::test]
    async fn find_by_api_key_looks_up_the_matching_user() {
        let db = test_db().await;
        let created = User::create_new("analyst@example.com".to_string(), false, &db).await.expect("create user");
        let api_key = created.api_key.clone().expect("api key set");

        let found = User::find_by_api_key(&api_key, &db).await.expect("lookup").expect("user found");
        assert_eq!(found.id, created.id);

        let missing = User::find_by_api_key("sk_not_a_real_key", &db).await.expect("lookup");
        assert!(missing.is_none());
    }
}
