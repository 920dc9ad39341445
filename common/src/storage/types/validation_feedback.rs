use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

#[derive(Deserialize, Debug, Clone, Serialize, PartialEq)]
pub enum FeedbackAction {
    Validate,
    Reject,
}

stored_object!(ValidationFeedback, "validation_feedback", {
    finding_id: String,
    action: FeedbackAction,
    reason: Option<String>,
    analyst_id: String
});

impl ValidationFeedback {
    pub fn new(
        finding_id: String,
        action: FeedbackAction,
        reason: Option<String>,
        analyst_id: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            finding_id,
            action,
            reason,
            analyst_id,
        }
    }

    pub async fn append(self, db: &SurrealDbClient) -> Result<Self, AppError> {
        db.store_item(self.clone()).await?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append_feedback() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");
        db.apply_migrations().await.expect("migrations");

        let feedback = ValidationFeedback::new(
            "finding_1".into(),
            FeedbackAction::Reject,
            Some("not material".into()),
            "analyst_1".into(),
        );
        let stored = feedback.append(&db).await.expect("append feedback");
        assert_eq!(stored.action, FeedbackAction::Reject);
    }
}
