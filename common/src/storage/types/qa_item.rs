use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

#[derive(Deserialize, Debug, Clone, Serialize, PartialEq)]
pub enum QACategory {
    Financials,
    Legal,
    Operations,
    Market,
    Technology,
    HR,
}

#[derive(Deserialize, Debug, Clone, Serialize, PartialEq)]
pub enum QAPriority {
    High,
    Medium,
    Low,
}

stored_object!(QAItem, "qa_item", {
    deal_id: String,
    question: String,
    category: QACategory,
    priority: QAPriority,
    answer: Option<String>,
    source_finding_id: Option<String>,
    date_added: chrono::DateTime<chrono::Utc>,
    date_answered: Option<chrono::DateTime<chrono::Utc>>
});

impl QAItem {
    pub fn new(deal_id: String, question: String, category: QACategory, priority: QAPriority) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            deal_id,
            question,
            category,
            priority,
            answer: None,
            source_finding_id: None,
            date_added: now,
            date_answered: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.date_answered.is_none()
    }

    /// Optimistic-concurrency update: the caller's `expected_updated_at` must
    /// match the stored value or the update is rejected as a conflict.
    pub async fn answer(
        id: &str,
        answer: &str,
        source_finding_id: Option<String>,
        expected_updated_at: chrono::DateTime<chrono::Utc>,
        db: &SurrealDbClient,
    ) -> Result<Self, AppError> {
        let mut item: QAItem = db
            .get_item(id)
            .await?
            .ok_or_else(|| AppError::NotFound("qa item not found".to_string()))?;

        if item.updated_at != expected_updated_at {
            return Err(AppError::Conflict(
                "qa item was updated concurrently".to_string(),
            ));
        }

        item.answer = Some(answer.to_string());
        item.source_finding_id = source_finding_id;
        item.date_answered = Some(Utc::now());
        item.updated_at = Utc::now();

        db.store_item(item.clone()).await?;
        Ok(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_answer_rejects_stale_update() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");
        db.apply_migrations().await.expect("migrations");

        let item = QAItem::new(
            "deal_1".into(),
            "What is the customer churn rate?".into(),
            QACategory::Market,
            QAPriority::High,
        );
        let id = item.id.clone();
        let stale_updated_at = item.updated_at;
        db.store_item(item).await.expect("store");

        QAItem::answer(&id, "Churn is 4.2% annually", None, stale_updated_at, &db)
            .await
            .expect("first answer succeeds");

        let result = QAItem::answer(&id, "second answer", None, stale_updated_at, &db).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }
}
