use chrono::Utc;
use surrealdb::opt::PatchOp;
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

use super::message::Message;

stored_object!(Conversation, "conversation", {
    deal_id: String,
    title: String
});

impl Conversation {
    pub fn new(deal_id: String, title: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            deal_id,
            title,
        }
    }

    pub async fn get_complete_conversation(
        conversation_id: &str,
        deal_id: &str,
        db: &SurrealDbClient,
    ) -> Result<(Self, Vec<Message>), AppError> {
        let conversation: Conversation = db
            .get_item(conversation_id)
            .await?
            .ok_or_else(|| AppError::NotFound("conversation not found".to_string()))?;

        if conversation.deal_id != deal_id {
            return Err(AppError::NotAuthorized(
                "conversation does not belong to this deal".to_string(),
            ));
        }

        let messages: Vec<Message> = db
            .client
            .query("SELECT * FROM type::table($table_name) WHERE conversation_id = $conversation_id ORDER BY updated_at")
            .bind(("table_name", Message::table_name()))
            .bind(("conversation_id", conversation_id.to_string()))
            .await?
            .take(0)?;

        Ok((conversation, messages))
    }

    pub async fn patch_title(
        id: &str,
        deal_id: &str,
        new_title: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        let conversation: Option<Conversation> = db.get_item(id).await?;
        let conversation =
            conversation.ok_or_else(|| AppError::NotFound("conversation not found".to_string()))?;

        if conversation.deal_id != deal_id {
            return Err(AppError::NotAuthorized(
                "conversation does not belong to this deal".to_string(),
            ));
        }

        let _updated: Option<Self> = db
            .update((Self::table_name(), id))
            .patch(PatchOp::replace("/title", new_title.to_string()))
            .patch(PatchOp::replace(
                "/updated_at",
                surrealdb::Datetime::from(Utc::now()),
            ))
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::types::message::MessageRole;

    use super::*;

    #[tokio::test]
    async fn test_create_conversation() {
        let namespace = "test_ns";
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory(namespace, database)
            .await
            .expect("Failed to start in-memory surrealdb");

        let deal_id = "deal_1";
        let title = "Test Conversation";
        let conversation = Conversation::new(deal_id.to_string(), title.to_string());

        assert_eq!(conversation.deal_id, deal_id);
        assert_eq!(conversation.title, title);
        assert!(!conversation.id.is_empty());

        let result = db.store_item(conversation.clone()).await;
        assert!(result.is_ok());

        let retrieved: Option<Conversation> = db
            .get_item(&conversation.id)
            .await
            .expect("Failed to retrieve conversation");
        assert!(retrieved.is_some());

        let retrieved = retrieved.unwrap();
        assert_eq!(retrieved.id, conversation.id);
        assert_eq!(retrieved.deal_id, deal_id);
        assert_eq!(retrieved.title, title);
    }

    #[tokio::test]
    async fn test_get_complete_conversation_not_found() {
        let namespace = "test_ns";
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory(namespace, database)
            .await
            .expect("Failed to start in-memory surrealdb");

        let result = Conversation::get_complete_conversation("nonexistent_id", "deal_1", &db).await;
        assert!(result.is_err());

        match result {
            Err(AppError::NotFound(_)) => {}
            _ => panic!("Expected NotFound error"),
        }
    }

    #[tokio::test]
    async fn test_get_complete_conversation_unauthorized() {
        let namespace = "test_ns";
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory(namespace, database)
            .await
            .expect("Failed to start in-memory surrealdb");

        let deal_1 = "deal_1";
        let conversation =
            Conversation::new(deal_1.to_string(), "Private Conversation".to_string());
        let conversation_id = conversation.id.clone();

        db.store_item(conversation)
            .await
            .expect("Failed to store conversation");

        let deal_2 = "deal_2";
        let result = Conversation::get_complete_conversation(&conversation_id, deal_2, &db).await;
        assert!(result.is_err());

        match result {
            Err(AppError::NotAuthorized(_)) => {}
            _ => panic!("Expected NotAuthorized error"),
        }
    }

    #[tokio::test]
    async fn test_patch_title_success() {
        let namespace = "test_ns";
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory(namespace, database)
            .await
            .expect("Failed to start in-memory surrealdb");

        let deal_id = "deal_1";
        let original_title = "Original Title";
        let conversation = Conversation::new(deal_id.to_string(), original_title.to_string());
        let conversation_id = conversation.id.clone();

        db.store_item(conversation)
            .await
            .expect("Failed to store conversation");

        let new_title = "Updated Title";

        let result = Conversation::patch_title(&conversation_id, deal_id, new_title, &db).await;
        assert!(result.is_ok());

        let updated_conversation = db
            .get_item::<Conversation>(&conversation_id)
            .await
            .expect("Failed to get conversation")
            .expect("Conversation missing");
        assert_eq!(updated_conversation.title, new_title);
        assert_eq!(updated_conversation.deal_id, deal_id);
    }

    #[tokio::test]
    async fn test_patch_title_not_found() {
        let namespace = "test_ns";
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory(namespace, database)
            .await
            .expect("Failed to start in-memory surrealdb");

        let result = Conversation::patch_title("nonexistent", "deal_x", "New Title", &db).await;

        assert!(result.is_err());
        match result {
            Err(AppError::NotFound(_)) => {}
            _ => panic!("Expected NotFound error"),
        }
    }

    #[tokio::test]
    async fn test_patch_title_unauthorized() {
        let namespace = "test_ns";
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory(namespace, database)
            .await
            .expect("Failed to start in-memory surrealdb");

        let owner_deal = "deal_owner";
        let other_deal = "deal_intruder";
        let conversation = Conversation::new(owner_deal.to_string(), "Private".to_string());
        let conversation_id = conversation.id.clone();

        db.store_item(conversation)
            .await
            .expect("Failed to store conversation");

        let result =
            Conversation::patch_title(&conversation_id, other_deal, "Hacked Title", &db).await;

        assert!(result.is_err());
        match result {
            Err(AppError::NotAuthorized(_)) => {}
            _ => panic!("Expected NotAuthorized error"),
        }
    }

    #[tokio::test]
    async fn test_get_complete_conversation_with_messages() {
        let namespace = "test_ns";
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory(namespace, database)
            .await
            .expect("Failed to start in-memory surrealdb");

        let deal_1 = "deal_1";
        let conversation = Conversation::new(deal_1.to_string(), "Conversation".to_string());
        let conversation_id = conversation.id.clone();

        db.store_item(conversation)
            .await
            .expect("Failed to store conversation");

        let message1 = Message::new(
            conversation_id.clone(),
            MessageRole::User,
            "What changed in revenue recognition this quarter?".to_string(),
            None,
        );
        let message2 = Message::new(
            conversation_id.clone(),
            MessageRole::Assistant,
            "Revenue recognition shifted from point-in-time to over-time for three contracts."
                .to_string(),
            None,
        );
        let message3 = Message::new(
            conversation_id.clone(),
            MessageRole::User,
            "Which documents support that?".to_string(),
            None,
        );

        db.store_item(message1)
            .await
            .expect("Failed to store message1");
        db.store_item(message2)
            .await
            .expect("Failed to store message2");
        db.store_item(message3)
            .await
            .expect("Failed to store message3");

        let result = Conversation::get_complete_conversation(&conversation_id, deal_1, &db).await;
        assert!(result.is_ok(), "Failed to retrieve complete conversation");

        let (retrieved_conversation, messages) = result.unwrap();

        assert_eq!(retrieved_conversation.id, conversation_id);
        assert_eq!(retrieved_conversation.deal_id, deal_1);
        assert_eq!(retrieved_conversation.title, "Conversation");

        assert_eq!(messages.len(), 3);

        let deal_2 = "deal_2";
        let unauthorized_result =
            Conversation::get_complete_conversation(&conversation_id, deal_2, &db).await;
        assert!(unauthorized_result.is_err());
        match unauthorized_result {
            Err(AppError::NotAuthorized(_)) => {}
            _ => panic!("Expected NotAuthorized error"),
        }
    }
}
