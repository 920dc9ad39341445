#![allow(clippy::module_name_repetitions)]
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use crate::stored_object;

#[derive(Deserialize, Debug, Clone, Serialize, PartialEq)]
pub enum MessageRole {
    User,
    Assistant,
    System,
    Tool,
}

stored_object!(Message, "message", {
    conversation_id: String,
    role: MessageRole,
    content: String,
    sources: Option<Vec<String>>,
    tokens_used: Option<u32>,
    tool_calls: Option<Value>
});

impl Message {
    pub fn new(
        conversation_id: String,
        role: MessageRole,
        content: String,
        sources: Option<Vec<String>>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            conversation_id,
            role,
            content,
            sources,
            tokens_used: None,
            tool_calls: None,
        }
    }

    pub fn with_tool_calls(mut self, tool_calls: Value, tokens_used: u32) -> Self {
        self.tool_calls = Some(tool_calls);
        self.tokens_used = Some(tokens_used);
        self
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "User"),
            MessageRole::Assistant => write!(f, "Assistant"),
            MessageRole::System => write!(f, "System"),
            MessageRole::Tool => write!(f, "Tool"),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.role, self.content)
    }
}

/// Render a conversation's turns as a flat transcript, oldest first, for
/// feeding the agent orchestrator's context window.
pub fn format_history(history: &[Message]) -> String {
    history
        .iter()
        .map(|msg| format!("{msg}"))
        .collect::<Vec<String>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::db::SurrealDbClient;

    #[tokio::test]
    async fn test_message_creation() {
        let conversation_id = "test_conversation";
        let content = "This is a test message";
        let role = MessageRole::User;
        let sources = Some(vec!["chunk_1".to_string(), "chunk_2".to_string()]);

        let message = Message::new(
            conversation_id.to_string(),
            role.clone(),
            content.to_string(),
            sources.clone(),
        );

        assert_eq!(message.conversation_id, conversation_id);
        assert_eq!(message.content, content);
        assert_eq!(message.role, role);
        assert_eq!(message.sources, sources);
        assert!(!message.id.is_empty());
    }

    #[tokio::test]
    async fn test_message_persistence() {
        let namespace = "test_ns";
        let database = &uuid::Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory(namespace, database)
            .await
            .expect("Failed to start in-memory surrealdb");

        let conversation_id = "test_conversation";
        let message = Message::new(
            conversation_id.to_string(),
            MessageRole::User,
            "Hello world".to_string(),
            None,
        );
        let message_id = message.id.clone();

        db.store_item(message.clone())
            .await
            .expect("Failed to store message");

        let retrieved: Option<Message> = db
            .get_item(&message_id)
            .await
            .expect("Failed to retrieve message");

        assert!(retrieved.is_some());
        let retrieved = retrieved.unwrap();

        assert_eq!(retrieved.id, message.id);
        assert_eq!(retrieved.conversation_id, message.conversation_id);
        assert_eq!(retrieved.role, message.role);
        assert_eq!(retrieved.content, message.content);
        assert_eq!(retrieved.sources, message.sources);
    }

    #[tokio::test]
    async fn test_message_role_display() {
        assert_eq!(format!("{}", MessageRole::User), "User");
        assert_eq!(format!("{}", MessageRole::Assistant), "Assistant");
        assert_eq!(format!("{}", MessageRole::System), "System");
        assert_eq!(format!("{}", MessageRole::Tool), "Tool");
    }

    #[tokio::test]
    async fn test_format_history() {
        let messages = vec![
            Message {
                id: "1".to_string(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
                conversation_id: "test_convo".to_string(),
                role: MessageRole::User,
                content: "Hello".to_string(),
                sources: None,
                tokens_used: None,
                tool_calls: None,
            },
            Message {
                id: "2".to_string(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
                conversation_id: "test_convo".to_string(),
                role: MessageRole::Assistant,
                content: "Hi there!".to_string(),
                sources: None,
                tokens_used: None,
                tool_calls: None,
            },
        ];

        let formatted = format_history(&messages);

        assert_eq!(formatted, "User: Hello\nAssistant: Hi there!");
    }
}
