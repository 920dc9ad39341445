use std::sync::Arc;
use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use common::{error::AppError, storage::types::message::Message, utils::cache::SharedCache};
use sha2::{Digest, Sha256};

const SUMMARY_CACHE_NAMESPACE: &str = "cache:summary:";
const SUMMARY_CACHE_TTL: Duration = Duration::from_secs(86_400);
const COMPRESS_THRESHOLD: usize = 20;
const KEEP_RECENT: usize = 10;

const SUMMARIZE_SYSTEM_PROMPT: &str = "Summarize the following due-diligence conversation \
    history into a concise system note an assistant can use as context for continuing the \
    conversation. Preserve specific facts, figures and open questions; drop small talk.";

fn prefix_hash(messages: &[Message]) -> String {
    let mut hasher = Sha256::new();
    for message in messages {
        hasher.update(message.role.to_string().as_bytes());
        hasher.update(b"\0");
        hasher.update(message.content.as_bytes());
        hasher.update(b"\0");
    }
    format!("{:x}", hasher.finalize())
}

/// When a conversation exceeds `COMPRESS_THRESHOLD` messages, all but the
/// most recent `KEEP_RECENT` are folded into a single system-level summary
/// so the prompt stays bounded regardless of conversation length.
///
/// Returns `(summary, recent)` where `summary` is `None` when no compression
/// was needed.
pub async fn compress_history(
    history: &[Message],
    client: &Client<OpenAIConfig>,
    model: &str,
    cache: &Arc<SharedCache>,
) -> Result<(Option<String>, Vec<Message>), AppError> {
    if history.len() <= COMPRESS_THRESHOLD {
        return Ok((None, history.to_vec()));
    }

    let split_at = history.len() - KEEP_RECENT;
    let (older, recent) = history.split_at(split_at);

    let key = prefix_hash(older);
    if let Some(cached) = cache.get(SUMMARY_CACHE_NAMESPACE, &key).await {
        return Ok((Some(cached), recent.to_vec()));
    }

    let transcript = common::storage::types::message::format_history(older);
    let request = CreateChatCompletionRequestArgs::default()
        .model(model)
        .messages([
            ChatCompletionRequestSystemMessage::from(SUMMARIZE_SYSTEM_PROMPT).into(),
            ChatCompletionRequestUserMessage::from(transcript).into(),
        ])
        .build()?;

    let response = client.chat().create(request).await?;
    let summary = response
        .choices
        .first()
        .and_then(|choice| choice.message.content.clone())
        .ok_or_else(|| AppError::ProviderContract("no content in summarization response".into()))?;

    cache.set(SUMMARY_CACHE_NAMESPACE, &key, &summary, SUMMARY_CACHE_TTL).await;

    Ok((Some(summary), recent.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_message(content: &str) -> Message {
        Message::new("conv-1".to_string(), common::storage::types::message::MessageRole::User, content.to_string(), None)
    }

    #[tokio::test]
    async fn short_history_is_not_compressed() {
        let history: Vec<Message> = (0..5).map(|i| fake_message(&format!("turn {i}"))).collect();
        let cfg = common::utils::config::AppConfig::default();
        let cache = Arc::new(SharedCache::from_config(&cfg).await);
        let client = Client::new();

        let (summary, recent) = compress_history(&history, &client, "gpt-4o-mini", &cache).await.unwrap();
        assert!(summary.is_none());
        assert_eq!(recent.len(), 5);
    }

    #[test]
    fn prefix_hash_is_stable_for_identical_content() {
        let a = vec![fake_message("same content")];
        let b = vec![fake_message("same content")];
        assert_eq!(prefix_hash(&a), prefix_hash(&b));
    }
}
