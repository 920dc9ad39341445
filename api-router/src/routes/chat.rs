use agent_orchestrator::TurnContext;
use async_stream::stream;
use axum::{
    extract::State,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    Extension, Json,
};
use common::storage::types::{
    conversation::Conversation,
    message::{Message, MessageRole},
};
use futures::Stream;
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{api_state::ApiState, error::ApiError, principal::Principal};

const TOKEN_CHUNK_CHARS: usize = 40;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub deal_id: String,
    pub conversation_id: Option<String>,
    pub message: String,
}

/// `POST /chat`: runs one turn through the agent orchestrator and replays it
/// as the §6 streaming wire format. The orchestrator's `process_turn` runs
/// to completion before this handler streams anything back — it has no
/// incremental event hook of its own (`streaming::stream_final_answer` is a
/// lower-level primitive the orchestrator's internal tool loop doesn't call
/// through) — so `token` events here are the finished answer rechunked
/// rather than true incremental generation, and no `tool_start`/`tool_result`
/// events are emitted since the orchestrator doesn't surface them past its
/// own boundary.
pub async fn chat(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let conversation_id = match &request.conversation_id {
        Some(id) => id.clone(),
        None => {
            let conversation = Conversation::new(request.deal_id.clone(), "New conversation".to_string());
            state.db.store_item(conversation.clone()).await.map_err(common::error::AppError::from)?;
            conversation.id
        }
    };

    let (_conversation, history) = Conversation::get_complete_conversation(&conversation_id, &request.deal_id, &state.db)
        .await
        .map_err(|err| match err {
            common::error::AppError::NotAuthorized(_) => ApiError::NotFound("conversation not found".to_string()),
            other => ApiError::from(other),
        })?;

    let user_message = Message::new(conversation_id.clone(), MessageRole::User, request.message.clone(), None);
    state.db.store_item(user_message).await.map_err(common::error::AppError::from)?;

    let ctx = TurnContext {
        org_id: principal.org_id.clone(),
        deal_id: request.deal_id.clone(),
        user_id: principal.user_id.clone(),
        conversation_id,
        cancel: CancellationToken::new(),
    };

    let result = state.orchestrator.process_turn(&ctx, &history, &request.message).await?;

    let events = stream! {
        for chunk in chunk_text(&result.content, TOKEN_CHUNK_CHARS) {
            yield Ok(Event::default().event("token").data(json!({ "delta": chunk }).to_string()));
        }
        for source in &result.sources {
            yield Ok(Event::default().event("source").data(json!({ "doc_id": source, "location": null }).to_string()));
        }
        let done_id = Uuid::new_v4().to_string();
        yield Ok(Event::default().event("done").id(done_id).data(
            json!({ "usage": { "input": 0, "output": result.tokens_used, "cost_usd": 0.0 } }).to_string(),
        ));
    };

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

fn chunk_text(text: &str, chunk_chars: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    text.chars()
        .collect::<Vec<char>>()
        .chunks(chunk_chars.max(1))
        .map(|c| c.iter().collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_text_splits_into_bounded_pieces() {
        let text = "a".repeat(100);
        let chunks = chunk_text(&text, 40);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 40);
        assert_eq!(chunks[2].len(), 20);
    }

    #[test]
    fn chunk_text_on_empty_input_yields_no_chunks() {
        assert!(chunk_text("", 40).is_empty());
    }
}
