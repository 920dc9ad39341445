use std::pin::Pin;

use async_openai::{config::OpenAIConfig, types::CreateChatCompletionRequest, Client};
use async_stream::stream;
use common::error::AppError;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

/// One discrete event of a streamed turn, per §4.8's streaming contract.
/// `FinalTokenStream` chunks carry incremental text; the others mark tool
/// invocation boundaries so a caller can render "Searching documents…"
/// style progress without waiting for the whole turn.
#[derive(Debug, Clone)]
pub enum TurnEvent {
    CallStarted { tool_name: String },
    ToolSummary { tool_name: String, summary: String },
    CallCompleted { tool_name: String },
    FinalTokenStream { delta: String },
    Cancelled,
    Error { message: String },
}

pub type EventStream = Pin<Box<dyn Stream<Item = TurnEvent> + Send>>;

/// Streams token deltas for a request that needs no further tool calls
/// (the tool-call decision loop already ran and this is the final
/// answer-generation pass). Aborts early, emitting `Cancelled`, if `cancel`
/// fires mid-stream — partial tokens already emitted are left as-is, since
/// the caller owns whatever it already rendered.
pub fn stream_final_answer(
    client: Client<OpenAIConfig>,
    request: CreateChatCompletionRequest,
    cancel: CancellationToken,
) -> EventStream {
    Box::pin(stream! {
        let openai_stream = match client.chat().create_stream(request).await {
            Ok(stream) => stream,
            Err(e) => {
                yield TurnEvent::Error { message: e.to_string() };
                return;
            }
        };

        let mut openai_stream = openai_stream;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    yield TurnEvent::Cancelled;
                    return;
                }
                next = openai_stream.next() => {
                    match next {
                        None => return,
                        Some(Err(e)) => {
                            yield TurnEvent::Error { message: e.to_string() };
                            return;
                        }
                        Some(Ok(response)) => {
                            let delta = response
                                .choices
                                .first()
                                .and_then(|choice| choice.delta.content.clone())
                                .unwrap_or_default();
                            if !delta.is_empty() {
                                yield TurnEvent::FinalTokenStream { delta };
                            }
                        }
                    }
                }
            }
        }
    })
}

/// Collects a `stream_final_answer` run into the complete answer text, for
/// callers (like the write-back/compress paths) that need the whole
/// response rather than incremental events.
pub async fn collect_final_answer(mut events: EventStream) -> Result<String, AppError> {
    let mut answer = String::new();
    while let Some(event) = events.next().await {
        match event {
            TurnEvent::FinalTokenStream { delta } => answer.push_str(&delta),
            TurnEvent::Cancelled => return Err(AppError::Timeout("turn cancelled mid-stream".into())),
            TurnEvent::Error { message } => return Err(AppError::ProviderContract(message)),
            _ => {}
        }
    }
    Ok(answer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn fake_events(events: Vec<TurnEvent>) -> EventStream {
        Box::pin(stream::iter(events))
    }

    #[tokio::test]
    async fn collect_final_answer_concatenates_token_deltas() {
        let events = fake_events(vec![
            TurnEvent::FinalTokenStream { delta: "hello".to_string() },
            TurnEvent::FinalTokenStream { delta: " world".to_string() },
        ]);
        let answer = collect_final_answer(events).await.unwrap();
        assert_eq!(answer, "hello world");
    }

    #[tokio::test]
    async fn collect_final_answer_errors_on_cancellation() {
        let events = fake_events(vec![
            TurnEvent::FinalTokenStream { delta: "partial".to_string() },
            TurnEvent::Cancelled,
        ]);
        let result = collect_final_answer(events).await;
        assert!(result.is_err());
    }
}
