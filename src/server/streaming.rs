//! SSE (Server-Sent Events) streaming for token-by-token chat responses.
//!
//! Converts a stream of GenerationEvents into an SSE stream compatible
//! with the OpenAI streaming format, terminated by `[DONE]`.

use axum::response::sse::Event;
use futures::stream::Stream;
use serde::Serialize;
use tokio_stream::StreamExt;

use crate::inference::engine::GenerationEvent;
use crate::server::unix_now;

/// Streaming chat completion chunk (OpenAI-compatible).
#[derive(Debug, Serialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: &'static str,
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Serialize)]
pub struct ChunkChoice {
    pub index: usize,
    pub delta: ChunkDelta,
    pub finish_reason: Option<&'static str>,
}

#[derive(Debug, Default, Serialize)]
pub struct ChunkDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Map one generation event to a chunk. `first` tracks whether the
/// assistant role has been sent yet.
fn event_to_chunk(
    event: GenerationEvent,
    first: &mut bool,
    request_id: &str,
    model: &str,
) -> ChatCompletionChunk {
    let (delta, finish_reason) = match event {
        GenerationEvent::Token { text, .. } => {
            let role = std::mem::take(first).then_some("assistant");
            (
                ChunkDelta {
                    role,
                    content: Some(text),
                },
                None,
            )
        }
        GenerationEvent::Done { .. } => (ChunkDelta::default(), Some("stop")),
        GenerationEvent::Error(e) => (
            ChunkDelta {
                role: None,
                content: Some(format!("[Error: {e}]")),
            },
            Some("error"),
        ),
    };

    ChatCompletionChunk {
        id: format!("chatcmpl-{request_id}"),
        object: "chat.completion.chunk",
        created: unix_now(),
        model: model.to_string(),
        choices: vec![ChunkChoice {
            index: 0,
            delta,
            finish_reason,
        }],
    }
}

/// Convert a stream of generation events into an SSE stream.
pub fn generation_to_sse_stream<S>(
    events: S,
    request_id: String,
    model: String,
) -> impl Stream<Item = Result<Event, std::convert::Infallible>>
where
    S: Stream<Item = GenerationEvent>,
{
    let mut first = true;

    events
        .map(move |event| {
            let chunk = event_to_chunk(event, &mut first, &request_id, &model);
            let data = serde_json::to_string(&chunk).unwrap_or_default();
            Ok(Event::default().data(data))
        })
        .chain(tokio_stream::once(Ok(Event::default().data("[DONE]"))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::ReceiverStream;

    #[test]
    fn test_role_only_on_first_token() {
        let mut first = true;
        let token = |t: &str| GenerationEvent::Token {
            token_id: 0,
            text: t.to_string(),
        };

        let a = event_to_chunk(token("he"), &mut first, "r1", "m");
        let b = event_to_chunk(token("llo"), &mut first, "r1", "m");

        assert_eq!(a.choices[0].delta.role, Some("assistant"));
        assert_eq!(b.choices[0].delta.role, None);
        assert_eq!(b.choices[0].delta.content.as_deref(), Some("llo"));
        assert_eq!(a.id, "chatcmpl-r1");
    }

    #[test]
    fn test_done_and_error_chunks() {
        let mut first = false;
        let done = event_to_chunk(
            GenerationEvent::Done {
                total_tokens: 3,
                prompt_tokens: 1,
                completion_tokens: 2,
            },
            &mut first,
            "r",
            "m",
        );
        assert_eq!(done.choices[0].finish_reason, Some("stop"));
        let json = serde_json::to_value(&done).unwrap();
        assert_eq!(json["choices"][0]["delta"], serde_json::json!({}));

        let err = event_to_chunk(GenerationEvent::Error("boom".into()), &mut first, "r", "m");
        assert_eq!(err.choices[0].finish_reason, Some("error"));
        assert_eq!(err.choices[0].delta.content.as_deref(), Some("[Error: boom]"));
    }

    #[tokio::test]
    async fn test_stream_ends_with_done_sentinel() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(GenerationEvent::Token {
            token_id: 1,
            text: "hi".into(),
        })
        .await
        .unwrap();
        tx.send(GenerationEvent::Done {
            total_tokens: 2,
            prompt_tokens: 1,
            completion_tokens: 1,
        })
        .await
        .unwrap();
        drop(tx);

        let events: Vec<_> =
            generation_to_sse_stream(ReceiverStream::new(rx), "r".into(), "m".into())
                .collect()
                .await;
        assert_eq!(events.len(), 3);
    }
}
