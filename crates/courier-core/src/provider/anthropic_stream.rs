//! Normalization of Anthropic SSE streams
//!
//! Anthropic splits a response across typed events: usage arrives partly in
//! `message_start` and partly in `message_delta`, text and thinking arrive as
//! `content_block_delta`s. This module folds that shape into the normalized
//! event stream, emitting the final usage record at `message_stop`.

use crate::error::{classify, ClassifiedError, CourierResult, RawProviderError};
use crate::models::ModelDescriptor;
use crate::provider::anthropic::PROVIDER_NAME;
use crate::sse::{SseDecoder, SseEvent};
use crate::stream::{EventStream, StreamEvent};
use crate::usage::{normalize_usage, RawProviderUsage};
use futures::{future, stream, Stream, StreamExt};
use serde_json::Value;

struct StreamState {
    decoder: SseDecoder,
    usage: RawProviderUsage,
    descriptor: ModelDescriptor,
}

/// Parse an Anthropic SSE byte stream into normalized events
pub(super) fn normalize(
    byte_stream: impl Stream<Item = Result<impl AsRef<[u8]> + Send + 'static, reqwest::Error>>
        + Send
        + 'static,
    descriptor: ModelDescriptor,
) -> EventStream {
    let state = StreamState {
        decoder: SseDecoder::new(),
        usage: RawProviderUsage::default(),
        descriptor,
    };

    let stream = byte_stream
        .scan(state, |state, chunk_result| {
            let out = match chunk_result {
                Ok(chunk) => {
                    let events = state.decoder.feed(chunk.as_ref());
                    let mut out = Vec::new();
                    process_events(state, events, &mut out);
                    out
                }
                Err(e) => vec![Err(
                    classify(RawProviderError::from_transport(&e), PROVIDER_NAME).into(),
                )],
            };
            future::ready(Some(stream::iter(out)))
        })
        .flatten();

    Box::pin(stream)
}

fn process_events(
    state: &mut StreamState,
    events: Vec<SseEvent>,
    out: &mut Vec<CourierResult<StreamEvent>>,
) {
    for event in events {
        let data: Value = match serde_json::from_str(&event.data) {
            Ok(value) => value,
            Err(_) => continue,
        };

        // Typed `event:` line when present, embedded "type" field otherwise.
        let event_type = event
            .event_type
            .as_deref()
            .or_else(|| data["type"].as_str());

        match event_type {
            Some("message_start") => {
                merge_usage(state, &data["message"]["usage"]);
            }
            Some("content_block_start") => {
                // The opening block usually carries empty text, but a
                // non-empty one must not be lost.
                let block = &data["content_block"];
                match block["type"].as_str() {
                    Some("text") => push_text(out, block["text"].as_str()),
                    Some("thinking") => push_reasoning(out, block["thinking"].as_str()),
                    _ => {}
                }
            }
            Some("content_block_delta") => {
                let delta = &data["delta"];
                match delta["type"].as_str() {
                    Some("text_delta") => push_text(out, delta["text"].as_str()),
                    Some("thinking_delta") => push_reasoning(out, delta["thinking"].as_str()),
                    // signature_delta carries no renderable content
                    _ => {}
                }
            }
            Some("message_delta") => {
                merge_usage(state, &data["usage"]);
            }
            Some("message_stop") => {
                out.push(Ok(StreamEvent::usage(normalize_usage(
                    &state.usage,
                    &state.descriptor,
                ))));
            }
            Some("error") => {
                out.push(Err(stream_error(&data).into()));
            }
            // ping, content_block_stop, and future event types
            _ => {}
        }
    }
}

fn push_text(out: &mut Vec<CourierResult<StreamEvent>>, text: Option<&str>) {
    if let Some(text) = text {
        if !text.is_empty() {
            out.push(Ok(StreamEvent::text(text)));
        }
    }
}

fn push_reasoning(out: &mut Vec<CourierResult<StreamEvent>>, text: Option<&str>) {
    if let Some(text) = text {
        if !text.is_empty() {
            out.push(Ok(StreamEvent::reasoning(text)));
        }
    }
}

fn merge_usage(state: &mut StreamState, value: &Value) {
    if !value.is_object() {
        return;
    }
    if let Ok(parsed) = serde_json::from_value::<RawProviderUsage>(value.clone()) {
        state.usage.merge(&parsed);
    }
}

/// Map an in-stream error event onto the classified envelope
fn stream_error(data: &Value) -> ClassifiedError {
    let error = &data["error"];
    let message = error["message"].as_str().unwrap_or("unknown stream error");
    let error_type = error["type"].as_str();
    let status = match error_type {
        Some("rate_limit_error") => Some(429),
        Some("authentication_error") => Some(401),
        Some("permission_error") => Some(403),
        Some("invalid_request_error") => Some(400),
        Some("not_found_error") => Some(404),
        Some("overloaded_error") => Some(503),
        Some("api_error") => Some(500),
        _ => None,
    };

    let mut raw = RawProviderError::new(message);
    raw.status = status;
    raw.error_type = error_type.map(String::from);
    classify(raw, PROVIDER_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CourierError, StatusClass};
    use crate::models::descriptor_for;

    fn event(event_type: &str, data: &str) -> Vec<u8> {
        format!("event: {event_type}\ndata: {data}\n\n").into_bytes()
    }

    async fn run(chunks: Vec<Vec<u8>>) -> Vec<CourierResult<StreamEvent>> {
        let byte_stream = stream::iter(chunks.into_iter().map(Ok::<_, reqwest::Error>));
        normalize(byte_stream, descriptor_for("claude-3-5-sonnet-20241022"))
            .collect()
            .await
    }

    fn full_response() -> Vec<Vec<u8>> {
        vec![
            event(
                "message_start",
                r#"{"type":"message_start","message":{"usage":{"input_tokens":1000,"output_tokens":1}}}"#,
            ),
            event(
                "content_block_start",
                r#"{"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#,
            ),
            event(
                "content_block_delta",
                r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hello"}}"#,
            ),
            event(
                "content_block_delta",
                r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":" world"}}"#,
            ),
            event(
                "content_block_stop",
                r#"{"type":"content_block_stop","index":0}"#,
            ),
            event(
                "message_delta",
                r#"{"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":2000}}"#,
            ),
            event("message_stop", r#"{"type":"message_stop"}"#),
        ]
    }

    #[tokio::test]
    async fn test_text_deltas_stream_through() {
        let events = run(full_response()).await;
        assert_eq!(events.len(), 3);
        assert_eq!(
            *events[0].as_ref().unwrap(),
            StreamEvent::text("Hello")
        );
        assert_eq!(
            *events[1].as_ref().unwrap(),
            StreamEvent::text(" world")
        );

        let usage = events[2].as_ref().unwrap().clone();
        match usage {
            StreamEvent::Usage(usage) => {
                assert_eq!(usage.input_tokens, 1000);
                assert_eq!(usage.output_tokens, 2000);
                // 1000 in at $3/MTok plus 2000 out at $15/MTok
                let cost = usage.total_cost.unwrap();
                assert!((cost - 0.033).abs() < 1e-12, "cost was {cost}");
            }
            other => panic!("expected usage, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_split_byte_chunks_produce_same_events() {
        let joined: Vec<u8> = full_response().concat();
        let chunks: Vec<Vec<u8>> = joined.chunks(7).map(<[u8]>::to_vec).collect();
        let events = run(chunks).await;
        assert_eq!(events.len(), 3);
        assert_eq!(*events[0].as_ref().unwrap(), StreamEvent::text("Hello"));
        assert_eq!(*events[1].as_ref().unwrap(), StreamEvent::text(" world"));
    }

    #[tokio::test]
    async fn test_thinking_deltas_become_reasoning() {
        let events = run(vec![
            event(
                "content_block_start",
                r#"{"type":"content_block_start","index":0,"content_block":{"type":"thinking","thinking":""}}"#,
            ),
            event(
                "content_block_delta",
                r#"{"type":"content_block_delta","index":0,"delta":{"type":"thinking_delta","thinking":"Let me check"}}"#,
            ),
            event(
                "content_block_delta",
                r#"{"type":"content_block_delta","index":0,"delta":{"type":"signature_delta","signature":"abc"}}"#,
            ),
        ])
        .await;

        assert_eq!(events.len(), 1);
        assert_eq!(
            *events[0].as_ref().unwrap(),
            StreamEvent::reasoning("Let me check")
        );
    }

    #[tokio::test]
    async fn test_usage_merges_across_start_and_delta() {
        let events = run(vec![
            event(
                "message_start",
                r#"{"type":"message_start","message":{"usage":{"input_tokens":2095,"output_tokens":1,"cache_creation_input_tokens":1024,"cache_read_input_tokens":512}}}"#,
            ),
            event(
                "message_delta",
                r#"{"type":"message_delta","delta":{},"usage":{"output_tokens":503}}"#,
            ),
            event("message_stop", r#"{"type":"message_stop"}"#),
        ])
        .await;

        assert_eq!(events.len(), 1);
        match events[0].as_ref().unwrap() {
            StreamEvent::Usage(usage) => {
                assert_eq!(usage.input_tokens, 2095);
                assert_eq!(usage.output_tokens, 503);
                assert_eq!(usage.cache_write_tokens, 1024);
                assert_eq!(usage.cache_read_tokens, 512);
            }
            other => panic!("expected usage, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_error_event_is_classified() {
        let events = run(vec![event(
            "error",
            r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
        )])
        .await;

        assert_eq!(events.len(), 1);
        match events[0].as_ref().unwrap_err() {
            CourierError::Provider(classified) => {
                assert_eq!(classified.status, 503);
                assert_eq!(classified.status_class, StatusClass::ModelUnavailable);
                assert_eq!(classified.provider, "anthropic");
            }
            other => panic!("expected provider error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rate_limit_error_event_is_retryable() {
        let events = run(vec![event(
            "error",
            r#"{"type":"error","error":{"type":"rate_limit_error","message":"Too many tokens"}}"#,
        )])
        .await;

        match events[0].as_ref().unwrap_err() {
            CourierError::Provider(classified) => {
                assert_eq!(classified.status_class, StatusClass::RateLimit);
                assert!(classified.retryable());
                assert_eq!(classified.retry_after_seconds, Some(30));
            }
            other => panic!("expected provider error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_data_is_skipped() {
        let events = run(vec![
            event("content_block_delta", "{not json"),
            event(
                "content_block_delta",
                r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"ok"}}"#,
            ),
        ])
        .await;

        assert_eq!(events.len(), 1);
        assert_eq!(*events[0].as_ref().unwrap(), StreamEvent::text("ok"));
    }

    #[tokio::test]
    async fn test_event_type_read_from_data_when_untyped() {
        // Some gateways strip the `event:` line; the embedded type fills in.
        let chunk =
            b"data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"hi\"}}\n\n"
                .to_vec();
        let events = run(vec![chunk]).await;
        assert_eq!(events.len(), 1);
        assert_eq!(*events[0].as_ref().unwrap(), StreamEvent::text("hi"));
    }

    #[tokio::test]
    async fn test_ping_is_ignored() {
        let events = run(vec![event("ping", r#"{"type":"ping"}"#)]).await;
        assert!(events.is_empty());
    }
}
