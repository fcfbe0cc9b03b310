//! Normalization of OpenAI-compatible SSE streams
//!
//! Chat Completions streams are bare `data:` lines ending in a `[DONE]`
//! sentinel. With `stream_options.include_usage` set, the final data chunk
//! carries the usage payload; DeepSeek additionally reports cache hits and
//! reasoning text through the same shape.

use crate::error::{classify, ClassifiedError, CourierResult, RawProviderError};
use crate::models::ModelDescriptor;
use crate::provider::openai::PROVIDER_NAME;
use crate::sse::{SseDecoder, SseEvent};
use crate::stream::{EventStream, StreamEvent};
use crate::usage::{normalize_usage, RawProviderUsage};
use futures::{future, stream, Stream, StreamExt};
use serde::Deserialize;
use serde_json::Value;

struct StreamState {
    decoder: SseDecoder,
    descriptor: ModelDescriptor,
}

/// One parsed `data:` payload
#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
}

/// Usage as Chat Completions reports it, with the nested detail objects
#[derive(Debug, Default, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    prompt_tokens_details: Option<PromptTokensDetails>,
    #[serde(default)]
    completion_tokens_details: Option<CompletionTokensDetails>,
    /// DeepSeek's top-level spelling of the cache-read count
    #[serde(default)]
    prompt_cache_hit_tokens: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct PromptTokensDetails {
    #[serde(default)]
    cached_tokens: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct CompletionTokensDetails {
    #[serde(default)]
    reasoning_tokens: Option<u32>,
}

impl WireUsage {
    fn into_raw(self) -> RawProviderUsage {
        RawProviderUsage {
            input_tokens: self.prompt_tokens,
            output_tokens: self.completion_tokens,
            // Writes are free and unreported on this API.
            cache_write_tokens: None,
            cache_read_tokens: self
                .prompt_tokens_details
                .and_then(|details| details.cached_tokens)
                .or(self.prompt_cache_hit_tokens),
            reasoning_tokens: self
                .completion_tokens_details
                .and_then(|details| details.reasoning_tokens),
        }
    }
}

/// Parse a Chat Completions SSE byte stream into normalized events
pub(super) fn normalize(
    byte_stream: impl Stream<Item = Result<impl AsRef<[u8]> + Send + 'static, reqwest::Error>>
        + Send
        + 'static,
    descriptor: ModelDescriptor,
) -> EventStream {
    let state = StreamState {
        decoder: SseDecoder::new(),
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
        if event.is_done() {
            continue;
        }
        let chunk: ChatChunk = match serde_json::from_str(&event.data) {
            Ok(chunk) => chunk,
            Err(_) => continue,
        };

        if let Some(error) = chunk.error {
            out.push(Err(stream_error(&error).into()));
            continue;
        }

        if let Some(choice) = chunk.choices.first() {
            if let Some(text) = choice.delta.reasoning_content.as_deref() {
                if !text.is_empty() {
                    out.push(Ok(StreamEvent::reasoning(text)));
                }
            }
            if let Some(text) = choice.delta.content.as_deref() {
                if !text.is_empty() {
                    out.push(Ok(StreamEvent::text(text)));
                }
            }
        }

        if let Some(usage) = chunk.usage {
            out.push(Ok(StreamEvent::usage(normalize_usage(
                &usage.into_raw(),
                &state.descriptor,
            ))));
        }
    }
}

/// Map an in-stream error payload onto the classified envelope
fn stream_error(error: &Value) -> ClassifiedError {
    let message = error["message"].as_str().unwrap_or("unknown stream error");
    let mut raw = RawProviderError::new(message);
    raw.error_type = error["type"].as_str().map(String::from);
    raw.status = error["code"].as_u64().and_then(|code| u16::try_from(code).ok());
    classify(raw, PROVIDER_NAME)
}
