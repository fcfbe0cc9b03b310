//! Normalized event stream shared by all provider adapters
//!
//! Adapters translate their vendor wire formats into [`StreamEvent`]s, so
//! consumers fold one shape regardless of backend. Streams are pull-based and
//! single-use; dropping one cancels the underlying request.

use crate::error::CourierResult;
use crate::types::TokenUsage;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// One normalized chunk of a streaming model response
///
/// Serialized form is a tagged union: `{"type": "text", "text": ...}`,
/// `{"type": "reasoning", ...}`, `{"type": "usage", ...}`. Adding a variant
/// is a compile error for every consumer match, which is the point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Incremental answer text
    Text {
        /// The text fragment
        text: String,
    },
    /// Incremental reasoning/thinking text, kept separate from the answer
    Reasoning {
        /// The reasoning fragment
        text: String,
    },
    /// Token accounting, usually once near the end of the stream
    ///
    /// Adapters may emit more than one of these (some gateways report running
    /// totals); the last one observed is authoritative.
    Usage(TokenUsage),
}

impl StreamEvent {
    /// Create a text event
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Create a reasoning event
    pub fn reasoning(text: impl Into<String>) -> Self {
        Self::Reasoning { text: text.into() }
    }

    /// Create a usage event
    pub fn usage(usage: TokenUsage) -> Self {
        Self::Usage(usage)
    }
}

/// Stream of normalized events from one model call
pub type EventStream = Pin<Box<dyn Stream<Item = CourierResult<StreamEvent>> + Send>>;

/// A fully drained stream
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectedMessage {
    /// Concatenated answer text
    pub text: String,
    /// Concatenated reasoning text
    pub reasoning: String,
    /// Final usage record, if the stream carried one
    pub usage: Option<TokenUsage>,
}

/// Utility functions for draining event streams
pub mod stream_utils {
    use super::*;
    use futures::StreamExt;

    /// Drain a stream into one collected message
    ///
    /// Stops at the first error; events already consumed are lost, matching
    /// the single-use stream contract.
    pub async fn collect(mut stream: EventStream) -> CourierResult<CollectedMessage> {
        let mut collected = CollectedMessage::default();
        while let Some(event) = stream.next().await {
            match event? {
                StreamEvent::Text { text } => collected.text.push_str(&text),
                StreamEvent::Reasoning { text } => collected.reasoning.push_str(&text),
                StreamEvent::Usage(usage) => collected.usage = Some(usage),
            }
        }
        Ok(collected)
    }

    /// Drain a stream keeping only the answer text
    pub async fn collect_text(stream: EventStream) -> CourierResult<String> {
        Ok(collect(stream).await?.text)
    }

    /// Wrap a concrete stream into the boxed alias
    pub fn boxed<S>(stream: S) -> EventStream
    where
        S: Stream<Item = CourierResult<StreamEvent>> + Send + 'static,
    {
        Box::pin(stream)
    }
}
