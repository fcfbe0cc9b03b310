//! Courier core library
//!
//! Courier brokers conversations to interchangeable LLM backends. This crate
//! provides the provider adapters with their normalized event stream, token
//! budget management with sliding-window truncation, usage accounting with
//! cost attribution, and uniform error classification.

pub mod context;
pub mod conversation;
pub mod error;
pub mod models;
pub mod provider;
pub mod sse;
pub mod stream;
pub mod types;
pub mod usage;

// Re-export commonly used types
pub use context::{allowed_input_tokens, truncate_if_needed, TokenCounter, TokenEstimator, TruncationRequest};
pub use conversation::{ContentBlock, Message, MessageRole};
pub use error::{classify, ClassifiedError, CourierError, CourierResult, RawProviderError, StatusClass};
pub use models::{descriptor_for, ModelDescriptor};
pub use provider::{
    build_provider, ModelInfo, ModelParameters, Provider, ProviderConfig, ProviderInstance,
    ProviderKind, RequestMetadata,
};
pub use stream::{CollectedMessage, EventStream, StreamEvent};
pub use types::TokenUsage;
pub use usage::{normalize_usage, normalize_usage_with_cache_ttl, RawProviderUsage};
