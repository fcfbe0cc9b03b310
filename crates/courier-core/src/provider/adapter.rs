//! Unified trait implemented by every backend adapter

use crate::context::{TokenCounter, TokenEstimator};
use crate::conversation::{ContentBlock, Message};
use crate::error::{ClassifiedError, CourierResult};
use crate::models::ModelDescriptor;
use crate::stream::EventStream;
use async_trait::async_trait;

/// Model identity plus its capability and pricing descriptor
#[derive(Debug, Clone)]
pub struct ModelInfo {
    /// Model id as sent on the wire
    pub id: String,
    /// Capability and pricing metadata
    pub descriptor: ModelDescriptor,
}

impl ModelInfo {
    pub fn new(id: impl Into<String>, descriptor: ModelDescriptor) -> Self {
        Self {
            id: id.into(),
            descriptor,
        }
    }
}

/// Optional request attribution forwarded to providers that accept it
#[derive(Debug, Clone, Default)]
pub struct RequestMetadata {
    /// Stable id for the task or session issuing the request
    pub task_id: Option<String>,
    /// Free-form mode label, recorded in request logs
    pub mode: Option<String>,
}

impl RequestMetadata {
    pub fn with_task_id(task_id: impl Into<String>) -> Self {
        Self {
            task_id: Some(task_id.into()),
            mode: None,
        }
    }
}

/// Unified trait for all backend adapters
///
/// An adapter owns one model on one provider. `create_message` is the
/// primary operation; the other two have defaults so adapters only
/// override what their backend actually supports.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable provider name, e.g. `"anthropic"`
    fn name(&self) -> &'static str;

    /// The model this adapter is bound to
    fn model(&self) -> ModelInfo;

    /// Stream a completion for the conversation
    ///
    /// The returned stream yields normalized events; the final `Usage`
    /// event carries the authoritative token counts for the call.
    async fn create_message(
        &self,
        system_prompt: &str,
        messages: &[Message],
        metadata: Option<&RequestMetadata>,
    ) -> CourierResult<EventStream>;

    /// Count tokens for the given content
    ///
    /// The default charges nothing for empty content and otherwise uses
    /// the character heuristic tuned for this provider. Adapters with a
    /// native counting endpoint override this.
    async fn count_tokens(&self, content: &[ContentBlock]) -> CourierResult<u32> {
        if content.is_empty() {
            return Ok(0);
        }
        TokenCounter::count_tokens(&TokenEstimator::for_provider(self.name()), content).await
    }

    /// Complete a bare text prompt without conversation framing
    ///
    /// Most chat backends have no such endpoint; the default reports the
    /// operation as unsupported.
    async fn complete_prompt(&self, prompt: &str) -> CourierResult<String> {
        let _ = prompt;
        Err(ClassifiedError::unsupported_operation(self.name(), "prompt completion").into())
    }
}

/// Any adapter can serve as the token counter for truncation decisions
#[async_trait]
impl<P: Provider + ?Sized> TokenCounter for P {
    async fn count_tokens(&self, content: &[ContentBlock]) -> CourierResult<u32> {
        Provider::count_tokens(self, content).await
    }
}
