//! Heuristic token estimation
//!
//! Exact tokenization varies by provider; the estimator approximates from
//! character counts with provider-specific adjustments. It is the universal
//! fallback: budget checks use it whenever a provider's own counter fails or
//! does not exist, so it must never fail itself.

use crate::conversation::{ContentBlock, Message};
use crate::error::CourierResult;
use async_trait::async_trait;

/// Anything that can count tokens for content blocks
///
/// Providers with a server-side counting endpoint implement this with a real
/// call; [`TokenEstimator`] implements it with the character heuristic. The
/// budget manager only sees the trait.
#[async_trait]
pub trait TokenCounter: Send + Sync {
    /// Count tokens for a slice of content blocks
    ///
    /// Must return `Ok(0)` for empty content rather than erroring.
    async fn count_tokens(&self, content: &[ContentBlock]) -> CourierResult<u32>;
}

/// Character-count token estimator
#[derive(Debug, Clone)]
pub struct TokenEstimator {
    /// Characters per token (average)
    chars_per_token: f32,
    /// Overhead tokens per message (role, formatting)
    message_overhead: u32,
    /// Flat cost charged per image block
    image_tokens: u32,
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenEstimator {
    /// Create an estimator with default settings
    pub fn new() -> Self {
        Self {
            chars_per_token: 4.0, // Common approximation for English text
            message_overhead: 4,  // Role token + formatting
            image_tokens: 1_600,
        }
    }

    /// Create an estimator tuned for a specific provider
    pub fn for_provider(provider: &str) -> Self {
        match provider.to_lowercase().as_str() {
            "anthropic" => Self {
                chars_per_token: 3.5, // Claude tends to have slightly smaller tokens
                message_overhead: 3,
                image_tokens: 1_600,
            },
            "openai" => Self {
                chars_per_token: 4.0,
                message_overhead: 4,
                image_tokens: 1_600,
            },
            _ => Self::default(),
        }
    }

    /// Estimate tokens for a string
    pub fn estimate_text(&self, text: &str) -> u32 {
        (text.len() as f32 / self.chars_per_token).ceil() as u32
    }

    /// Estimate tokens for one content block
    pub fn estimate_block(&self, block: &ContentBlock) -> u32 {
        match block {
            ContentBlock::Text { text } => self.estimate_text(text),
            ContentBlock::Image { .. } => self.image_tokens,
        }
    }

    /// Estimate tokens for a slice of content blocks
    pub fn estimate_content(&self, content: &[ContentBlock]) -> u32 {
        content.iter().map(|block| self.estimate_block(block)).sum()
    }

    /// Estimate tokens for a single message, including per-message overhead
    pub fn estimate_message(&self, message: &Message) -> u32 {
        self.estimate_content(&message.content) + self.message_overhead
    }

    /// Estimate tokens for a whole conversation
    pub fn estimate_conversation(&self, messages: &[Message]) -> u32 {
        messages
            .iter()
            .map(|message| self.estimate_message(message))
            .sum()
    }
}

#[async_trait]
impl TokenCounter for TokenEstimator {
    async fn count_tokens(&self, content: &[ContentBlock]) -> CourierResult<u32> {
        Ok(self.estimate_content(content))
    }
}
