//! Common types used throughout Courier

use serde::{Deserialize, Serialize};

/// Canonical token usage record for one model call
///
/// Produced by the usage accountant from raw provider payloads, so counts are
/// always in the provider's native tokenizer units. `input_tokens` is the full
/// prompt size including any cache reads; subtract `cache_read_tokens` for the
/// non-cached portion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TokenUsage {
    /// Tokens in the prompt, including cached tokens
    pub input_tokens: u32,
    /// Tokens in the completion
    pub output_tokens: u32,
    /// Tokens written to the prompt cache this call
    pub cache_write_tokens: u32,
    /// Tokens served from the prompt cache this call
    pub cache_read_tokens: u32,
    /// Tokens spent on reasoning, when the provider reports them separately
    pub reasoning_tokens: Option<u32>,
    /// Cost in USD, `None` when any required price is unknown
    pub total_cost: Option<f64>,
}

impl TokenUsage {
    /// Create a usage record with input and output counts only
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
            ..Default::default()
        }
    }

    /// Total tokens across prompt and completion
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }

    /// Add usage from another record
    ///
    /// An unknown cost poisons the aggregate: once any contributing call has
    /// `total_cost == None`, the sum is also `None` rather than silently low.
    pub fn add(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cache_write_tokens += other.cache_write_tokens;
        self.cache_read_tokens += other.cache_read_tokens;
        self.reasoning_tokens = match (self.reasoning_tokens, other.reasoning_tokens) {
            (Some(a), Some(b)) => Some(a + b),
            (None, Some(b)) => Some(b),
            (existing, None) => existing,
        };
        self.total_cost = match (self.total_cost, other.total_cost) {
            (Some(a), Some(b)) => Some(a + b),
            _ => None,
        };
    }

    /// Whether this call touched the prompt cache at all
    pub fn has_cache_activity(&self) -> bool {
        self.cache_write_tokens > 0 || self.cache_read_tokens > 0
    }

    /// Split input tokens into (non_cached, cached)
    pub fn cache_breakdown(&self) -> (u32, u32) {
        let cached = self.cache_read_tokens;
        (self.input_tokens.saturating_sub(cached), cached)
    }
}
