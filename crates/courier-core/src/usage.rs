//! Usage accounting: vendor payloads in, canonical records out
//!
//! Providers report token counts in wire shapes that disagree about field
//! names and cache semantics. Adapters deserialize whatever they receive into
//! [`RawProviderUsage`] and normalization produces the canonical
//! [`TokenUsage`], including a cost in USD when every required price is
//! known. A missing price makes the cost `None`; it is never silently zero.

use crate::models::ModelDescriptor;
use crate::types::TokenUsage;
use serde::{Deserialize, Serialize};

/// Raw usage payload as providers report it
///
/// Field aliases cover the common wire spellings: Anthropic's
/// `cache_creation_input_tokens` / `cache_read_input_tokens`, the OpenAI
/// `prompt_tokens` / `completion_tokens` pair, and DeepSeek's
/// `prompt_cache_hit_tokens`. Absent counts default to zero; absent cache
/// fields stay `None` so normalization can tell "not reported" from
/// "reported as zero".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawProviderUsage {
    /// Prompt tokens, including any cached portion
    #[serde(default, alias = "prompt_tokens")]
    pub input_tokens: u32,
    /// Completion tokens
    #[serde(default, alias = "completion_tokens")]
    pub output_tokens: u32,
    /// Tokens written to the prompt cache
    #[serde(default, alias = "cache_creation_input_tokens")]
    pub cache_write_tokens: Option<u32>,
    /// Tokens read from the prompt cache
    #[serde(
        default,
        alias = "cache_read_input_tokens",
        alias = "cached_tokens",
        alias = "prompt_cache_hit_tokens"
    )]
    pub cache_read_tokens: Option<u32>,
    /// Reasoning tokens, when reported separately
    #[serde(default)]
    pub reasoning_tokens: Option<u32>,
}

impl RawProviderUsage {
    /// Fold a later payload into this one
    ///
    /// Streaming backends split usage across events (Anthropic reports input
    /// counts at message start and output counts at message end). Non-zero
    /// counts and present cache fields from the newer payload win; everything
    /// absent falls back to what was already accumulated.
    pub fn merge(&mut self, newer: &RawProviderUsage) {
        if newer.input_tokens > 0 {
            self.input_tokens = newer.input_tokens;
        }
        if newer.output_tokens > 0 {
            self.output_tokens = newer.output_tokens;
        }
        if newer.cache_write_tokens.is_some() {
            self.cache_write_tokens = newer.cache_write_tokens;
        }
        if newer.cache_read_tokens.is_some() {
            self.cache_read_tokens = newer.cache_read_tokens;
        }
        if newer.reasoning_tokens.is_some() {
            self.reasoning_tokens = newer.reasoning_tokens;
        }
    }
}

/// Normalize a raw payload with the default cache TTL factor of 1.0
pub fn normalize_usage(raw: &RawProviderUsage, descriptor: &ModelDescriptor) -> TokenUsage {
    normalize_usage_with_cache_ttl(raw, descriptor, 1.0)
}

/// Normalize a raw payload into the canonical usage record
///
/// Cache counts pass through as reported, even for models whose descriptor
/// claims no cache support; the payload is ground truth. `cache_ttl_factor`
/// scales the cache-write price for providers that bill longer-lived cache
/// entries at a premium (Anthropic's 1h TTL writes cost 2x the 5m ones).
pub fn normalize_usage_with_cache_ttl(
    raw: &RawProviderUsage,
    descriptor: &ModelDescriptor,
    cache_ttl_factor: f64,
) -> TokenUsage {
    let cache_write_tokens = raw.cache_write_tokens.unwrap_or(0);
    let cache_read_tokens = raw.cache_read_tokens.unwrap_or(0);

    TokenUsage {
        input_tokens: raw.input_tokens,
        output_tokens: raw.output_tokens,
        cache_write_tokens,
        cache_read_tokens,
        reasoning_tokens: raw.reasoning_tokens,
        total_cost: compute_cost(
            raw.input_tokens.saturating_sub(cache_read_tokens),
            cache_read_tokens,
            cache_write_tokens,
            raw.output_tokens,
            descriptor,
            cache_ttl_factor,
        ),
    }
}

/// One billing term: zero tokens cost zero even without a price,
/// non-zero tokens without a price make the whole cost unknown
fn price_term(tokens: u32, price_per_mtok: Option<f64>) -> Option<f64> {
    if tokens == 0 {
        return Some(0.0);
    }
    price_per_mtok.map(|price| f64::from(tokens) / 1_000_000.0 * price)
}

fn compute_cost(
    non_cached_input: u32,
    cache_read: u32,
    cache_write: u32,
    output: u32,
    descriptor: &ModelDescriptor,
    cache_ttl_factor: f64,
) -> Option<f64> {
    let write_price = descriptor
        .cache_write_price_per_mtok
        .map(|price| price * cache_ttl_factor);
    Some(
        price_term(non_cached_input, descriptor.input_price_per_mtok)?
            + price_term(cache_read, descriptor.cache_read_price_per_mtok)?
            + price_term(cache_write, write_price)?
            + price_term(output, descriptor.output_price_per_mtok)?,
    )
}
