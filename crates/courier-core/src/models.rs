//! Model descriptors: context limits, feature support, and prices
//!
//! Instead of hardcoding limits per provider, each model id maps to a
//! descriptor. Prices are USD per million tokens and stay `None` when
//! unknown, so downstream cost math can report "unknown" instead of zero.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;

/// Static description of one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Maximum context window (input + output)
    pub context_window_tokens: u32,
    /// Maximum output tokens the model supports
    pub max_output_tokens: u32,
    /// Whether the model accepts image content blocks
    pub supports_images: bool,
    /// Whether the model supports prompt caching
    pub supports_prompt_cache: bool,
    /// USD per million non-cached input tokens
    pub input_price_per_mtok: Option<f64>,
    /// USD per million output tokens
    pub output_price_per_mtok: Option<f64>,
    /// USD per million cache-write tokens
    pub cache_write_price_per_mtok: Option<f64>,
    /// USD per million cache-read tokens
    pub cache_read_price_per_mtok: Option<f64>,
}

impl Default for ModelDescriptor {
    fn default() -> Self {
        Self {
            context_window_tokens: 128_000,
            max_output_tokens: 4096,
            supports_images: false,
            supports_prompt_cache: false,
            input_price_per_mtok: None,
            output_price_per_mtok: None,
            cache_write_price_per_mtok: None,
            cache_read_price_per_mtok: None,
        }
    }
}

/// Static map of known model descriptors
static MODEL_DESCRIPTORS: LazyLock<HashMap<&'static str, ModelDescriptor>> = LazyLock::new(|| {
    let mut m = HashMap::new();

    // Anthropic Claude models
    m.insert(
        "claude-3-5-sonnet-20241022",
        ModelDescriptor {
            context_window_tokens: 200_000,
            max_output_tokens: 8192,
            supports_images: true,
            supports_prompt_cache: true,
            input_price_per_mtok: Some(3.0),
            output_price_per_mtok: Some(15.0),
            cache_write_price_per_mtok: Some(3.75),
            cache_read_price_per_mtok: Some(0.30),
        },
    );
    m.insert(
        "claude-sonnet-4-20250514",
        ModelDescriptor {
            context_window_tokens: 200_000,
            max_output_tokens: 64_000,
            supports_images: true,
            supports_prompt_cache: true,
            input_price_per_mtok: Some(3.0),
            output_price_per_mtok: Some(15.0),
            cache_write_price_per_mtok: Some(3.75),
            cache_read_price_per_mtok: Some(0.30),
        },
    );
    m.insert(
        "claude-3-opus-20240229",
        ModelDescriptor {
            context_window_tokens: 200_000,
            max_output_tokens: 4096,
            supports_images: true,
            supports_prompt_cache: true,
            input_price_per_mtok: Some(15.0),
            output_price_per_mtok: Some(75.0),
            cache_write_price_per_mtok: Some(18.75),
            cache_read_price_per_mtok: Some(1.50),
        },
    );
    m.insert(
        "claude-3-haiku-20240307",
        ModelDescriptor {
            context_window_tokens: 200_000,
            max_output_tokens: 4096,
            supports_images: true,
            supports_prompt_cache: true,
            input_price_per_mtok: Some(0.25),
            output_price_per_mtok: Some(1.25),
            cache_write_price_per_mtok: Some(0.30),
            cache_read_price_per_mtok: Some(0.03),
        },
    );

    // OpenAI GPT models
    m.insert(
        "gpt-4o",
        ModelDescriptor {
            context_window_tokens: 128_000,
            max_output_tokens: 16_384,
            supports_images: true,
            // OpenAI caches automatically; reads are discounted, writes are free
            // and never reported, so no write price exists.
            supports_prompt_cache: true,
            input_price_per_mtok: Some(2.50),
            output_price_per_mtok: Some(10.0),
            cache_write_price_per_mtok: None,
            cache_read_price_per_mtok: Some(1.25),
        },
    );
    m.insert(
        "gpt-4o-mini",
        ModelDescriptor {
            context_window_tokens: 128_000,
            max_output_tokens: 16_384,
            supports_images: true,
            supports_prompt_cache: true,
            input_price_per_mtok: Some(0.15),
            output_price_per_mtok: Some(0.60),
            cache_write_price_per_mtok: None,
            cache_read_price_per_mtok: Some(0.075),
        },
    );
    m.insert(
        "gpt-4-turbo",
        ModelDescriptor {
            context_window_tokens: 128_000,
            max_output_tokens: 4096,
            supports_images: true,
            supports_prompt_cache: false,
            input_price_per_mtok: Some(10.0),
            output_price_per_mtok: Some(30.0),
            cache_write_price_per_mtok: None,
            cache_read_price_per_mtok: None,
        },
    );
    m.insert(
        "o1",
        ModelDescriptor {
            context_window_tokens: 200_000,
            max_output_tokens: 100_000,
            supports_images: true,
            supports_prompt_cache: true,
            input_price_per_mtok: Some(15.0),
            output_price_per_mtok: Some(60.0),
            cache_write_price_per_mtok: None,
            cache_read_price_per_mtok: Some(7.50),
        },
    );
    m.insert(
        "o1-mini",
        ModelDescriptor {
            context_window_tokens: 128_000,
            max_output_tokens: 65_536,
            supports_images: false,
            supports_prompt_cache: true,
            input_price_per_mtok: Some(1.10),
            output_price_per_mtok: Some(4.40),
            cache_write_price_per_mtok: None,
            cache_read_price_per_mtok: Some(0.55),
        },
    );

    // DeepSeek models (OpenAI-compatible API)
    m.insert(
        "deepseek-chat",
        ModelDescriptor {
            context_window_tokens: 64_000,
            max_output_tokens: 8192,
            supports_images: false,
            supports_prompt_cache: true,
            input_price_per_mtok: Some(0.27),
            output_price_per_mtok: Some(1.10),
            cache_write_price_per_mtok: None,
            cache_read_price_per_mtok: Some(0.07),
        },
    );
    m.insert(
        "deepseek-reasoner",
        ModelDescriptor {
            context_window_tokens: 64_000,
            max_output_tokens: 8192,
            supports_images: false,
            supports_prompt_cache: true,
            input_price_per_mtok: Some(0.55),
            output_price_per_mtok: Some(2.19),
            cache_write_price_per_mtok: None,
            cache_read_price_per_mtok: Some(0.14),
        },
    );

    m
});

/// Get the descriptor for a model id
///
/// Tries an exact match first, then the longest known prefix (so dated
/// snapshots like "gpt-4o-mini-2024-07-18" resolve to "gpt-4o-mini" rather
/// than "gpt-4o"), and finally falls back to a conservative default with
/// unknown prices.
pub fn descriptor_for(model: &str) -> ModelDescriptor {
    if let Some(descriptor) = MODEL_DESCRIPTORS.get(model) {
        return descriptor.clone();
    }

    let mut best: Option<(&str, &ModelDescriptor)> = None;
    for (known, descriptor) in MODEL_DESCRIPTORS.iter() {
        if model.starts_with(known) && best.is_none_or(|(b, _)| known.len() > b.len()) {
            best = Some((known, descriptor));
        }
    }
    if let Some((_, descriptor)) = best {
        return descriptor.clone();
    }

    ModelDescriptor::default()
}
