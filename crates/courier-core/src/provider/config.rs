//! Provider configuration and per-call model parameters

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Connection configuration for one provider
///
/// Credentials are resolved once at adapter construction: an explicit
/// `api_key` wins, then `COURIER_<PROVIDER>_API_KEY`, then the provider's
/// conventional variable (`ANTHROPIC_API_KEY`, `OPENAI_API_KEY`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Explicit API key; overrides environment lookup
    pub api_key: Option<String>,
    /// Override for the provider's default endpoint
    pub base_url: Option<String>,
    /// API version header value (used by Anthropic)
    pub api_version: Option<String>,
    /// Extra headers sent with every request
    pub headers: HashMap<String, String>,
}

impl ProviderConfig {
    /// Create an empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the API key
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the API version
    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = Some(api_version.into());
        self
    }

    /// Add a custom header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Resolve the API key for the named provider
    pub fn resolve_api_key(&self, provider: &str) -> Option<String> {
        if let Some(key) = &self.api_key {
            return Some(key.clone());
        }
        let courier_var = format!("COURIER_{}_API_KEY", provider.to_uppercase());
        if let Ok(key) = std::env::var(&courier_var) {
            if !key.is_empty() {
                return Some(key);
            }
        }
        let standard_var = match provider {
            "anthropic" => "ANTHROPIC_API_KEY",
            "openai" => "OPENAI_API_KEY",
            _ => return None,
        };
        std::env::var(standard_var).ok().filter(|key| !key.is_empty())
    }

    /// Effective base URL, without a trailing slash
    pub fn resolve_base_url(&self, default: &str) -> String {
        let url = self.base_url.as_deref().unwrap_or(default);
        url.trim_end_matches('/').to_string()
    }
}

/// Model selection and sampling parameters for one adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelParameters {
    /// Model id sent on the wire
    pub model: String,
    /// Output token cap; adapters fall back to the model descriptor
    pub max_tokens: Option<u32>,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Force prompt caching on or off; `None` follows the model descriptor
    pub enable_prompt_caching: Option<bool>,
}

impl ModelParameters {
    /// Parameters for a model with everything else defaulted
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            max_tokens: None,
            temperature: None,
            enable_prompt_caching: None,
        }
    }

    /// Set the output token cap
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the sampling temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Force prompt caching on or off
    pub fn with_prompt_caching(mut self, enabled: bool) -> Self {
        self.enable_prompt_caching = Some(enabled);
        self
    }
}
