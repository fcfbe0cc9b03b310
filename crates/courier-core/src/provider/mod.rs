//! Backend adapters
//!
//! Each adapter owns the full round trip to one backend: building the wire
//! request, authenticating, and normalizing the response stream. Everything
//! provider-specific stays inside this module; callers see only the
//! [`Provider`] trait and normalized events.

mod adapter;
mod anthropic;
mod anthropic_stream;
mod config;
mod openai;
mod openai_stream;

pub use adapter::{ModelInfo, Provider, RequestMetadata};
pub use anthropic::AnthropicProvider;
pub use config::{ModelParameters, ProviderConfig};
pub use openai::OpenAiProvider;

use crate::conversation::{ContentBlock, Message};
use crate::error::{CourierError, CourierResult};
use crate::stream::EventStream;
use async_trait::async_trait;
use std::str::FromStr;

/// Supported backend families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// Anthropic Messages API
    Anthropic,
    /// OpenAI Chat Completions API and compatible gateways
    OpenAi,
}

impl FromStr for ProviderKind {
    type Err = CourierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "anthropic" => Ok(Self::Anthropic),
            "openai" | "openai-compatible" => Ok(Self::OpenAi),
            other => Err(CourierError::config(format!("unknown provider: {other}"))),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::OpenAi => "openai",
        };
        write!(f, "{name}")
    }
}

/// A constructed adapter wrapping the concrete implementations
///
/// Sized, so it coerces to `&dyn Provider` or `&dyn TokenCounter` wherever
/// either seam is expected.
pub enum ProviderInstance {
    Anthropic(AnthropicProvider),
    OpenAi(OpenAiProvider),
}

#[async_trait]
impl Provider for ProviderInstance {
    fn name(&self) -> &'static str {
        match self {
            Self::Anthropic(p) => p.name(),
            Self::OpenAi(p) => p.name(),
        }
    }

    fn model(&self) -> ModelInfo {
        match self {
            Self::Anthropic(p) => p.model(),
            Self::OpenAi(p) => p.model(),
        }
    }

    async fn create_message(
        &self,
        system_prompt: &str,
        messages: &[Message],
        metadata: Option<&RequestMetadata>,
    ) -> CourierResult<EventStream> {
        match self {
            Self::Anthropic(p) => p.create_message(system_prompt, messages, metadata).await,
            Self::OpenAi(p) => p.create_message(system_prompt, messages, metadata).await,
        }
    }

    async fn count_tokens(&self, content: &[ContentBlock]) -> CourierResult<u32> {
        match self {
            Self::Anthropic(p) => Provider::count_tokens(p, content).await,
            Self::OpenAi(p) => Provider::count_tokens(p, content).await,
        }
    }

    async fn complete_prompt(&self, prompt: &str) -> CourierResult<String> {
        match self {
            Self::Anthropic(p) => p.complete_prompt(prompt).await,
            Self::OpenAi(p) => p.complete_prompt(prompt).await,
        }
    }
}

/// Build the adapter for a backend
pub fn build_provider(
    kind: ProviderKind,
    config: &ProviderConfig,
    params: ModelParameters,
) -> CourierResult<ProviderInstance> {
    match kind {
        ProviderKind::Anthropic => Ok(ProviderInstance::Anthropic(AnthropicProvider::new(
            config, params,
        )?)),
        ProviderKind::OpenAi => Ok(ProviderInstance::OpenAi(OpenAiProvider::new(
            config, params,
        )?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_parsing() {
        assert_eq!("anthropic".parse::<ProviderKind>().unwrap(), ProviderKind::Anthropic);
        assert_eq!("openai".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAi);
        assert_eq!(
            "openai-compatible".parse::<ProviderKind>().unwrap(),
            ProviderKind::OpenAi
        );
        assert_eq!("Anthropic".parse::<ProviderKind>().unwrap(), ProviderKind::Anthropic);
        assert!("gemini".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_kind_display_round_trips() {
        for kind in [ProviderKind::Anthropic, ProviderKind::OpenAi] {
            assert_eq!(kind.to_string().parse::<ProviderKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_build_provider_dispatches() {
        let config = ProviderConfig::new().with_api_key("sk-test");

        let provider = build_provider(
            ProviderKind::Anthropic,
            &config,
            ModelParameters::new("claude-3-5-sonnet-20241022"),
        )
        .unwrap();
        assert_eq!(provider.name(), "anthropic");
        assert_eq!(provider.model().descriptor.context_window_tokens, 200_000);

        let provider = build_provider(
            ProviderKind::OpenAi,
            &config,
            ModelParameters::new("gpt-4o"),
        )
        .unwrap();
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.model().id, "gpt-4o");
    }
}
