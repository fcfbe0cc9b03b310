//! Anthropic backend adapter
//!
//! Speaks the Messages API. Streaming responses are normalized by
//! [`super::anthropic_stream`]; token counting uses the native
//! `count_tokens` endpoint with a heuristic fallback.

use crate::context::{TokenCounter, TokenEstimator};
use crate::conversation::{ContentBlock, Message};
use crate::error::{classify, CourierError, CourierResult, RawProviderError};
use crate::models::{descriptor_for, ModelDescriptor};
use crate::provider::adapter::{ModelInfo, Provider, RequestMetadata};
use crate::provider::config::{ModelParameters, ProviderConfig};
use crate::stream::EventStream;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::OnceLock;

pub(crate) const PROVIDER_NAME: &str = "anthropic";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_API_VERSION: &str = "2023-06-01";

/// Anthropic adapter bound to one model
pub struct AnthropicProvider {
    api_key: String,
    base_url: String,
    api_version: String,
    extra_headers: HashMap<String, String>,
    params: ModelParameters,
    descriptor: ModelDescriptor,
    client: OnceLock<Client>,
}

impl AnthropicProvider {
    /// Create a new Anthropic adapter
    ///
    /// Fails with a configuration error when no API key can be resolved.
    pub fn new(config: &ProviderConfig, params: ModelParameters) -> CourierResult<Self> {
        let api_key = config.resolve_api_key(PROVIDER_NAME).ok_or_else(|| {
            CourierError::config(
                "no API key for anthropic; set ANTHROPIC_API_KEY or configure one explicitly",
            )
        })?;
        let descriptor = descriptor_for(&params.model);
        Ok(Self {
            api_key,
            base_url: config.resolve_base_url(DEFAULT_BASE_URL),
            api_version: config
                .api_version
                .clone()
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            extra_headers: config.headers.clone(),
            params,
            descriptor,
            client: OnceLock::new(),
        })
    }

    fn client(&self) -> &Client {
        self.client.get_or_init(Client::new)
    }

    fn prompt_caching_enabled(&self) -> bool {
        self.params
            .enable_prompt_caching
            .unwrap_or(self.descriptor.supports_prompt_cache)
    }

    fn wire_block(block: &ContentBlock) -> Value {
        match block {
            ContentBlock::Text { text } => json!({
                "type": "text",
                "text": text,
            }),
            ContentBlock::Image { media_type, data } => json!({
                "type": "image",
                "source": {
                    "type": "base64",
                    "media_type": media_type,
                    "data": data,
                },
            }),
        }
    }

    fn wire_content(content: &[ContentBlock]) -> Value {
        Value::Array(content.iter().map(Self::wire_block).collect())
    }

    fn wire_messages(messages: &[Message]) -> Vec<Value> {
        messages
            .iter()
            .map(|message| {
                json!({
                    "role": message.role.to_string(),
                    "content": Self::wire_content(&message.content),
                })
            })
            .collect()
    }

    fn request_body(
        &self,
        system_prompt: &str,
        messages: &[Message],
        metadata: Option<&RequestMetadata>,
        stream: bool,
    ) -> Value {
        let mut body = json!({
            "model": self.params.model,
            "max_tokens": self.params.max_tokens.unwrap_or(self.descriptor.max_output_tokens),
            "messages": Self::wire_messages(messages),
        });

        if stream {
            body["stream"] = json!(true);
        }

        // System prompt goes in the dedicated field, with a cache breakpoint
        // when prompt caching is on.
        if !system_prompt.is_empty() {
            if self.prompt_caching_enabled() {
                body["system"] = json!([{
                    "type": "text",
                    "text": system_prompt,
                    "cache_control": {"type": "ephemeral"},
                }]);
            } else {
                body["system"] = json!(system_prompt);
            }
        }

        if let Some(temperature) = self.params.temperature {
            body["temperature"] = json!(temperature);
        }

        if let Some(task_id) = metadata.and_then(|m| m.task_id.as_deref()) {
            body["metadata"] = json!({"user_id": task_id});
        }

        body
    }

    async fn post(&self, path: &str, body: &Value) -> CourierResult<reqwest::Response> {
        let url = format!("{}{path}", self.base_url);
        let mut request = self
            .client()
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.api_version)
            .json(body);
        for (key, value) in &self.extra_headers {
            request = request.header(key, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| classify(RawProviderError::from_transport(&e), PROVIDER_NAME))?;

        if !response.status().is_success() {
            let raw = RawProviderError::from_response(response).await;
            return Err(classify(raw, PROVIDER_NAME).into());
        }
        Ok(response)
    }

    async fn count_tokens_remote(&self, content: &[ContentBlock]) -> CourierResult<u32> {
        let body = json!({
            "model": self.params.model,
            "messages": [{
                "role": "user",
                "content": Self::wire_content(content),
            }],
        });
        let response = self.post("/v1/messages/count_tokens", &body).await?;
        let value: Value = response
            .json()
            .await
            .map_err(|e| classify(RawProviderError::from_transport(&e), PROVIDER_NAME))?;
        value
            .get("input_tokens")
            .and_then(Value::as_u64)
            .map(|count| count as u32)
            .ok_or_else(|| CourierError::config("count_tokens response missing input_tokens"))
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn model(&self) -> ModelInfo {
        ModelInfo::new(self.params.model.clone(), self.descriptor.clone())
    }

    async fn create_message(
        &self,
        system_prompt: &str,
        messages: &[Message],
        metadata: Option<&RequestMetadata>,
    ) -> CourierResult<EventStream> {
        let body = self.request_body(system_prompt, messages, metadata, true);
        let response = self.post("/v1/messages", &body).await?;
        Ok(super::anthropic_stream::normalize(
            response.bytes_stream(),
            self.descriptor.clone(),
        ))
    }

    /// Count via the native endpoint, falling back to the estimator when the
    /// endpoint is unreachable or returns garbage
    async fn count_tokens(&self, content: &[ContentBlock]) -> CourierResult<u32> {
        if content.is_empty() {
            return Ok(0);
        }
        match self.count_tokens_remote(content).await {
            Ok(count) => Ok(count),
            Err(error) => {
                tracing::warn!("anthropic token count failed, using estimate: {error}");
                TokenCounter::count_tokens(&TokenEstimator::for_provider(PROVIDER_NAME), content)
                    .await
            }
        }
    }

    async fn complete_prompt(&self, prompt: &str) -> CourierResult<String> {
        let messages = [Message::user(prompt)];
        let body = self.request_body("", &messages, None, false);
        let response = self.post("/v1/messages", &body).await?;
        let value: Value = response
            .json()
            .await
            .map_err(|e| classify(RawProviderError::from_transport(&e), PROVIDER_NAME))?;
        let text = value
            .get("content")
            .and_then(Value::as_array)
            .map(|blocks| {
                blocks
                    .iter()
                    .filter_map(|block| block.get("text").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        Ok(text)
    }
}
