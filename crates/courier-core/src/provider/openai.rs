//! OpenAI-compatible backend adapter
//!
//! Speaks the Chat Completions API, which also covers DeepSeek and other
//! compatible gateways when pointed at their base URL.

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

pub(crate) const PROVIDER_NAME: &str = "openai";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI-compatible adapter bound to one model
pub struct OpenAiProvider {
    api_key: String,
    base_url: String,
    extra_headers: HashMap<String, String>,
    params: ModelParameters,
    descriptor: ModelDescriptor,
    client: OnceLock<Client>,
}

impl OpenAiProvider {
    /// Create a new OpenAI-compatible adapter
    ///
    /// Fails with a configuration error when no API key can be resolved.
    pub fn new(config: &ProviderConfig, params: ModelParameters) -> CourierResult<Self> {
        let api_key = config.resolve_api_key(PROVIDER_NAME).ok_or_else(|| {
            CourierError::config(
                "no API key for openai; set OPENAI_API_KEY or configure one explicitly",
            )
        })?;
        let descriptor = descriptor_for(&params.model);
        Ok(Self {
            api_key,
            base_url: config.resolve_base_url(DEFAULT_BASE_URL),
            extra_headers: config.headers.clone(),
            params,
            descriptor,
            client: OnceLock::new(),
        })
    }

    fn client(&self) -> &Client {
        self.client.get_or_init(Client::new)
    }

    fn wire_block(block: &ContentBlock) -> Value {
        match block {
            ContentBlock::Text { text } => json!({
                "type": "text",
                "text": text,
            }),
            ContentBlock::Image { media_type, data } => json!({
                "type": "image_url",
                "image_url": {
                    "url": format!("data:{media_type};base64,{data}"),
                },
            }),
        }
    }

    /// A lone text block stays a plain string; anything else becomes parts
    fn wire_content(content: &[ContentBlock]) -> Value {
        match content {
            [ContentBlock::Text { text }] => json!(text),
            _ => Value::Array(content.iter().map(Self::wire_block).collect()),
        }
    }

    fn wire_messages(system_prompt: &str, messages: &[Message]) -> Vec<Value> {
        let mut wire = Vec::with_capacity(messages.len() + 1);
        if !system_prompt.is_empty() {
            wire.push(json!({"role": "system", "content": system_prompt}));
        }
        for message in messages {
            wire.push(json!({
                "role": message.role.to_string(),
                "content": Self::wire_content(&message.content),
            }));
        }
        wire
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
            "messages": Self::wire_messages(system_prompt, messages),
        });

        if stream {
            body["stream"] = json!(true);
            // Without this opt-in the final usage chunk never arrives.
            body["stream_options"] = json!({"include_usage": true});
        }

        if let Some(max_tokens) = self.params.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(temperature) = self.params.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(task_id) = metadata.and_then(|m| m.task_id.as_deref()) {
            body["user"] = json!(task_id);
        }

        body
    }

    async fn post(&self, path: &str, body: &Value) -> CourierResult<reqwest::Response> {
        let url = format!("{}{path}", self.base_url);
        let mut request = self
            .client()
            .post(&url)
            .bearer_auth(&self.api_key)
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
}

#[async_trait]
impl Provider for OpenAiProvider {
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
        let response = self.post("/chat/completions", &body).await?;
        Ok(super::openai_stream::normalize(
            response.bytes_stream(),
            self.descriptor.clone(),
        ))
    }

    async fn complete_prompt(&self, prompt: &str) -> CourierResult<String> {
        let messages = [Message::user(prompt)];
        let body = self.request_body("", &messages, None, false);
        let response = self.post("/chat/completions", &body).await?;
        let value: Value = response
            .json()
            .await
            .map_err(|e| classify(RawProviderError::from_transport(&e), PROVIDER_NAME))?;
        let text = value["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        Ok(text)
    }
}
