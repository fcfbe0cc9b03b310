//! Classification of heterogeneous backend failures
//!
//! Every provider error, whatever its original shape, is reduced to a
//! [`ClassifiedError`] carrying a stable status class plus a JSON envelope
//! that callers can match on without knowing which backend produced it.
//! Classification works on evidence (HTTP status, message phrases, vendor
//! error type), checked in a fixed priority order so an error matching
//! several rules always lands in the same class.

use crate::error::sanitize::sanitize_error_text;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Retry hint used when a rate-limited response carries no Retry-After
pub const DEFAULT_RETRY_AFTER_SECONDS: u64 = 30;

/// Stable failure category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusClass {
    /// Provider throttled the request; retry after a delay
    RateLimit,
    /// Missing or rejected credentials
    Auth,
    /// The request itself was malformed
    BadRequest,
    /// Requested model does not exist or is temporarily down
    ModelUnavailable,
    /// Prompt cache machinery failed
    CacheError,
    /// The provider does not implement the requested operation
    UnsupportedOperation,
    /// Anything that matched no other rule
    Unknown,
}

impl std::fmt::Display for StatusClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StatusClass::RateLimit => "rate_limit",
            StatusClass::Auth => "auth",
            StatusClass::BadRequest => "bad_request",
            StatusClass::ModelUnavailable => "model_unavailable",
            StatusClass::CacheError => "cache_error",
            StatusClass::UnsupportedOperation => "unsupported_operation",
            StatusClass::Unknown => "unknown",
        };
        write!(f, "{name}")
    }
}

/// Evidence extracted from a failed provider call, before classification
#[derive(Debug, Clone, Default)]
pub struct RawProviderError {
    /// HTTP status, when the failure came from a response
    pub status: Option<u16>,
    /// Best available human-readable message
    pub message: String,
    /// Vendor error type, e.g. OpenAI's "invalid_request_error"
    pub error_type: Option<String>,
    /// Parsed Retry-After header, seconds
    pub retry_after_seconds: Option<u64>,
    /// Full response body, if any
    pub body: Option<String>,
    /// Vendor structured details, passed through to the envelope
    pub details: Option<Value>,
}

impl RawProviderError {
    /// Evidence consisting of a message alone (transport failures, internal errors)
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    /// Attach an HTTP status
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Extract evidence from a non-success HTTP response
    ///
    /// Reads the body and pulls the message out of the common vendor shapes
    /// (`{"error": {"message", "type", "details"}}` or a top-level
    /// `"message"`), falling back to the raw body text.
    pub async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        // Only the delta-seconds form; the HTTP-date form is rare enough
        // from LLM gateways that the default kicks in instead.
        let retry_after_seconds = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let body = response.text().await.unwrap_or_default();

        let mut raw = Self {
            status: Some(status),
            message: body.clone(),
            retry_after_seconds,
            body: Some(body.clone()),
            ..Default::default()
        };
        if let Ok(parsed) = serde_json::from_str::<Value>(&body) {
            if let Some(message) = parsed["error"]["message"]
                .as_str()
                .or_else(|| parsed["message"].as_str())
                .or_else(|| parsed["error"].as_str())
            {
                raw.message = message.to_string();
            }
            if let Some(error_type) = parsed["error"]["type"].as_str() {
                raw.error_type = Some(error_type.to_string());
            }
            let details = &parsed["error"]["details"];
            if !details.is_null() {
                raw.details = Some(details.clone());
            }
        }
        raw
    }

    /// Evidence from a reqwest transport error (connect, timeout, body read)
    pub fn from_transport(err: &reqwest::Error) -> Self {
        Self {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
            ..Default::default()
        }
    }
}

/// A backend failure normalized into the stable envelope
///
/// `Display` renders the JSON envelope, so logging or stringifying one of
/// these always yields something [`ClassifiedError::from_envelope`] can parse
/// back.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedError {
    /// Assigned failure category
    pub status_class: StatusClass,
    /// HTTP-style status for the envelope
    pub status: u16,
    /// Sanitized human-readable message
    pub message: String,
    /// Provider that produced the failure
    pub provider: String,
    /// Sanitized raw payload for debugging
    pub raw: String,
    /// Seconds to wait before retrying, only set for rate limits
    pub retry_after_seconds: Option<u64>,
    /// Vendor structured details, when the backend sent any
    pub details: Option<Value>,
}

impl ClassifiedError {
    /// Whether the caller should retry
    ///
    /// Only rate limits are retryable. Model-unavailable failures often clear
    /// up too, but retrying those is the orchestrator's call, not a property
    /// of the error.
    pub fn retryable(&self) -> bool {
        self.status_class == StatusClass::RateLimit
    }

    /// Failure for an operation the provider does not implement
    pub fn unsupported_operation<S: Into<String>>(provider: S, operation: &str) -> Self {
        let provider = provider.into();
        Self {
            status_class: StatusClass::UnsupportedOperation,
            status: 501,
            message: format!("{provider} does not support {operation}"),
            raw: format!("{provider} does not support {operation}"),
            provider,
            retry_after_seconds: None,
            details: None,
        }
    }

    /// Parse an envelope rendered by `Display` back into a classified error
    pub fn from_envelope(json: &str) -> Option<Self> {
        let envelope: ErrorEnvelope = serde_json::from_str(json).ok()?;
        Some(Self {
            status_class: envelope.error.metadata.status_class,
            status: envelope.status,
            message: envelope.message,
            provider: envelope.error.metadata.provider,
            raw: envelope.error.metadata.raw,
            retry_after_seconds: envelope.error.metadata.retry_after_seconds,
            details: envelope.error_details,
        })
    }

    fn to_envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            status: self.status,
            message: self.message.clone(),
            error: EnvelopeBody {
                metadata: EnvelopeMetadata {
                    status_class: self.status_class,
                    provider: self.provider.clone(),
                    raw: self.raw.clone(),
                    retry_after_seconds: self.retry_after_seconds,
                },
            },
            error_details: self.details.clone(),
        }
    }
}

impl std::fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match serde_json::to_string(&self.to_envelope()) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "{} (status {})", self.message, self.status),
        }
    }
}

impl std::error::Error for ClassifiedError {}

/// Wire shape of the error envelope
#[derive(Debug, Serialize, Deserialize)]
struct ErrorEnvelope {
    status: u16,
    message: String,
    error: EnvelopeBody,
    #[serde(
        rename = "errorDetails",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    error_details: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EnvelopeBody {
    metadata: EnvelopeMetadata,
}

#[derive(Debug, Serialize, Deserialize)]
struct EnvelopeMetadata {
    #[serde(rename = "statusClass")]
    status_class: StatusClass,
    provider: String,
    raw: String,
    #[serde(
        rename = "retryAfterSeconds",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    retry_after_seconds: Option<u64>,
}

/// Classify raw failure evidence into the stable envelope
///
/// Rules are checked strictly in this order, first hit wins:
///
/// 1. rate limit: status 429, or message mentions "rate limit" / "too many requests"
/// 2. auth: status 401, or message mentions "api key" / "unauthorized" / "authentication"
/// 3. bad request: status 400, or vendor type "invalid_request_error"
/// 4. model unavailable: status 404 or 503, or "model" plus "not found" / "unavailable"
/// 5. cache error: message mentions "cache"
/// 6. unknown
///
/// When the evidence has no status, the class's canonical status fills in
/// (500 for cache errors and unknown).
pub fn classify(raw: RawProviderError, provider: &str) -> ClassifiedError {
    let lower = raw.message.to_lowercase();
    let message = sanitize_error_text(&raw.message);
    let sanitized_raw = sanitize_error_text(raw.body.as_deref().unwrap_or(&raw.message));

    let (status_class, default_status, retry_after_seconds) = if raw.status == Some(429)
        || lower.contains("rate limit")
        || lower.contains("too many requests")
    {
        let delay = raw
            .retry_after_seconds
            .unwrap_or(DEFAULT_RETRY_AFTER_SECONDS);
        (StatusClass::RateLimit, 429, Some(delay))
    } else if raw.status == Some(401)
        || lower.contains("api key")
        || lower.contains("unauthorized")
        || lower.contains("authentication")
    {
        (StatusClass::Auth, 401, None)
    } else if raw.status == Some(400) || raw.error_type.as_deref() == Some("invalid_request_error")
    {
        (StatusClass::BadRequest, 400, None)
    } else if matches!(raw.status, Some(404) | Some(503))
        || (lower.contains("model") && (lower.contains("not found") || lower.contains("unavailable")))
    {
        (StatusClass::ModelUnavailable, 404, None)
    } else if lower.contains("cache") {
        (StatusClass::CacheError, 500, None)
    } else {
        (StatusClass::Unknown, 500, None)
    };

    ClassifiedError {
        status_class,
        status: raw.status.unwrap_or(default_status),
        message,
        provider: provider.to_string(),
        raw: sanitized_raw,
        retry_after_seconds,
        details: raw.details,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evidence(message: &str) -> RawProviderError {
        RawProviderError::new(message)
    }

    #[test]
    fn test_rate_limit_by_status() {
        let classified = classify(evidence("slow down").with_status(429), "anthropic");
        assert_eq!(classified.status_class, StatusClass::RateLimit);
        assert_eq!(classified.status, 429);
        assert!(classified.retryable());
        assert_eq!(classified.retry_after_seconds, Some(30));
    }

    #[test]
    fn test_rate_limit_by_phrase_without_status() {
        let classified = classify(evidence("Rate limit exceeded, please wait"), "openai");
        assert_eq!(classified.status_class, StatusClass::RateLimit);
        assert_eq!(classified.status, 429);
    }

    #[test]
    fn test_rate_limit_honors_retry_after_header() {
        let mut raw = evidence("too many requests").with_status(429);
        raw.retry_after_seconds = Some(7);
        let classified = classify(raw, "openai");
        assert_eq!(classified.retry_after_seconds, Some(7));
    }

    #[test]
    fn test_rate_limit_outranks_auth_phrase() {
        // Mentions the api key, but the rate-limit evidence wins.
        let classified = classify(
            evidence("rate limit reached for this api key").with_status(429),
            "openai",
        );
        assert_eq!(classified.status_class, StatusClass::RateLimit);
    }

    #[test]
    fn test_auth_by_status_and_phrase() {
        let classified = classify(evidence("bad credentials").with_status(401), "anthropic");
        assert_eq!(classified.status_class, StatusClass::Auth);
        assert!(!classified.retryable());

        let classified = classify(evidence("invalid api key provided"), "anthropic");
        assert_eq!(classified.status_class, StatusClass::Auth);
        assert_eq!(classified.status, 401);

        let classified = classify(evidence("authentication_error: bad header"), "anthropic");
        assert_eq!(classified.status_class, StatusClass::Auth);
    }

    #[test]
    fn test_bad_request_by_vendor_type() {
        let mut raw = evidence("unknown parameter foo");
        raw.error_type = Some("invalid_request_error".to_string());
        let classified = classify(raw, "openai");
        assert_eq!(classified.status_class, StatusClass::BadRequest);
        assert_eq!(classified.status, 400);
    }

    #[test]
    fn test_model_unavailable() {
        let classified = classify(evidence("no such endpoint").with_status(404), "openai");
        assert_eq!(classified.status_class, StatusClass::ModelUnavailable);
        assert_eq!(classified.status, 404);

        let classified = classify(evidence("overloaded").with_status(503), "anthropic");
        assert_eq!(classified.status_class, StatusClass::ModelUnavailable);
        assert_eq!(classified.status, 503);

        let classified = classify(evidence("the model gpt-9 was not found"), "openai");
        assert_eq!(classified.status_class, StatusClass::ModelUnavailable);
        assert_eq!(classified.status, 404);
    }

    #[test]
    fn test_cache_error() {
        let classified = classify(evidence("prompt cache checkpoint failed"), "anthropic");
        assert_eq!(classified.status_class, StatusClass::CacheError);
        assert_eq!(classified.status, 500);
        assert!(!classified.retryable());
    }

    #[test]
    fn test_unknown_defaults_to_500() {
        let classified = classify(evidence("socket hang up"), "openai");
        assert_eq!(classified.status_class, StatusClass::Unknown);
        assert_eq!(classified.status, 500);
        assert_eq!(classified.retry_after_seconds, None);
    }

    #[test]
    fn test_unknown_keeps_original_status() {
        let classified = classify(evidence("internal error").with_status(502), "openai");
        assert_eq!(classified.status_class, StatusClass::Unknown);
        assert_eq!(classified.status, 502);
    }

    #[test]
    fn test_envelope_round_trip() {
        let mut raw = evidence("Rate limit exceeded");
        raw.status = Some(429);
        raw.retry_after_seconds = Some(12);
        raw.body = Some(r#"{"error":{"message":"Rate limit exceeded"}}"#.to_string());
        let classified = classify(raw, "anthropic");

        let envelope = classified.to_string();
        let parsed: serde_json::Value = serde_json::from_str(&envelope).unwrap();
        assert_eq!(parsed["status"], 429);
        assert_eq!(parsed["error"]["metadata"]["statusClass"], "rate_limit");
        assert_eq!(parsed["error"]["metadata"]["provider"], "anthropic");
        assert_eq!(parsed["error"]["metadata"]["retryAfterSeconds"], 12);

        let restored = ClassifiedError::from_envelope(&envelope).unwrap();
        assert_eq!(restored, classified);
    }

    #[test]
    fn test_envelope_omits_absent_fields() {
        let classified = classify(evidence("boom"), "openai");
        let envelope = classified.to_string();
        assert!(!envelope.contains("retryAfterSeconds"));
        assert!(!envelope.contains("errorDetails"));
    }

    #[test]
    fn test_envelope_secrets_are_sanitized() {
        let mut raw = evidence("unauthorized");
        raw.status = Some(401);
        raw.body = Some(r#"{"error":{"message":"unauthorized","api_key":"sk-leaked1234"}}"#.to_string());
        let classified = classify(raw, "anthropic");
        assert!(!classified.to_string().contains("sk-leaked1234"));
    }

    #[test]
    fn test_unsupported_operation() {
        let classified = ClassifiedError::unsupported_operation("anthropic", "prompt completion");
        assert_eq!(classified.status_class, StatusClass::UnsupportedOperation);
        assert_eq!(classified.status, 501);
        assert!(!classified.retryable());
        assert!(classified.message.contains("prompt completion"));
    }

    #[test]
    fn test_details_pass_through() {
        let mut raw = evidence("bad input").with_status(400);
        raw.details = Some(serde_json::json!([{"field": "messages"}]));
        let classified = classify(raw, "openai");
        let envelope = classified.to_string();
        let parsed: serde_json::Value = serde_json::from_str(&envelope).unwrap();
        assert_eq!(parsed["errorDetails"][0]["field"], "messages");
    }
}
