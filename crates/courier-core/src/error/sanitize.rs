//! Secret redaction for provider error payloads
//!
//! Raw error bodies get embedded in the classified error envelope and from
//! there into logs, so anything resembling a credential is scrubbed first and
//! oversized payloads are truncated.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

const MAX_RAW_TEXT_CHARS: usize = 1_024;
const REDACTED: &str = "[REDACTED]";

static BEARER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bBearer\s+[A-Za-z0-9._\-+/=]{8,}").expect("valid bearer regex")
});

// Bare provider keys, e.g. "sk-ant-..." or "sk-proj-...".
static BARE_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bsk-[A-Za-z0-9_\-]{8,}").expect("valid bare key regex"));

static KEY_VALUE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)\b(api[_-]?key|access[_-]?token|refresh[_-]?token|token|secret|password|authorization|x-api-key)\b\s*[:=]\s*["']?[^"',\s}]+"#,
    )
    .expect("valid key/value regex")
});

/// Redact secrets from provider error text and cap its length
///
/// JSON bodies are redacted structurally (sensitive keys replaced wholesale),
/// anything else by pattern matching.
pub fn sanitize_error_text(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return "<empty error body>".to_string();
    }

    if let Ok(mut json) = serde_json::from_str::<Value>(trimmed) {
        redact_json_value(&mut json);
        let serialized =
            serde_json::to_string(&json).unwrap_or_else(|_| "<unserializable error>".to_string());
        return truncate_with_suffix(serialized);
    }

    truncate_with_suffix(redact_inline(trimmed))
}

fn redact_json_value(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                if is_sensitive_key(key) {
                    *val = Value::String(REDACTED.to_string());
                } else {
                    redact_json_value(val);
                }
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                redact_json_value(item);
            }
        }
        Value::String(s) => {
            *s = redact_inline(s);
        }
        _ => {}
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let normalized = key.to_ascii_lowercase().replace(['-', ' '], "_");
    normalized.contains("api_key")
        || normalized.contains("token")
        || normalized.contains("secret")
        || normalized.contains("password")
        || normalized.contains("authorization")
        || normalized.contains("credential")
        || normalized.contains("cookie")
        || normalized.contains("private_key")
}

fn redact_inline(input: &str) -> String {
    let pass = BEARER_RE.replace_all(input, "Bearer [REDACTED]");
    let pass = BARE_KEY_RE.replace_all(&pass, REDACTED);
    KEY_VALUE_RE.replace_all(&pass, "$1=[REDACTED]").into_owned()
}

fn truncate_with_suffix(input: String) -> String {
    let char_count = input.chars().count();
    if char_count <= MAX_RAW_TEXT_CHARS {
        return input;
    }

    let truncated: String = input.chars().take(MAX_RAW_TEXT_CHARS).collect();
    format!(
        "{}... [truncated {} chars]",
        truncated,
        char_count - MAX_RAW_TEXT_CHARS
    )
}
