//! Parsed SSE event

/// One parsed Server-Sent Event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Value of the `event:` field, if present
    pub event_type: Option<String>,
    /// Joined `data:` lines
    pub data: String,
    /// Value of the `id:` field, if present
    pub id: Option<String>,
}

impl SseEvent {
    /// Create an event carrying only data
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            event_type: None,
            data: data.into(),
            id: None,
        }
    }

    /// Create an event with an explicit type
    pub fn with_type(event_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event_type: Some(event_type.into()),
            data: data.into(),
            id: None,
        }
    }

    /// Whether this is the OpenAI-style end-of-stream marker
    pub fn is_done(&self) -> bool {
        self.data.trim() == "[DONE]"
    }
}
