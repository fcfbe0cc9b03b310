//! Buffered Server-Sent Events decoder
//!
//! Network chunks do not respect event boundaries: an event, a line, or even
//! a single UTF-8 sequence can arrive split across reads. This decoder
//! buffers bytes until complete events are available and copes with both the
//! Anthropic format (typed `event:` lines) and the OpenAI format (bare
//! `data:` lines ending in `[DONE]`).

mod event;

pub use event::SseEvent;

/// Buffered SSE decoder
///
/// Feed raw bytes as they arrive; complete events come out. Anything not yet
/// terminated by a blank line stays buffered for the next feed.
#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Decoded text not yet split into events
    text: String,
    /// Raw bytes whose trailing UTF-8 sequence may still be incomplete
    pending: Vec<u8>,
}

impl SseDecoder {
    /// Create a new decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes and extract every complete event
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.pending.extend_from_slice(chunk);
        self.drain_decoded_text();

        let mut events = Vec::new();
        while let Some((boundary, delimiter_len)) = self.next_boundary() {
            let event_text: String = self.text.drain(..boundary + delimiter_len).collect();
            if let Some(event) = parse_event(&event_text) {
                events.push(event);
            }
        }
        events
    }

    /// Move every complete UTF-8 sequence from `pending` into `text`
    ///
    /// A sequence split at the chunk boundary stays in `pending`; genuinely
    /// invalid bytes are dropped so one corrupt read cannot wedge the stream.
    fn drain_decoded_text(&mut self) {
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(valid) => {
                    self.text.push_str(valid);
                    self.pending.clear();
                    return;
                }
                Err(err) => {
                    let valid_up_to = err.valid_up_to();
                    self.text.push_str(
                        std::str::from_utf8(&self.pending[..valid_up_to]).unwrap_or_default(),
                    );
                    match err.error_len() {
                        None => {
                            // Incomplete trailing sequence, wait for more bytes.
                            self.pending.drain(..valid_up_to);
                            return;
                        }
                        Some(invalid_len) => {
                            tracing::warn!(
                                invalid_len,
                                "dropping invalid utf-8 bytes from sse stream"
                            );
                            self.pending.drain(..valid_up_to + invalid_len);
                        }
                    }
                }
            }
        }
    }

    /// Position and length of the earliest event delimiter, if any
    fn next_boundary(&self) -> Option<(usize, usize)> {
        let lf = self.text.find("\n\n").map(|pos| (pos, 2));
        let crlf = self.text.find("\r\n\r\n").map(|pos| (pos, 4));
        match (lf, crlf) {
            (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        }
    }

    /// Drop any buffered state
    pub fn clear(&mut self) {
        self.text.clear();
        self.pending.clear();
    }

    /// Whether bytes or text are still buffered
    pub fn has_remaining(&self) -> bool {
        !self.text.is_empty() || !self.pending.is_empty()
    }
}

/// Parse one event's worth of text into an [`SseEvent`]
///
/// Returns `None` for events without data (comments, keep-alives).
fn parse_event(text: &str) -> Option<SseEvent> {
    let mut event_type: Option<String> = None;
    let mut id: Option<String> = None;
    let mut data_lines: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.starts_with(':') {
            // Comment line, e.g. ": OPENROUTER PROCESSING" keep-alives.
            continue;
        }
        if let Some(value) = line.strip_prefix("event:") {
            event_type = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.strip_prefix(' ').unwrap_or(value));
        } else if let Some(value) = line.strip_prefix("id:") {
            id = Some(value.trim().to_string());
        }
        // retry: and unknown fields are ignored.
    }

    if data_lines.is_empty() {
        return None;
    }

    Some(SseEvent {
        event_type,
        data: data_lines.join("\n"),
        id,
    })
}
