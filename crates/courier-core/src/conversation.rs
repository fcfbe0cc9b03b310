//! Conversation message types shared by every provider adapter

use serde::{Deserialize, Serialize};

/// Role of a message in the conversation
///
/// The system prompt is not a message: it travels as a separate argument to
/// [`Provider::create_message`](crate::provider::Provider::create_message) so
/// adapters can place it wherever their wire format requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// User message (human input)
    User,
    /// Assistant message (model response)
    Assistant,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// One block of message content
///
/// Mirrors the multi-part content arrays used by Anthropic and
/// OpenAI-compatible chat APIs. Adapters translate blocks into their own wire
/// shape; everything outside the adapters works with this form only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    /// Plain text
    Text {
        /// The text content
        text: String,
    },
    /// Base64-encoded image
    Image {
        /// MIME type, e.g. "image/png"
        media_type: String,
        /// Base64 payload without any data-URL prefix
        data: String,
    },
}

impl ContentBlock {
    /// Create a text block
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self::Text { text: text.into() }
    }

    /// Create an image block from a base64 payload
    pub fn image<S: Into<String>>(media_type: S, data: S) -> Self {
        Self::Image {
            media_type: media_type.into(),
            data: data.into(),
        }
    }

    /// Text of this block, empty for non-text blocks
    pub fn as_text(&self) -> &str {
        match self {
            Self::Text { text } => text,
            Self::Image { .. } => "",
        }
    }
}

/// A message in the conversation history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender
    pub role: MessageRole,
    /// Ordered content blocks
    pub content: Vec<ContentBlock>,
}

impl Message {
    /// Create a user message with a single text block
    pub fn user<S: Into<String>>(text: S) -> Self {
        Self {
            role: MessageRole::User,
            content: vec![ContentBlock::text(text)],
        }
    }

    /// Create an assistant message with a single text block
    pub fn assistant<S: Into<String>>(text: S) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: vec![ContentBlock::text(text)],
        }
    }

    /// Create a message from pre-built content blocks
    pub fn with_blocks(role: MessageRole, content: Vec<ContentBlock>) -> Self {
        Self { role, content }
    }

    /// Concatenated text of all text blocks
    pub fn text(&self) -> String {
        self.content
            .iter()
            .map(ContentBlock::as_text)
            .collect::<Vec<_>>()
            .join("")
    }

    /// Whether the message carries any image blocks
    pub fn has_images(&self) -> bool {
        self.content
            .iter()
            .any(|block| matches!(block, ContentBlock::Image { .. }))
    }
}
