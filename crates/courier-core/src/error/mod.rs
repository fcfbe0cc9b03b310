//! Error handling for Courier
//!
//! Backend failures are normalized into [`ClassifiedError`] envelopes by the
//! [`classify`] module; everything else (mostly configuration mistakes) uses
//! the plain variants below.

mod classify;
mod sanitize;

pub use classify::{
    classify, ClassifiedError, RawProviderError, StatusClass, DEFAULT_RETRY_AFTER_SECONDS,
};
pub use sanitize::sanitize_error_text;

use thiserror::Error;

/// Main error type for Courier operations
#[derive(Error, Debug, Clone)]
pub enum CourierError {
    /// A backend failure, already classified into the stable envelope
    #[error("{0}")]
    Provider(#[from] ClassifiedError),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },
}

/// Result type alias for Courier operations
pub type CourierResult<T> = Result<T, CourierError>;

impl CourierError {
    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// The classified envelope, when this is a backend failure
    pub fn as_classified(&self) -> Option<&ClassifiedError> {
        match self {
            Self::Provider(classified) => Some(classified),
            Self::Config { .. } => None,
        }
    }

    /// Whether retrying the operation may succeed
    pub fn is_retryable(&self) -> bool {
        self.as_classified().is_some_and(ClassifiedError::retryable)
    }

    /// Seconds to wait before retrying, when the backend told us
    pub fn retry_after_seconds(&self) -> Option<u64> {
        self.as_classified()?.retry_after_seconds
    }
}
