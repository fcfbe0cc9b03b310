//! Token budget management for conversation histories
//!
//! Keeps conversations inside the model's context window: the estimator
//! approximates token counts, and the sliding window deterministically thins
//! the history when budgets or message-count limits are exceeded.

pub mod estimator;
pub mod sliding_window;

pub use estimator::{TokenCounter, TokenEstimator};
pub use sliding_window::{
    allowed_input_tokens, truncate, truncate_if_needed, TruncationRequest, HARD_MESSAGE_LIMIT,
    SOFT_MESSAGE_LIMIT,
};
