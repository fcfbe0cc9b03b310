//! Deterministic sliding-window truncation for conversation histories
//!
//! When a conversation approaches the model's context window (or simply grows
//! too long), the middle of the history is thinned out while the first
//! message and the newest messages survive. Truncation is a pure function of
//! its inputs: same history and fraction in, same history out, with no
//! randomness and no mutation of the caller's data.

use crate::context::estimator::{TokenCounter, TokenEstimator};
use crate::conversation::Message;

/// Above this many messages the history is truncated aggressively,
/// regardless of token counts
pub const HARD_MESSAGE_LIMIT: usize = 100;
/// Above this many messages the history is truncated moderately,
/// regardless of token counts
pub const SOFT_MESSAGE_LIMIT: usize = 80;

/// Share of the context window held back as a safety margin
const SAFETY_MARGIN: f64 = 0.1;
/// Default share of the window reserved for model output when the caller
/// does not say otherwise
const DEFAULT_RESERVED_OUTPUT_FRACTION: f64 = 0.2;
/// Histories at or below this length are returned untouched
const MIN_TRUNCATABLE_LEN: usize = 5;
/// The newest messages are always kept, whatever the fraction says
const MIN_KEEP_TAIL: usize = 4;
/// Nudge applied before `ceil`/`floor`: `1.0 - 0.8` is not exactly `0.2` in
/// f64, and the keep counts must come out as if computed exactly
const ROUND_EPS: f64 = 1e-9;

/// Inputs for one budget check
#[derive(Debug)]
pub struct TruncationRequest<'a> {
    /// Full conversation history, oldest first
    pub messages: &'a [Message],
    /// Token total for everything except the last message, typically carried
    /// forward from the previous call's usage record
    pub total_tokens_excluding_last: u32,
    /// The model's context window
    pub context_window_tokens: u32,
    /// Tokens reserved for the reply; defaults to 20% of the window
    pub reserved_output_tokens: Option<u32>,
}

/// Input tokens allowed before truncation kicks in
///
/// 10% of the window is held back as a safety margin on top of the output
/// reservation, so the budget is `window * 0.9 - reserved`.
pub fn allowed_input_tokens(context_window_tokens: u32, reserved_output_tokens: Option<u32>) -> f64 {
    let window = f64::from(context_window_tokens);
    let reserved =
        reserved_output_tokens.map_or(window * DEFAULT_RESERVED_OUTPUT_FRACTION, f64::from);
    window * (1.0 - SAFETY_MARGIN) - reserved
}

/// Check the budget and truncate when necessary
///
/// Message-count guards run first: over [`HARD_MESSAGE_LIMIT`] messages
/// truncates with fraction 0.8 and over [`SOFT_MESSAGE_LIMIT`] with 0.6,
/// without consulting the counter at all. Otherwise the last message is
/// counted, added to the carried-forward total, and compared against
/// [`allowed_input_tokens`]; exceeding it truncates with fraction 0.5.
///
/// A failing counter never aborts the turn: the character heuristic fills in
/// for that call and a warning is logged.
pub async fn truncate_if_needed(
    request: TruncationRequest<'_>,
    counter: &dyn TokenCounter,
) -> Vec<Message> {
    let message_count = request.messages.len();
    if message_count > HARD_MESSAGE_LIMIT {
        tracing::info!(message_count, fraction = 0.8, "message count over hard limit, truncating");
        return truncate(request.messages, 0.8);
    }
    if message_count > SOFT_MESSAGE_LIMIT {
        tracing::info!(message_count, fraction = 0.6, "message count over soft limit, truncating");
        return truncate(request.messages, 0.6);
    }

    let Some(last) = request.messages.last() else {
        return Vec::new();
    };
    let last_tokens = match counter.count_tokens(&last.content).await {
        Ok(tokens) => tokens,
        Err(err) => {
            tracing::warn!(error = %err, "token counter failed, using character estimate");
            TokenEstimator::new().estimate_content(&last.content)
        }
    };

    let effective_tokens = request
        .total_tokens_excluding_last
        .saturating_add(last_tokens);
    let allowed = allowed_input_tokens(
        request.context_window_tokens,
        request.reserved_output_tokens,
    );
    if f64::from(effective_tokens) > allowed {
        tracing::info!(
            effective_tokens,
            allowed,
            context_window_tokens = request.context_window_tokens,
            "context budget exceeded, truncating"
        );
        return truncate(request.messages, 0.5);
    }

    request.messages.to_vec()
}

/// Remove roughly `fraction` of the history, deterministically
///
/// The first message always survives, as do at least [`MIN_KEEP_TAIL`] of the
/// newest messages (more for gentle fractions: the tail is
/// `ceil((n - 1) * (1 - fraction))` messages, floored at four). The stretch
/// between first and tail is sampled at a fixed stride in adjacent pairs, so
/// a kept user message keeps its reply next to it. Histories of five or fewer
/// messages come back unchanged.
pub fn truncate(messages: &[Message], fraction: f64) -> Vec<Message> {
    let n = messages.len();
    if n <= MIN_TRUNCATABLE_LEN {
        return messages.to_vec();
    }

    let keep_share = 1.0 - fraction.clamp(0.0, 1.0);
    let min_keep_tail =
        MIN_KEEP_TAIL.max((((n - 1) as f64 * keep_share) - ROUND_EPS).ceil() as usize);

    let first = &messages[..1];
    let tail = &messages[n - min_keep_tail..];
    if n <= min_keep_tail + 1 {
        return [first, tail].concat();
    }

    let middle = &messages[1..n - min_keep_tail];
    // Rounded down to an even count so pairs never get split.
    let middle_to_keep =
        (((middle.len() as f64 * keep_share / 2.0) + ROUND_EPS).floor() as usize) * 2;
    if middle_to_keep == 0 {
        return [first, tail].concat();
    }

    let stride = (middle.len() / middle_to_keep).max(2);
    let mut sampled = Vec::with_capacity(middle_to_keep);
    let mut index = 0;
    while index < middle.len() && sampled.len() < middle_to_keep {
        sampled.push(middle[index].clone());
        if sampled.len() < middle_to_keep && index + 1 < middle.len() {
            sampled.push(middle[index + 1].clone());
        }
        index += stride;
    }

    let mut result = Vec::with_capacity(1 + sampled.len() + min_keep_tail);
    result.extend_from_slice(first);
    result.append(&mut sampled);
    result.extend_from_slice(tail);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{ContentBlock, MessageRole};
    use crate::error::{CourierError, CourierResult};
    use async_trait::async_trait;

    /// Numbered history so kept messages can be traced back to their index
    fn history(n: usize) -> Vec<Message> {
        (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    Message::user(i.to_string())
                } else {
                    Message::assistant(i.to_string())
                }
            })
            .collect()
    }

    fn indices(messages: &[Message]) -> Vec<usize> {
        messages
            .iter()
            .map(|m| m.text().parse::<usize>().unwrap())
            .collect()
    }

    struct FailingCounter;

    #[async_trait]
    impl TokenCounter for FailingCounter {
        async fn count_tokens(&self, _content: &[ContentBlock]) -> CourierResult<u32> {
            Err(CourierError::config("counter offline"))
        }
    }

    /// Counter that must not be consulted at all
    struct UnreachableCounter;

    #[async_trait]
    impl TokenCounter for UnreachableCounter {
        async fn count_tokens(&self, _content: &[ContentBlock]) -> CourierResult<u32> {
            panic!("counter should not be called");
        }
    }

    #[test]
    fn test_short_histories_are_untouched() {
        for n in 0..=5 {
            let messages = history(n);
            assert_eq!(truncate(&messages, 0.9), messages);
        }
    }

    #[test]
    fn test_first_message_always_survives() {
        for n in [6, 10, 37, 80, 101, 250] {
            let messages = history(n);
            for fraction in [0.1, 0.3, 0.5, 0.6, 0.8, 0.9] {
                let kept = truncate(&messages, fraction);
                assert_eq!(kept[0], messages[0], "n={n} fraction={fraction}");
            }
        }
    }

    #[test]
    fn test_newest_four_always_survive() {
        for n in [6, 10, 37, 101] {
            let messages = history(n);
            for fraction in [0.1, 0.5, 0.9] {
                let kept = truncate(&messages, fraction);
                let tail = &kept[kept.len() - 4..];
                assert_eq!(tail, &messages[n - 4..], "n={n} fraction={fraction}");
            }
        }
    }

    #[test]
    fn test_truncation_shrinks_long_histories() {
        for n in [6, 7, 20, 101] {
            let messages = history(n);
            for fraction in [0.5, 0.6, 0.8] {
                let kept = truncate(&messages, fraction);
                assert!(kept.len() < n, "n={n} fraction={fraction}");
            }
        }
    }

    #[test]
    fn test_order_is_preserved() {
        let messages = history(60);
        for fraction in [0.2, 0.5, 0.8] {
            let kept = indices(&truncate(&messages, fraction));
            let mut sorted = kept.clone();
            sorted.sort_unstable();
            sorted.dedup();
            assert_eq!(kept, sorted, "fraction={fraction}");
        }
    }

    #[test]
    fn test_higher_fraction_never_keeps_more() {
        let messages = history(40);
        let mut previous = usize::MAX;
        for tenths in 1..=9 {
            let fraction = f64::from(tenths) / 10.0;
            let kept = truncate(&messages, fraction).len();
            assert!(kept <= previous, "fraction={fraction} kept={kept}");
            previous = kept;
        }
    }

    #[test]
    fn test_determinism() {
        let messages = history(73);
        assert_eq!(truncate(&messages, 0.5), truncate(&messages, 0.5));
    }

    #[test]
    fn test_middle_is_sampled_in_adjacent_pairs() {
        let messages = history(101);
        let kept = truncate(&messages, 0.8);
        // min_keep_tail = max(4, ceil(100 * 0.2)) = 20, middle pool is 1..=80,
        // middle_to_keep = 16 at stride 5.
        assert_eq!(kept.len(), 1 + 16 + 20);

        let kept_indices = indices(&kept);
        let middle = &kept_indices[1..kept_indices.len() - 20];
        assert_eq!(middle.len(), 16);
        for pair in middle.chunks(2) {
            assert_eq!(pair[1], pair[0] + 1, "pair split: {pair:?}");
        }
        // Pairs start at the sampling stride.
        assert_eq!(&middle[..4], &[1, 2, 6, 7]);
    }

    #[test]
    fn test_user_assistant_pairing_survives_sampling() {
        // In an alternating history every kept pair spans both roles, so a
        // sampled request never loses its reply.
        let messages = history(101);
        let kept = truncate(&messages, 0.8);
        let kept_indices = indices(&kept);
        for pair in kept_indices[1..kept_indices.len() - 20].chunks(2) {
            assert_ne!(messages[pair[0]].role, messages[pair[1]].role);
        }
    }

    #[test]
    fn test_keep_counts_match_exact_arithmetic() {
        // keep_share for 0.8 is 0.19999999999999996 in f64; the counts must
        // still match the exact math: tail 20, middle 16 of 80.
        let kept = truncate(&history(101), 0.8);
        assert_eq!(kept.len(), 1 + 16 + 20);

        // 20 * 0.7 / 2 lands just below 7.0 in f64; exact math keeps
        // floor(7) * 2 = 14 of the 20-message middle, tail 48.
        let kept = truncate(&history(69), 0.3);
        assert_eq!(kept.len(), 1 + 14 + 48);
    }

    #[test]
    fn test_allowed_input_tokens() {
        assert_eq!(allowed_input_tokens(10_000, Some(1_000)), 8_000.0);
        // Default reservation is 20% of the window.
        assert_eq!(allowed_input_tokens(10_000, None), 7_000.0);
    }

    #[tokio::test]
    async fn test_hard_message_limit_skips_counting() {
        let messages = history(101);
        let kept = truncate_if_needed(
            TruncationRequest {
                messages: &messages,
                total_tokens_excluding_last: 0,
                context_window_tokens: 1_000_000,
                reserved_output_tokens: None,
            },
            &UnreachableCounter,
        )
        .await;
        assert_eq!(kept, truncate(&messages, 0.8));
    }

    #[tokio::test]
    async fn test_soft_message_limit_skips_counting() {
        let messages = history(81);
        let kept = truncate_if_needed(
            TruncationRequest {
                messages: &messages,
                total_tokens_excluding_last: 0,
                context_window_tokens: 1_000_000,
                reserved_output_tokens: None,
            },
            &UnreachableCounter,
        )
        .await;
        assert_eq!(kept, truncate(&messages, 0.6));
    }

    #[tokio::test]
    async fn test_budget_boundary_is_exclusive() {
        // Empty content in the last message keeps its count at zero, so the
        // carried total is the whole effective count.
        let mut messages = history(9);
        messages.push(Message::with_blocks(MessageRole::User, vec![]));
        let estimator = TokenEstimator::new();

        let at_limit = truncate_if_needed(
            TruncationRequest {
                messages: &messages,
                total_tokens_excluding_last: 8_000,
                context_window_tokens: 10_000,
                reserved_output_tokens: Some(1_000),
            },
            &estimator,
        )
        .await;
        assert_eq!(at_limit, messages);

        let over_limit = truncate_if_needed(
            TruncationRequest {
                messages: &messages,
                total_tokens_excluding_last: 8_001,
                context_window_tokens: 10_000,
                reserved_output_tokens: Some(1_000),
            },
            &estimator,
        )
        .await;
        assert_eq!(over_limit, truncate(&messages, 0.5));
        assert!(over_limit.len() < messages.len());
    }

    #[tokio::test]
    async fn test_default_output_reservation() {
        let mut messages = history(9);
        messages.push(Message::with_blocks(MessageRole::User, vec![]));
        let estimator = TokenEstimator::new();

        // allowed = 10_000 * 0.9 - 2_000 = 7_000
        let kept = truncate_if_needed(
            TruncationRequest {
                messages: &messages,
                total_tokens_excluding_last: 7_000,
                context_window_tokens: 10_000,
                reserved_output_tokens: None,
            },
            &estimator,
        )
        .await;
        assert_eq!(kept, messages);

        let kept = truncate_if_needed(
            TruncationRequest {
                messages: &messages,
                total_tokens_excluding_last: 7_001,
                context_window_tokens: 10_000,
                reserved_output_tokens: None,
            },
            &estimator,
        )
        .await;
        assert!(kept.len() < messages.len());
    }

    #[tokio::test]
    async fn test_counter_failure_falls_back_to_estimate() {
        // Last message is 100 chars, which the fallback estimates at 25 tokens.
        let mut messages = history(9);
        messages.push(Message::user("a".repeat(100)));

        let kept = truncate_if_needed(
            TruncationRequest {
                messages: &messages,
                total_tokens_excluding_last: 6_975,
                context_window_tokens: 10_000,
                reserved_output_tokens: None,
            },
            &FailingCounter,
        )
        .await;
        assert_eq!(kept, messages, "6975 + 25 = 7000 is within budget");

        let kept = truncate_if_needed(
            TruncationRequest {
                messages: &messages,
                total_tokens_excluding_last: 6_976,
                context_window_tokens: 10_000,
                reserved_output_tokens: None,
            },
            &FailingCounter,
        )
        .await;
        assert!(kept.len() < messages.len(), "7001 exceeds the budget");
    }

    #[tokio::test]
    async fn test_truncated_output_is_stable_when_within_budget() {
        let messages = history(30);
        let estimator = TokenEstimator::new();

        let truncated = truncate_if_needed(
            TruncationRequest {
                messages: &messages,
                total_tokens_excluding_last: 9_000,
                context_window_tokens: 10_000,
                reserved_output_tokens: Some(1_000),
            },
            &estimator,
        )
        .await;
        assert!(truncated.len() < messages.len());

        // The shrunk history now fits, so a second pass changes nothing.
        let again = truncate_if_needed(
            TruncationRequest {
                messages: &truncated,
                total_tokens_excluding_last: 4_000,
                context_window_tokens: 10_000,
                reserved_output_tokens: Some(1_000),
            },
            &estimator,
        )
        .await;
        assert_eq!(again, truncated);
    }

    #[tokio::test]
    async fn test_empty_history() {
        let kept = truncate_if_needed(
            TruncationRequest {
                messages: &[],
                total_tokens_excluding_last: 0,
                context_window_tokens: 10_000,
                reserved_output_tokens: None,
            },
            &TokenEstimator::new(),
        )
        .await;
        assert!(kept.is_empty());
    }
}
