//! Retry bookkeeping for automatic reconnection.

use std::time::Duration;

/// Default number of automatic reconnect attempts before giving up.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Default delay before the first reconnect attempt.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(3_000);

/// Default ceiling for any single reconnect delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);

/// Capped exponential backoff with a bounded attempt budget.
///
/// The delay for the attempt scheduled while `attempts == n` is
/// `min(base * 2^n, max_delay)`. The counter only moves forward through
/// [`next_delay`](Backoff::next_delay) and only returns to zero through
/// [`reset`](Backoff::reset).
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max_delay: Duration,
    max_retries: u32,
    attempts: u32,
}

impl Backoff {
    /// Create a fresh backoff with zero attempts recorded.
    pub fn new(base: Duration, max_delay: Duration, max_retries: u32) -> Self {
        Self {
            base,
            max_delay,
            max_retries,
            attempts: 0,
        }
    }

    /// Number of reconnect attempts scheduled since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Returns `true` once the attempt budget is spent.
    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_retries
    }

    /// Delay that the next scheduled attempt would use, without consuming it.
    pub fn peek_delay(&self) -> Duration {
        let factor = 1_u32.checked_shl(self.attempts).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max_delay)
    }

    /// Consume one attempt and return its delay, or `None` when exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }
        let delay = self.peek_delay();
        self.attempts += 1;
        Some(delay)
    }

    /// Forget all recorded attempts.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY, DEFAULT_MAX_RETRIES)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn default_sequence_doubles_then_caps() {
        let mut backoff = Backoff::default();
        let delays: Vec<_> = std::iter::from_fn(|| backoff.next_delay()).collect();
        assert_eq!(delays, vec![ms(3_000), ms(6_000), ms(12_000), ms(24_000), ms(30_000)]);
    }

    #[test]
    fn delay_matches_formula_for_each_attempt() {
        let mut backoff = Backoff::default();
        for n in 0..DEFAULT_MAX_RETRIES {
            let expected = ms((3_000_u64 * 2_u64.pow(n)).min(30_000));
            assert_eq!(backoff.next_delay(), Some(expected), "attempt {n}");
        }
    }

    #[test]
    fn exhausted_after_budget() {
        let mut backoff = Backoff::default();
        for _ in 0..DEFAULT_MAX_RETRIES {
            assert!(backoff.next_delay().is_some());
        }
        assert!(backoff.is_exhausted());
        assert_eq!(backoff.next_delay(), None);
        assert_eq!(backoff.attempts(), DEFAULT_MAX_RETRIES);
    }

    #[test]
    fn reset_restores_base_delay() {
        let mut backoff = Backoff::default();
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.attempts(), 0);
        assert_eq!(backoff.next_delay(), Some(DEFAULT_BASE_DELAY));
    }

    #[test]
    fn peek_does_not_consume() {
        let backoff = Backoff::default();
        assert_eq!(backoff.peek_delay(), DEFAULT_BASE_DELAY);
        assert_eq!(backoff.attempts(), 0);
    }

    #[test]
    fn huge_attempt_counts_saturate_at_cap() {
        let mut backoff = Backoff::new(ms(1_000), ms(60_000), 100);
        let last = std::iter::from_fn(|| backoff.next_delay()).last();
        assert_eq!(last, Some(ms(60_000)));
    }

    #[test]
    fn zero_budget_never_schedules() {
        let mut backoff = Backoff::new(ms(1_000), ms(60_000), 0);
        assert!(backoff.is_exhausted());
        assert_eq!(backoff.next_delay(), None);
    }
}
