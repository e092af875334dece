//! Retry policy: decides backoff delays and exhaustion.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound on any computed backoff delay: 5 hours.
///
/// Matches the ceiling of the platform whose behavior this engine models;
/// without it an exponential policy overflows into useless multi-day waits.
pub const MAX_BACKOFF: Duration = Duration::from_secs(5 * 60 * 60);

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    /// delay = initial_delay * attempt
    Linear,
    /// delay = initial_delay * 2^(attempt - 1)
    Exponential,
}

/// Retry policy for failed attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub backoff: BackoffKind,

    /// Delay before the first retry.
    pub initial_delay: Duration,

    /// Maximum number of running attempts; `None` means retry forever.
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    pub fn linear(initial_delay: Duration) -> Self {
        Self {
            backoff: BackoffKind::Linear,
            initial_delay,
            max_attempts: None,
        }
    }

    pub fn exponential(initial_delay: Duration) -> Self {
        Self {
            backoff: BackoffKind::Exponential,
            initial_delay,
            max_attempts: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Delay before the retry that follows attempt number `attempt`
    /// (1-indexed), clamped to [`MAX_BACKOFF`].
    ///
    /// Example with initial_delay=2s:
    /// - linear:      2s, 4s, 6s, 8s, ...
    /// - exponential: 2s, 4s, 8s, 16s, ...
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let delay = match self.backoff {
            BackoffKind::Linear => self.initial_delay.saturating_mul(attempt),
            BackoffKind::Exponential => {
                let factor = 2f64.powi(attempt.saturating_sub(1).min(62) as i32);
                Duration::from_secs_f64((self.initial_delay.as_secs_f64() * factor).min(MAX_BACKOFF.as_secs_f64()))
            }
        };
        delay.min(MAX_BACKOFF)
    }

    /// Have the attempts already made used up the allowance?
    pub fn exhausted(&self, attempts_made: u32) -> bool {
        match self.max_attempts {
            Some(max) => attempts_made >= max,
            None => false,
        }
    }
}

impl Default for RetryPolicy {
    /// Exponential from 30 s, unlimited attempts.
    fn default() -> Self {
        Self::exponential(Duration::from_secs(30))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_delays_grow_by_initial() {
        let p = RetryPolicy::linear(Duration::from_secs(2));
        assert_eq!(p.next_delay(1), Duration::from_secs(2));
        assert_eq!(p.next_delay(2), Duration::from_secs(4));
        assert_eq!(p.next_delay(3), Duration::from_secs(6));
    }

    #[test]
    fn exponential_delays_double() {
        let p = RetryPolicy::exponential(Duration::from_secs(2));
        assert_eq!(p.next_delay(1), Duration::from_secs(2));
        assert_eq!(p.next_delay(2), Duration::from_secs(4));
        assert_eq!(p.next_delay(3), Duration::from_secs(8));
    }

    #[test]
    fn delay_is_clamped_to_max_backoff() {
        let p = RetryPolicy::exponential(Duration::from_secs(60));
        assert_eq!(p.next_delay(30), MAX_BACKOFF);

        let p = RetryPolicy::linear(Duration::from_secs(3600));
        assert_eq!(p.next_delay(100), MAX_BACKOFF);
    }

    #[test]
    fn attempt_zero_behaves_like_first() {
        let p = RetryPolicy::linear(Duration::from_secs(2));
        assert_eq!(p.next_delay(0), Duration::from_secs(2));
    }

    #[test]
    fn exhaustion_respects_max_attempts() {
        let p = RetryPolicy::linear(Duration::from_secs(1)).with_max_attempts(2);
        assert!(!p.exhausted(0));
        assert!(!p.exhausted(1));
        assert!(p.exhausted(2));
        assert!(p.exhausted(3));
    }

    #[test]
    fn unbounded_policy_never_exhausts() {
        let p = RetryPolicy::exponential(Duration::from_secs(1));
        assert!(!p.exhausted(u32::MAX));
    }

    #[test]
    fn serde_roundtrip() {
        let p = RetryPolicy::exponential(Duration::from_secs(2)).with_max_attempts(5);
        let s = serde_json::to_string(&p).unwrap();
        let back: RetryPolicy = serde_json::from_str(&s).unwrap();
        assert_eq!(p, back);
    }
}
