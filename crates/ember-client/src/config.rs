//! Client engine settings.

use crate::optimistic::UpdateKind;
use std::time::Duration;

/// Default server address for [`ClientConfig`].
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8787";

/// Bounded exponential backoff for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`: `base * 2^(attempt - 1)`.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        self.base_delay.saturating_mul(1_u32 << exponent)
    }
}

/// Per-operation request timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Vote, view and share.
    pub mutation: Duration,
    pub comment: Duration,
    pub refresh: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            mutation: Duration::from_secs(10),
            comment: Duration::from_secs(30),
            refresh: Duration::from_secs(15),
        }
    }
}

impl Timeouts {
    #[must_use]
    pub const fn for_kind(&self, kind: UpdateKind) -> Duration {
        match kind {
            UpdateKind::Vote | UpdateKind::View | UpdateKind::Share => self.mutation,
            UpdateKind::Comment => self.comment,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub retry: RetryPolicy,
    pub timeouts: Timeouts,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            retry: RetryPolicy::default(),
            timeouts: Timeouts::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_from_base() {
        let policy = RetryPolicy::default();
        let delays: Vec<_> = (1..=4).map(|n| policy.delay_after(n).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8]);
    }

    #[test]
    fn backoff_saturates_instead_of_overflowing() {
        let policy = RetryPolicy {
            max_attempts: u32::MAX,
            base_delay: Duration::from_secs(1),
        };
        assert_eq!(policy.delay_after(u32::MAX), Duration::from_secs(1 << 20));
    }

    #[test]
    fn comments_get_the_longer_timeout() {
        let timeouts = Timeouts::default();
        assert_eq!(timeouts.for_kind(UpdateKind::Comment), Duration::from_secs(30));
        assert_eq!(timeouts.for_kind(UpdateKind::Vote), Duration::from_secs(10));
    }
}
