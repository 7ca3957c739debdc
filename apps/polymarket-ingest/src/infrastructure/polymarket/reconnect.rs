//! Reconnection Policy
//!
//! Bounded exponential backoff for the venue session. The n-th consecutive
//! failure waits `min(2^n, max_delay)` seconds, and once the failure count
//! reaches `max_attempts` no further attempt is scheduled.

use std::time::Duration;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Upper bound for any single wait.
    pub max_delay: Duration,
    /// Consecutive failures after which the supervisor gives up.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_delay: Duration::from_secs(60),
            max_attempts: 10,
        }
    }
}

impl ReconnectConfig {
    /// Create a configuration.
    #[must_use]
    pub const fn new(max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            max_delay,
            max_attempts,
        }
    }
}

/// Outcome of recording a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait this long, then try again.
    RetryAfter {
        /// Consecutive failures so far, including this one.
        attempt: u32,
        /// Wait before the next attempt.
        delay: Duration,
    },
    /// The retry budget is spent.
    GiveUp {
        /// Consecutive failures so far, including this one.
        attempts: u32,
    },
}

/// Retry counter plus the backoff law.
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    failures: u32,
}

impl ReconnectPolicy {
    /// Create a new reconnection policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            failures: 0,
        }
    }

    /// Wait for the given consecutive failure count.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let secs = 1_u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_secs(secs).min(self.config.max_delay)
    }

    /// Count a failure and decide what happens next.
    pub fn record_failure(&mut self) -> RetryDecision {
        self.failures = self.failures.saturating_add(1);
        if self.failures >= self.config.max_attempts {
            return RetryDecision::GiveUp {
                attempts: self.failures,
            };
        }
        RetryDecision::RetryAfter {
            attempt: self.failures,
            delay: self.delay_for(self.failures),
        }
    }

    /// Reset after the session reached `Listening`, or for a fresh cycle.
    pub const fn reset(&mut self) {
        self.failures = 0;
    }

    /// Consecutive failures recorded since the last reset.
    #[must_use]
    pub const fn failures(&self) -> u32 {
        self.failures
    }

    /// Configured retry budget.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use test_case::test_case;

    use super::*;

    #[test]
    fn default_config_values() {
        let config = ReconnectConfig::default();
        assert_eq!(config.max_delay, Duration::from_secs(60));
        assert_eq!(config.max_attempts, 10);
    }

    #[test_case(0, 1)]
    #[test_case(1, 2)]
    #[test_case(2, 4)]
    #[test_case(5, 32)]
    #[test_case(6, 60)]
    #[test_case(9, 60)]
    #[test_case(64, 60)]
    #[test_case(u32::MAX, 60)]
    fn delay_law(attempt: u32, expected_secs: u64) {
        let policy = ReconnectPolicy::new(ReconnectConfig::default());
        assert_eq!(policy.delay_for(attempt), Duration::from_secs(expected_secs));
    }

    #[test]
    fn failures_escalate_until_budget_spent() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::new(Duration::from_secs(60), 3));

        assert_eq!(
            policy.record_failure(),
            RetryDecision::RetryAfter {
                attempt: 1,
                delay: Duration::from_secs(2)
            }
        );
        assert_eq!(
            policy.record_failure(),
            RetryDecision::RetryAfter {
                attempt: 2,
                delay: Duration::from_secs(4)
            }
        );
        assert_eq!(policy.record_failure(), RetryDecision::GiveUp { attempts: 3 });
        assert_eq!(policy.failures(), 3);
    }

    #[test]
    fn reset_restarts_the_law() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
        let _ = policy.record_failure();
        let _ = policy.record_failure();
        policy.reset();

        assert_eq!(policy.failures(), 0);
        assert_eq!(
            policy.record_failure(),
            RetryDecision::RetryAfter {
                attempt: 1,
                delay: Duration::from_secs(2)
            }
        );
    }

    proptest! {
        #[test]
        fn delay_never_exceeds_cap(attempt in 0u32..200, cap in 1u64..600) {
            let policy = ReconnectPolicy::new(ReconnectConfig::new(Duration::from_secs(cap), 10));
            let delay = policy.delay_for(attempt);
            prop_assert!(delay <= Duration::from_secs(cap));
            if attempt < 63 {
                prop_assert_eq!(delay, Duration::from_secs((1u64 << attempt).min(cap)));
            }
        }
    }
}
