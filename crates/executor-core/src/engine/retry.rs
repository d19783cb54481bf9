//! Retry policy: decides whether a failed task is frozen or given up.

use std::time::Duration;

use crate::config::EngineConfig;

/// What to do with a task after a failure or timeout.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Rest for `delay`, then go back to the same stage queue.
    Freeze { delay: Duration },

    /// Retries exhausted: the task fails for good.
    GiveUp,
}

/// Retry policy for failed tasks.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Failures tolerated before giving up.
    pub max_retries: u32,

    /// Freeze time after the first failure. Zero requeues immediately.
    pub base_delay: Duration,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,

    /// Upper bound on the freeze time.
    pub max_delay: Duration,

    /// Requeue thawed tasks at the head of their stage queue.
    pub requeue_ahead: bool,
}

impl RetryPolicy {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.freeze_base_delay_ms),
            multiplier: config.freeze_multiplier,
            max_delay: Duration::from_secs(config.freeze_max_delay_secs),
            requeue_ahead: config.retry_ahead,
        }
    }

    /// Decide based on the retry count *after* counting the current failure.
    pub fn decide(&self, retry_count: u32) -> RetryDecision {
        if retry_count > self.max_retries {
            RetryDecision::GiveUp
        } else {
            RetryDecision::Freeze {
                delay: self.freeze_delay(retry_count),
            }
        }
    }

    /// `base_delay * multiplier^(retry_count - 1)`, capped at `max_delay`.
    ///
    /// Example with base_delay=2s, multiplier=2.0:
    /// - retry 1: 2s
    /// - retry 2: 4s
    /// - retry 3: 8s
    pub fn freeze_delay(&self, retry_count: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let exponent = retry_count.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn policy(max_retries: u32, base_secs: u64) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_secs(base_secs),
            multiplier: 2.0,
            max_delay: Duration::from_secs(10),
            requeue_ahead: false,
        }
    }

    #[rstest]
    #[case::first(1, RetryDecision::Freeze { delay: Duration::from_secs(2) })]
    #[case::last_allowed(3, RetryDecision::Freeze { delay: Duration::from_secs(8) })]
    #[case::exhausted(4, RetryDecision::GiveUp)]
    fn decide_caps_retries(#[case] retry_count: u32, #[case] expected: RetryDecision) {
        assert_eq!(policy(3, 2).decide(retry_count), expected);
    }

    #[test]
    fn zero_max_retries_gives_up_on_first_failure() {
        assert_eq!(policy(0, 2).decide(1), RetryDecision::GiveUp);
    }

    #[test]
    fn backoff_is_capped() {
        let p = policy(100, 2);
        assert_eq!(p.freeze_delay(4), Duration::from_secs(10));
        assert_eq!(p.freeze_delay(80), Duration::from_secs(10));
    }

    #[test]
    fn zero_base_delay_thaws_immediately() {
        let p = policy(3, 0);
        assert_eq!(p.decide(2), RetryDecision::Freeze { delay: Duration::ZERO });
    }

    #[test]
    fn default_policy_follows_default_config() {
        let p = RetryPolicy::default();
        assert_eq!(p.max_retries, EngineConfig::default().max_retries);
        assert!(!p.requeue_ahead);
    }
}
