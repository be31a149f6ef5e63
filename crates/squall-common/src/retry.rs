//! Bounded retry policy shared by connection setup and sink flushes.

use std::time::Duration;

/// Backoff schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Delay grows by `step` per attempt: 0, step, 2*step, ...
    Linear { step: Duration },
    /// Constant delay between attempts.
    Fixed { delay: Duration },
}

/// A bounded retry policy: how many attempts, and how long to wait
/// before each one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Policy for queue connection establishment: 20 attempts with
    /// linearly increasing one-second steps (0s, 1s, 2s, ...).
    pub fn connection() -> Self {
        Self {
            max_attempts: 20,
            backoff: Backoff::Linear {
                step: Duration::from_secs(1),
            },
        }
    }

    /// Policy for retrying a failed bulk flush before accepting loss.
    pub fn bulk_flush() -> Self {
        Self {
            max_attempts: 5,
            backoff: Backoff::Linear {
                step: Duration::from_secs(2),
            },
        }
    }

    /// Delay to wait before the given zero-based attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Linear { step } => step * attempt,
            Backoff::Fixed { delay } => {
                if attempt == 0 {
                    Duration::ZERO
                } else {
                    delay
                }
            }
        }
    }

    /// Whether the given zero-based attempt is still within budget.
    pub fn allows(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_policy_backs_off_linearly() {
        let policy = RetryPolicy::connection();
        assert_eq!(policy.max_attempts, 20);
        assert_eq!(policy.delay_for(0), Duration::ZERO);
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(7), Duration::from_secs(7));
    }

    #[test]
    fn fixed_backoff_skips_delay_on_first_attempt() {
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff: Backoff::Fixed {
                delay: Duration::from_secs(2),
            },
        };
        assert_eq!(policy.delay_for(0), Duration::ZERO);
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
    }

    #[test]
    fn allows_is_exclusive_of_max() {
        let policy = RetryPolicy::connection();
        assert!(policy.allows(0));
        assert!(policy.allows(19));
        assert!(!policy.allows(20));
    }
}
