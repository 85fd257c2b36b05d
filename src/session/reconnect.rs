//! Reconnection policy
//!
//! Pure functions of the attempt count: exponential backoff from
//! `base_delay`, doubled per attempt and capped at `max_delay`, with optional
//! proportional jitter.

use crate::config::ReconnectSection;
use rand::Rng;
use std::time::Duration;

/// Backoff parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Maximum consecutive failed attempts (None = unlimited)
    pub max_attempts: Option<u32>,
    /// Proportional jitter in `0.0..=1.0`
    pub jitter_ratio: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: None,
            jitter_ratio: 0.0,
        }
    }
}

impl From<&ReconnectSection> for ReconnectPolicy {
    fn from(section: &ReconnectSection) -> Self {
        Self {
            base_delay: Duration::from_millis(section.base_delay_ms),
            max_delay: Duration::from_millis(section.max_delay_ms),
            max_attempts: section.max_attempts,
            jitter_ratio: section.jitter_ratio,
        }
    }
}

/// Outcome of asking the policy whether to try again
#[derive(Debug, Clone, PartialEq)]
pub enum ReconnectionDecision {
    Proceed { attempt: u32, delay: Duration },
    AbortShutdownRequested,
    AbortMaxAttemptsExceeded,
}

impl ReconnectPolicy {
    /// Policy that never retries
    pub fn disabled() -> Self {
        Self {
            max_attempts: Some(0),
            ..Self::default()
        }
    }

    /// Delay before attempt `attempt` (1-based): `base * 2^(attempt-1)`, capped
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Spread `delay` by up to `jitter_ratio` in either direction, never
    /// exceeding `max_delay`
    pub fn with_jitter<R: Rng + ?Sized>(&self, delay: Duration, rng: &mut R) -> Duration {
        if self.jitter_ratio <= 0.0 || delay.is_zero() {
            return delay;
        }
        let spread = rng.gen_range(-self.jitter_ratio..=self.jitter_ratio);
        let jittered = delay.as_secs_f64() * (1.0 + spread);
        Duration::from_secs_f64(jittered.max(0.0)).min(self.max_delay)
    }

    /// Whether attempt number `attempt` (1-based) is allowed
    pub fn should_retry(&self, attempt: u32) -> bool {
        match self.max_attempts {
            Some(max) => attempt <= max,
            None => true,
        }
    }

    /// Decide the next step after `failed_attempts` consecutive failures
    pub fn decide(&self, failed_attempts: u32, shutdown_requested: bool) -> ReconnectionDecision {
        if shutdown_requested {
            return ReconnectionDecision::AbortShutdownRequested;
        }
        let attempt = failed_attempts.saturating_add(1);
        if !self.should_retry(attempt) {
            return ReconnectionDecision::AbortMaxAttemptsExceeded;
        }
        ReconnectionDecision::Proceed {
            attempt,
            delay: self.delay_for(attempt),
        }
    }

    /// Upper bound on the time spent backing off before giving up
    pub fn max_total_delay(&self) -> Option<Duration> {
        self.max_attempts
            .map(|max| (1..=max).map(|attempt| self.delay_for(attempt)).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_default_backoff_sequence() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<u64> = (1..=7).map(|a| policy.delay_for(a).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30]);
    }

    #[test]
    fn test_huge_attempt_does_not_overflow() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_decide_respects_max_attempts() {
        let policy = ReconnectPolicy {
            max_attempts: Some(2),
            ..ReconnectPolicy::default()
        };

        assert_eq!(
            policy.decide(0, false),
            ReconnectionDecision::Proceed {
                attempt: 1,
                delay: Duration::from_secs(1)
            }
        );
        assert_eq!(
            policy.decide(1, false),
            ReconnectionDecision::Proceed {
                attempt: 2,
                delay: Duration::from_secs(2)
            }
        );
        assert_eq!(
            policy.decide(2, false),
            ReconnectionDecision::AbortMaxAttemptsExceeded
        );
        assert_eq!(
            policy.decide(0, true),
            ReconnectionDecision::AbortShutdownRequested
        );
    }

    #[test]
    fn test_disabled_policy_never_retries() {
        let policy = ReconnectPolicy::disabled();
        assert!(!policy.should_retry(1));
        assert_eq!(
            policy.decide(0, false),
            ReconnectionDecision::AbortMaxAttemptsExceeded
        );
    }

    #[test]
    fn test_unlimited_retries() {
        let policy = ReconnectPolicy::default();
        assert!(policy.should_retry(10_000));
        assert_eq!(policy.max_total_delay(), None);
    }

    #[test]
    fn test_max_total_delay() {
        let policy = ReconnectPolicy {
            max_attempts: Some(3),
            ..ReconnectPolicy::default()
        };
        assert_eq!(policy.max_total_delay(), Some(Duration::from_secs(7)));
    }

    #[test]
    fn test_zero_jitter_is_identity() {
        let policy = ReconnectPolicy::default();
        let mut rng = StdRng::seed_from_u64(7);
        let delay = Duration::from_millis(1500);
        assert_eq!(policy.with_jitter(delay, &mut rng), delay);
    }

    #[test]
    fn test_from_config_section() {
        let section = ReconnectSection {
            base_delay_ms: 3000,
            max_delay_ms: 10_000,
            max_attempts: Some(5),
            ..ReconnectSection::default()
        };
        let policy = ReconnectPolicy::from(&section);
        assert_eq!(policy.delay_for(1), Duration::from_secs(3));
        assert_eq!(policy.delay_for(3), Duration::from_secs(10));
        assert_eq!(policy.max_attempts, Some(5));
    }

    proptest! {
        #[test]
        fn prop_backoff_is_monotone_and_capped(
            base_ms in 1u64..5_000,
            extra_ms in 0u64..60_000,
            attempt in 1u32..64,
        ) {
            let policy = ReconnectPolicy {
                base_delay: Duration::from_millis(base_ms),
                max_delay: Duration::from_millis(base_ms + extra_ms),
                ..ReconnectPolicy::default()
            };
            let current = policy.delay_for(attempt);
            let next = policy.delay_for(attempt + 1);
            prop_assert!(current <= next);
            prop_assert!(next <= policy.max_delay);
            prop_assert!(current >= policy.base_delay.min(policy.max_delay));
        }

        #[test]
        fn prop_jitter_stays_within_bounds(
            ratio in 0.0f64..=1.0,
            delay_ms in 1u64..30_000,
            seed in any::<u64>(),
        ) {
            let policy = ReconnectPolicy {
                jitter_ratio: ratio,
                ..ReconnectPolicy::default()
            };
            let mut rng = StdRng::seed_from_u64(seed);
            let delay = Duration::from_millis(delay_ms);
            let jittered = policy.with_jitter(delay, &mut rng);
            prop_assert!(jittered <= policy.max_delay);
            let low = delay.as_secs_f64() * (1.0 - ratio) - 1e-6;
            prop_assert!(jittered.as_secs_f64() >= low);
        }
    }
}
