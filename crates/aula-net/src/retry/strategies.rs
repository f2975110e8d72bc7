//! Backoff delay computation and retry predicates

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::error::NetError;
use crate::types::{RetryPolicy, RetryStrategy};

/// Calculate the delay before the next retry attempt
///
/// `attempt` is 1-indexed (the attempt that just failed). For exponential
/// backoff the delay is `initial * base^(attempt - 1)`, capped at
/// `max_delay_ms`. When the policy enables jitter, a uniform +/-25%
/// perturbation is applied to the capped value; the result is clamped to the
/// cap again so jitter can never exceed it.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use aula_net::retry::calculate_delay;
/// use aula_net::types::RetryPolicy;
///
/// let policy = RetryPolicy {
///     jitter: false,
///     ..RetryPolicy::default()
/// };
/// assert_eq!(calculate_delay(&policy, 1), Duration::from_millis(1000));
/// assert_eq!(calculate_delay(&policy, 2), Duration::from_millis(2000));
/// ```
pub fn calculate_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let attempt_index = attempt.saturating_sub(1);

    let base_delay_ms = match policy.strategy {
        RetryStrategy::None => 0,

        RetryStrategy::FixedDelay => policy.initial_delay_ms,

        RetryStrategy::ExponentialBackoff => {
            let multiplier = policy.exponential_base.powf(attempt_index as f64);
            (policy.initial_delay_ms as f64 * multiplier) as u64
        }

        RetryStrategy::LinearBackoff => policy.initial_delay_ms * (attempt_index as u64 + 1),
    };

    let capped_delay_ms = base_delay_ms.min(policy.max_delay_ms);

    let final_delay_ms = if policy.jitter && capped_delay_ms > 0 {
        let factor: f64 = rand::rng().random_range(0.75..=1.25);
        let jittered = (capped_delay_ms as f64 * factor) as u64;
        jittered.min(policy.max_delay_ms)
    } else {
        capped_delay_ms
    };

    Duration::from_millis(final_delay_ms)
}

/// Predicate deciding whether a failed attempt should be retried
///
/// `attempt_index` is 0-indexed: the index of the attempt that just failed.
/// Returning `false` stops retrying immediately regardless of remaining
/// budget, and the error propagates to the caller.
pub trait RetryPredicate<E: ?Sized>: Send + Sync {
    /// Whether the given error at the given attempt should be retried
    fn should_retry(&self, error: &E, attempt_index: u32) -> bool;
}

/// Retries every error until the budget runs out
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysRetry;

impl<E: ?Sized> RetryPredicate<E> for AlwaysRetry {
    fn should_retry(&self, _error: &E, _attempt_index: u32) -> bool {
        true
    }
}

/// Never retries
#[derive(Debug, Clone, Copy)]
pub struct NeverRetry;

impl<E: ?Sized> RetryPredicate<E> for NeverRetry {
    fn should_retry(&self, _error: &E, _attempt_index: u32) -> bool {
        false
    }
}

/// Closure-based predicate
pub struct ClosurePredicate<F> {
    predicate: F,
}

impl<F> ClosurePredicate<F> {
    /// Wrap a closure as a predicate
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<E, F> RetryPredicate<E> for ClosurePredicate<F>
where
    F: Fn(&E, u32) -> bool + Send + Sync,
{
    fn should_retry(&self, error: &E, attempt_index: u32) -> bool {
        (self.predicate)(error, attempt_index)
    }
}

/// The default retry condition
///
/// Retries transport-level connection failures, timeouts, and HTTP 5xx.
/// HTTP 4xx (including 401/403) and application-level rejections are
/// permanent and never retried.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransientOnly;

impl RetryPredicate<NetError> for TransientOnly {
    fn should_retry(&self, error: &NetError, _attempt_index: u32) -> bool {
        error.is_transient()
    }
}

impl<E, T: RetryPredicate<E> + ?Sized> RetryPredicate<E> for Arc<T> {
    fn should_retry(&self, error: &E, attempt_index: u32) -> bool {
        (**self).should_retry(error, attempt_index)
    }
}

impl<E, T: RetryPredicate<E> + ?Sized> RetryPredicate<E> for Box<T> {
    fn should_retry(&self, error: &E, attempt_index: u32) -> bool {
        (**self).should_retry(error, attempt_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 5,
            strategy: RetryStrategy::ExponentialBackoff,
            exponential_base: 2.0,
            initial_delay_ms: 1000,
            max_delay_ms: 30000,
            jitter: false,
        }
    }

    #[test]
    fn no_delay_strategy() {
        let policy = RetryPolicy {
            strategy: RetryStrategy::None,
            ..no_jitter_policy()
        };
        for attempt in 1..=5 {
            assert_eq!(calculate_delay(&policy, attempt), Duration::ZERO);
        }
    }

    #[test]
    fn fixed_delay_strategy() {
        let policy = RetryPolicy {
            strategy: RetryStrategy::FixedDelay,
            ..no_jitter_policy()
        };
        for attempt in 1..=5 {
            assert_eq!(calculate_delay(&policy, attempt), Duration::from_millis(1000));
        }
    }

    #[test]
    fn exponential_delay_doubles() {
        let policy = no_jitter_policy();
        assert_eq!(calculate_delay(&policy, 1), Duration::from_millis(1000));
        assert_eq!(calculate_delay(&policy, 2), Duration::from_millis(2000));
        assert_eq!(calculate_delay(&policy, 3), Duration::from_millis(4000));
        assert_eq!(calculate_delay(&policy, 4), Duration::from_millis(8000));
        assert_eq!(calculate_delay(&policy, 5), Duration::from_millis(16000));
    }

    #[test]
    fn linear_delay_grows() {
        let policy = RetryPolicy {
            strategy: RetryStrategy::LinearBackoff,
            ..no_jitter_policy()
        };
        assert_eq!(calculate_delay(&policy, 1), Duration::from_millis(1000));
        assert_eq!(calculate_delay(&policy, 2), Duration::from_millis(2000));
        assert_eq!(calculate_delay(&policy, 3), Duration::from_millis(3000));
    }

    #[test]
    fn max_delay_caps_exponent() {
        let policy = RetryPolicy {
            max_delay_ms: 5000,
            ..no_jitter_policy()
        };
        assert_eq!(calculate_delay(&policy, 5), Duration::from_millis(5000));
        assert_eq!(calculate_delay(&policy, 10), Duration::from_millis(5000));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = RetryPolicy {
            jitter: true,
            ..no_jitter_policy()
        };
        for _ in 0..200 {
            let delay = calculate_delay(&policy, 1);
            assert!(delay >= Duration::from_millis(750), "delay {delay:?}");
            assert!(delay <= Duration::from_millis(1250), "delay {delay:?}");
        }
    }

    #[test]
    fn jitter_never_exceeds_cap() {
        let policy = RetryPolicy {
            jitter: true,
            initial_delay_ms: 1000,
            max_delay_ms: 1000,
            ..no_jitter_policy()
        };
        for _ in 0..200 {
            assert!(calculate_delay(&policy, 4) <= Duration::from_millis(1000));
        }
    }

    #[test]
    fn jitter_ignores_zero_delay() {
        let policy = RetryPolicy {
            strategy: RetryStrategy::None,
            jitter: true,
            ..no_jitter_policy()
        };
        assert_eq!(calculate_delay(&policy, 1), Duration::ZERO);
    }

    #[test]
    fn transient_only_predicate() {
        let predicate = TransientOnly;
        assert!(predicate.should_retry(&NetError::connection("reset"), 0));
        assert!(predicate.should_retry(&NetError::timeout(1000), 1));
        assert!(predicate.should_retry(&NetError::http(502, "http://x/"), 0));
        assert!(!predicate.should_retry(&NetError::http(401, "http://x/"), 0));
        assert!(!predicate.should_retry(&NetError::invalid("bad field"), 0));
    }

    #[test]
    fn closure_predicate_sees_attempt_index() {
        let predicate =
            ClosurePredicate::new(|_e: &NetError, attempt_index| attempt_index < 2);
        let err = NetError::timeout(10);
        assert!(predicate.should_retry(&err, 0));
        assert!(predicate.should_retry(&err, 1));
        assert!(!predicate.should_retry(&err, 2));
    }

    #[test]
    fn arc_predicate_forwarding() {
        let predicate: Arc<dyn RetryPredicate<NetError>> = Arc::new(NeverRetry);
        assert!(!predicate.should_retry(&NetError::timeout(10), 0));
    }
}
