//! Retry execution engine
//!
//! Runs one logical operation across multiple timeout-bounded attempts,
//! applying a `RetryPolicy` for backoff, a `RetryPredicate` for retry
//! decisions, and reporting every attempt to a `RetryObserver`.

use std::future::Future;
use std::time::{Duration, Instant};

use crate::error::NetError;
use crate::types::RetryPolicy;

use super::error::RetryError;
use super::observer::{AttemptContext, NoOpObserver, RetryObserver};
use super::strategies::{calculate_delay, RetryPredicate, TransientOnly};

/// Run a single attempt, bounded by an optional deadline
///
/// Exceeding the deadline cancels the in-flight future and yields a
/// `NetError::Timeout`. This is the building block both for the executor's
/// attempt loop and for the queue processor, which spreads its attempts
/// across drain cycles instead of looping here.
pub async fn execute_attempt<T, Fut>(timeout: Option<Duration>, fut: Fut) -> Result<T, NetError>
where
    Fut: Future<Output = Result<T, NetError>>,
{
    match timeout {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(NetError::timeout(limit.as_millis() as u64)),
        },
        None => fut.await,
    }
}

/// Execute an async operation with retries under the given policy
///
/// Convenience wrapper for simple cases; use `RetryExecutorBuilder` for a
/// custom predicate, observer, or per-attempt timeout.
///
/// # Example
///
/// ```rust,no_run
/// use aula_net::retry::retry_with_policy;
/// use aula_net::types::RetryPolicy;
/// use aula_net::NetError;
///
/// async fn example() {
///     let policy = RetryPolicy::default();
///     let result = retry_with_policy(&policy, || async {
///         Ok::<_, NetError>("fetched")
///     })
///     .await;
/// }
/// ```
pub async fn retry_with_policy<F, Fut, T>(
    policy: &RetryPolicy,
    op: F,
) -> Result<T, RetryError<NetError>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, NetError>>,
{
    RetryExecutorBuilder::new()
        .with_policy(policy.clone())
        .build()
        .execute(op)
        .await
}

/// Builder for a `RetryExecutor`
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use aula_net::retry::{RetryExecutorBuilder, TracingObserver};
/// use aula_net::types::RetryPolicy;
///
/// let executor = RetryExecutorBuilder::new()
///     .with_policy(RetryPolicy::critical())
///     .with_observer(TracingObserver)
///     .with_timeout(Duration::from_secs(10))
///     .build();
/// ```
pub struct RetryExecutorBuilder<P = TransientOnly, O = NoOpObserver> {
    policy: RetryPolicy,
    predicate: P,
    observer: O,
    timeout: Option<Duration>,
    context: AttemptContext,
}

impl Default for RetryExecutorBuilder<TransientOnly, NoOpObserver> {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryExecutorBuilder<TransientOnly, NoOpObserver> {
    /// Create a builder with the default policy and predicate
    pub fn new() -> Self {
        Self {
            policy: RetryPolicy::default(),
            predicate: TransientOnly,
            observer: NoOpObserver,
            timeout: None,
            context: AttemptContext::new("executor", "execute"),
        }
    }
}

impl<P, O> RetryExecutorBuilder<P, O> {
    /// Set the retry policy
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the retry predicate
    pub fn with_predicate<P2>(self, predicate: P2) -> RetryExecutorBuilder<P2, O> {
        RetryExecutorBuilder {
            policy: self.policy,
            predicate,
            observer: self.observer,
            timeout: self.timeout,
            context: self.context,
        }
    }

    /// Set the observer receiving attempt telemetry
    pub fn with_observer<O2>(self, observer: O2) -> RetryExecutorBuilder<P, O2> {
        RetryExecutorBuilder {
            policy: self.policy,
            predicate: self.predicate,
            observer,
            timeout: self.timeout,
            context: self.context,
        }
    }

    /// Bound each attempt by a deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the attempt context reported to the observer
    pub fn with_context(mut self, context: AttemptContext) -> Self {
        self.context = context;
        self
    }

    /// Build the executor
    pub fn build(self) -> RetryExecutor<P, O> {
        RetryExecutor {
            policy: self.policy,
            predicate: self.predicate,
            observer: self.observer,
            timeout: self.timeout,
            context: self.context,
        }
    }
}

/// Retry executor with configurable policy, predicate, observer, and timeout
pub struct RetryExecutor<P = TransientOnly, O = NoOpObserver> {
    policy: RetryPolicy,
    predicate: P,
    observer: O,
    timeout: Option<Duration>,
    context: AttemptContext,
}

impl<P, O> RetryExecutor<P, O>
where
    P: RetryPredicate<NetError>,
    O: RetryObserver,
{
    /// Execute an operation, retrying per the policy
    ///
    /// Makes up to `max_retries + 1` attempts. Before each retry the
    /// predicate is consulted with the failing error and the 0-indexed
    /// attempt; a `false` verdict stops immediately and propagates the error
    /// as `NonRetryable`. On exhaustion the last error is surfaced.
    pub async fn execute<F, Fut, T>(&self, mut op: F) -> Result<T, RetryError<NetError>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, NetError>>,
    {
        let start = Instant::now();
        let max_attempts = self.policy.total_attempts();

        let mut attempt = 1;
        loop {
            let ctx = self.context.at(attempt, max_attempts);
            self.observer.on_attempt_start(&ctx);

            match execute_attempt(self.timeout, op()).await {
                Ok(value) => {
                    self.observer.on_success(&ctx, start.elapsed());
                    return Ok(value);
                }
                Err(err) => {
                    if !self.predicate.should_retry(&err, attempt - 1) {
                        self.observer.on_cancelled(&ctx, Some(&err));
                        return Err(RetryError::non_retryable(err));
                    }

                    if attempt >= max_attempts {
                        self.observer.on_exhausted(&ctx, &err);
                        return Err(RetryError::exhausted(attempt, err, start.elapsed()));
                    }

                    let delay = calculate_delay(&self.policy, attempt);
                    self.observer.on_attempt_failed(&ctx, &err, delay);

                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// The policy driving this executor
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}
