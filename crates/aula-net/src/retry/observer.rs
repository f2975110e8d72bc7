//! Attempt observation and telemetry
//!
//! Every attempt, success or failure, is reported to a `RetryObserver`
//! together with its context (component, action, URL, attempt index). The
//! observer is the telemetry seam: logging, metrics, and error reporting
//! hang off it without influencing retry decisions.

use std::error::Error;
use std::time::Duration;

/// Context describing which operation an attempt belongs to
#[derive(Debug, Clone)]
pub struct AttemptContext {
    /// Subsystem making the attempt (e.g. "executor", "queue-processor")
    pub component: String,

    /// What is being attempted (typically the HTTP method)
    pub action: String,

    /// Target URL, when the operation has one
    pub url: Option<String>,

    /// Attempt number, 1-indexed
    pub attempt: u32,

    /// Maximum attempts the governing policy allows
    pub max_attempts: u32,
}

impl AttemptContext {
    /// Create a context with no attempt counter yet
    pub fn new(component: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            action: action.into(),
            url: None,
            attempt: 0,
            max_attempts: 0,
        }
    }

    /// Attach the target URL
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Derive a context positioned at a specific attempt
    pub fn at(&self, attempt: u32, max_attempts: u32) -> Self {
        Self {
            attempt,
            max_attempts,
            ..self.clone()
        }
    }

    fn url_str(&self) -> &str {
        self.url.as_deref().unwrap_or("-")
    }
}

/// Observer for retry attempt events
///
/// Implement this to collect telemetry during retry execution. Events fire
/// for every attempt independent of retry decisions.
pub trait RetryObserver: Send + Sync {
    /// An attempt is about to start
    fn on_attempt_start(&self, ctx: &AttemptContext);

    /// An attempt failed and will be retried after `delay`
    fn on_attempt_failed(&self, ctx: &AttemptContext, error: &dyn Error, delay: Duration);

    /// The operation succeeded; `total_duration` spans all attempts
    fn on_success(&self, ctx: &AttemptContext, total_duration: Duration);

    /// The retry budget is exhausted
    fn on_exhausted(&self, ctx: &AttemptContext, final_error: &dyn Error);

    /// Retrying stopped because the error is not retryable
    fn on_cancelled(&self, ctx: &AttemptContext, error: Option<&dyn Error>) {
        let _ = (ctx, error);
    }
}

/// Observer that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpObserver;

impl RetryObserver for NoOpObserver {
    fn on_attempt_start(&self, _ctx: &AttemptContext) {}

    fn on_attempt_failed(&self, _ctx: &AttemptContext, _error: &dyn Error, _delay: Duration) {}

    fn on_success(&self, _ctx: &AttemptContext, _total_duration: Duration) {}

    fn on_exhausted(&self, _ctx: &AttemptContext, _final_error: &dyn Error) {}
}

/// Observer that logs attempt events through `tracing`
///
/// Level policy: attempt start at DEBUG, failed attempts and cancellations
/// at WARN, success after retry at INFO (first-attempt success at DEBUG),
/// exhaustion at ERROR.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl RetryObserver for TracingObserver {
    fn on_attempt_start(&self, ctx: &AttemptContext) {
        tracing::debug!(
            component = %ctx.component,
            action = %ctx.action,
            url = %ctx.url_str(),
            attempt = ctx.attempt,
            max_attempts = ctx.max_attempts,
            "starting attempt"
        );
    }

    fn on_attempt_failed(&self, ctx: &AttemptContext, error: &dyn Error, delay: Duration) {
        tracing::warn!(
            component = %ctx.component,
            action = %ctx.action,
            url = %ctx.url_str(),
            attempt = ctx.attempt,
            max_attempts = ctx.max_attempts,
            error = %error,
            delay_ms = delay.as_millis() as u64,
            "attempt failed, will retry"
        );
    }

    fn on_success(&self, ctx: &AttemptContext, total_duration: Duration) {
        if ctx.attempt > 1 {
            tracing::info!(
                component = %ctx.component,
                action = %ctx.action,
                url = %ctx.url_str(),
                attempt = ctx.attempt,
                total_duration_ms = total_duration.as_millis() as u64,
                "succeeded after retry"
            );
        } else {
            tracing::debug!(
                component = %ctx.component,
                action = %ctx.action,
                url = %ctx.url_str(),
                duration_ms = total_duration.as_millis() as u64,
                "succeeded on first attempt"
            );
        }
    }

    fn on_exhausted(&self, ctx: &AttemptContext, final_error: &dyn Error) {
        tracing::error!(
            component = %ctx.component,
            action = %ctx.action,
            url = %ctx.url_str(),
            attempts = ctx.attempt,
            max_attempts = ctx.max_attempts,
            error = %final_error,
            "retry budget exhausted"
        );
    }

    fn on_cancelled(&self, ctx: &AttemptContext, error: Option<&dyn Error>) {
        match error {
            Some(err) => tracing::warn!(
                component = %ctx.component,
                action = %ctx.action,
                url = %ctx.url_str(),
                attempt = ctx.attempt,
                error = %err,
                "retry stopped on non-retryable error"
            ),
            None => tracing::warn!(
                component = %ctx.component,
                action = %ctx.action,
                url = %ctx.url_str(),
                attempt = ctx.attempt,
                "retry cancelled"
            ),
        }
    }
}

/// Observer that counts attempt events
///
/// Useful in tests and for coarse metrics.
#[derive(Debug, Default)]
pub struct StatsObserver {
    /// Attempt start events
    pub attempt_starts: std::sync::atomic::AtomicU32,
    /// Failed attempt events
    pub failures: std::sync::atomic::AtomicU32,
    /// Success events
    pub successes: std::sync::atomic::AtomicU32,
    /// Exhaustion events
    pub exhaustions: std::sync::atomic::AtomicU32,
    /// Cancellation events
    pub cancellations: std::sync::atomic::AtomicU32,
}

impl StatsObserver {
    /// Create a zeroed stats observer
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempt starts recorded so far
    pub fn attempt_starts(&self) -> u32 {
        self.attempt_starts.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Failures recorded so far
    pub fn failures(&self) -> u32 {
        self.failures.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Successes recorded so far
    pub fn successes(&self) -> u32 {
        self.successes.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Exhaustions recorded so far
    pub fn exhaustions(&self) -> u32 {
        self.exhaustions.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Cancellations recorded so far
    pub fn cancellations(&self) -> u32 {
        self.cancellations.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl RetryObserver for StatsObserver {
    fn on_attempt_start(&self, _ctx: &AttemptContext) {
        self.attempt_starts
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }

    fn on_attempt_failed(&self, _ctx: &AttemptContext, _error: &dyn Error, _delay: Duration) {
        self.failures
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }

    fn on_success(&self, _ctx: &AttemptContext, _total_duration: Duration) {
        self.successes
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }

    fn on_exhausted(&self, _ctx: &AttemptContext, _final_error: &dyn Error) {
        self.exhaustions
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }

    fn on_cancelled(&self, _ctx: &AttemptContext, _error: Option<&dyn Error>) {
        self.cancellations
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }
}

impl<T: RetryObserver + ?Sized> RetryObserver for std::sync::Arc<T> {
    fn on_attempt_start(&self, ctx: &AttemptContext) {
        (**self).on_attempt_start(ctx)
    }

    fn on_attempt_failed(&self, ctx: &AttemptContext, error: &dyn Error, delay: Duration) {
        (**self).on_attempt_failed(ctx, error, delay)
    }

    fn on_success(&self, ctx: &AttemptContext, total_duration: Duration) {
        (**self).on_success(ctx, total_duration)
    }

    fn on_exhausted(&self, ctx: &AttemptContext, final_error: &dyn Error) {
        (**self).on_exhausted(ctx, final_error)
    }

    fn on_cancelled(&self, ctx: &AttemptContext, error: Option<&dyn Error>) {
        (**self).on_cancelled(ctx, error)
    }
}

impl<T: RetryObserver + ?Sized> RetryObserver for Box<T> {
    fn on_attempt_start(&self, ctx: &AttemptContext) {
        (**self).on_attempt_start(ctx)
    }

    fn on_attempt_failed(&self, ctx: &AttemptContext, error: &dyn Error, delay: Duration) {
        (**self).on_attempt_failed(ctx, error, delay)
    }

    fn on_success(&self, ctx: &AttemptContext, total_duration: Duration) {
        (**self).on_success(ctx, total_duration)
    }

    fn on_exhausted(&self, ctx: &AttemptContext, final_error: &dyn Error) {
        (**self).on_exhausted(ctx, final_error)
    }

    fn on_cancelled(&self, ctx: &AttemptContext, error: Option<&dyn Error>) {
        (**self).on_cancelled(ctx, error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NetError;
    use std::sync::Arc;

    fn ctx() -> AttemptContext {
        AttemptContext::new("executor", "GET")
            .with_url("https://api.aula.example/students")
            .at(1, 4)
    }

    #[test]
    fn context_builders() {
        let base = AttemptContext::new("queue-processor", "POST").with_url("http://x/");
        let positioned = base.at(3, 5);
        assert_eq!(positioned.attempt, 3);
        assert_eq!(positioned.max_attempts, 5);
        assert_eq!(positioned.component, "queue-processor");
        assert_eq!(positioned.url.as_deref(), Some("http://x/"));
    }

    #[test]
    fn stats_observer_counts() {
        let observer = StatsObserver::new();
        let error = NetError::timeout(100);

        observer.on_attempt_start(&ctx());
        observer.on_attempt_start(&ctx().at(2, 4));
        observer.on_attempt_failed(&ctx(), &error, Duration::from_millis(100));
        observer.on_success(&ctx().at(2, 4), Duration::from_millis(500));

        assert_eq!(observer.attempt_starts(), 2);
        assert_eq!(observer.failures(), 1);
        assert_eq!(observer.successes(), 1);
        assert_eq!(observer.exhaustions(), 0);
        assert_eq!(observer.cancellations(), 0);
    }

    #[test]
    fn arc_observer_forwards() {
        let observer = Arc::new(StatsObserver::new());
        let error = NetError::connection("reset");

        observer.on_attempt_start(&ctx());
        observer.on_exhausted(&ctx().at(4, 4), &error);
        observer.on_cancelled(&ctx(), Some(&error));

        assert_eq!(observer.attempt_starts(), 1);
        assert_eq!(observer.exhaustions(), 1);
        assert_eq!(observer.cancellations(), 1);
    }

    #[test]
    fn noop_observer_is_silent() {
        let observer = NoOpObserver;
        let error = NetError::timeout(10);
        observer.on_attempt_start(&ctx());
        observer.on_attempt_failed(&ctx(), &error, Duration::ZERO);
        observer.on_success(&ctx(), Duration::ZERO);
        observer.on_exhausted(&ctx(), &error);
        observer.on_cancelled(&ctx(), None);
    }
}
