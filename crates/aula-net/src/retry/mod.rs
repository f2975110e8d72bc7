//! Retry execution with configurable backoff, predicates, and observers
//!
//! The executor owns the attempt loop: it bounds each attempt with an
//! optional deadline, consults a [`RetryPredicate`] after every failure, and
//! reports progress to a [`RetryObserver`]. Delay computation lives in
//! [`calculate_delay`] so the queue processor can reuse it when it staggers
//! retries across drain cycles instead of looping in place.

mod error;
mod executor;
mod observer;
mod strategies;

pub use error::RetryError;
pub use executor::{execute_attempt, retry_with_policy, RetryExecutor, RetryExecutorBuilder};
pub use observer::{AttemptContext, NoOpObserver, RetryObserver, StatsObserver, TracingObserver};
pub use strategies::{
    calculate_delay, AlwaysRetry, ClosurePredicate, NeverRetry, RetryPredicate, TransientOnly,
};
