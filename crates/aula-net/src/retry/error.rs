//! Error types for retry execution

use std::error::Error;
use std::fmt;
use std::time::Duration;

/// Errors produced by the retry executor
///
/// Generic over `E`, the error type of the operation being retried (in this
/// crate that is `NetError` throughout).
#[derive(Debug)]
pub enum RetryError<E> {
    /// The retry budget was consumed without a success
    Exhausted {
        /// Attempts made before giving up
        attempts: u32,
        /// Error from the final attempt
        source: E,
        /// Wall time spent across all attempts
        total_duration: Duration,
    },

    /// Retrying was cancelled before a terminal outcome
    Cancelled {
        /// Attempts made before cancellation
        attempts: u32,
        /// The last error seen, if any
        last_error: Option<E>,
    },

    /// A single attempt exceeded its deadline
    AttemptTimeout {
        /// Which attempt timed out
        attempt: u32,
        /// The deadline that was exceeded
        timeout: Duration,
    },

    /// The predicate classified the error as permanent
    NonRetryable(E),
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Exhausted {
                attempts,
                source,
                total_duration,
            } => write!(
                f,
                "retry exhausted after {} attempts over {:.2}s: {}",
                attempts,
                total_duration.as_secs_f64(),
                source
            ),
            RetryError::Cancelled {
                attempts,
                last_error,
            } => match last_error {
                Some(err) => write!(f, "retry cancelled after {} attempts: {}", attempts, err),
                None => write!(f, "retry cancelled after {} attempts", attempts),
            },
            RetryError::AttemptTimeout { attempt, timeout } => write!(
                f,
                "attempt {} timed out after {}ms",
                attempt,
                timeout.as_millis()
            ),
            RetryError::NonRetryable(source) => write!(f, "non-retryable error: {}", source),
        }
    }
}

impl<E: Error + 'static> Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RetryError::Exhausted { source, .. } => Some(source),
            RetryError::Cancelled {
                last_error: Some(err),
                ..
            } => Some(err),
            RetryError::NonRetryable(source) => Some(source),
            _ => None,
        }
    }
}

impl<E> RetryError<E> {
    /// Create an exhausted error
    pub fn exhausted(attempts: u32, source: E, total_duration: Duration) -> Self {
        RetryError::Exhausted {
            attempts,
            source,
            total_duration,
        }
    }

    /// Create a cancelled error
    pub fn cancelled(attempts: u32, last_error: Option<E>) -> Self {
        RetryError::Cancelled {
            attempts,
            last_error,
        }
    }

    /// Create an attempt timeout error
    pub fn attempt_timeout(attempt: u32, timeout: Duration) -> Self {
        RetryError::AttemptTimeout { attempt, timeout }
    }

    /// Create a non-retryable error
    pub fn non_retryable(source: E) -> Self {
        RetryError::NonRetryable(source)
    }

    /// Attempts made before this error
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } => *attempts,
            RetryError::Cancelled { attempts, .. } => *attempts,
            RetryError::AttemptTimeout { attempt, .. } => *attempt,
            RetryError::NonRetryable(_) => 1,
        }
    }

    /// Whether the retry budget was exhausted
    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }

    /// Whether retrying was cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled { .. })
    }

    /// Whether a single attempt timed out
    pub fn is_timeout(&self) -> bool {
        matches!(self, RetryError::AttemptTimeout { .. })
    }

    /// Whether the error was classified permanent
    pub fn is_non_retryable(&self) -> bool {
        matches!(self, RetryError::NonRetryable(_))
    }

    /// Consume this error, returning the underlying one if present
    pub fn into_source(self) -> Option<E> {
        match self {
            RetryError::Exhausted { source, .. } => Some(source),
            RetryError::Cancelled { last_error, .. } => last_error,
            RetryError::NonRetryable(source) => Some(source),
            RetryError::AttemptTimeout { .. } => None,
        }
    }

    /// Borrow the underlying error if present
    pub fn source_ref(&self) -> Option<&E> {
        match self {
            RetryError::Exhausted { source, .. } => Some(source),
            RetryError::Cancelled { last_error, .. } => last_error.as_ref(),
            RetryError::NonRetryable(source) => Some(source),
            RetryError::AttemptTimeout { .. } => None,
        }
    }

    /// Map the underlying error type
    pub fn map_err<F, E2>(self, f: F) -> RetryError<E2>
    where
        F: FnOnce(E) -> E2,
    {
        match self {
            RetryError::Exhausted {
                attempts,
                source,
                total_duration,
            } => RetryError::Exhausted {
                attempts,
                source: f(source),
                total_duration,
            },
            RetryError::Cancelled {
                attempts,
                last_error,
            } => RetryError::Cancelled {
                attempts,
                last_error: last_error.map(f),
            },
            RetryError::AttemptTimeout { attempt, timeout } => {
                RetryError::AttemptTimeout { attempt, timeout }
            }
            RetryError::NonRetryable(source) => RetryError::NonRetryable(f(source)),
        }
    }
}
