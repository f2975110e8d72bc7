//! Priority-ordered offline request queue
//!
//! Requests deferred while offline wait here until the processor drains
//! them. Ordering is by priority rank, FIFO within a rank, maintained at
//! insertion so the processor only ever pops the front. Every entry carries
//! a one-shot completion channel that is settled exactly once, whatever the
//! outcome.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::time::Instant;
use uuid::Uuid;

use crate::broadcast::{Broadcaster, Subscription};
use crate::error::{NetError, Result};
use crate::retry::RetryPredicate;
use crate::transport::{NetRequest, NetResponse};
use crate::types::{Priority, RetryPolicy};

/// Receiver half of a queued request's completion channel
pub type CompletionReceiver = oneshot::Receiver<Result<NetResponse>>;

/// A request waiting in the queue
pub struct QueuedRequest {
    /// Unique id, used for cancellation
    pub id: Uuid,

    /// The request to perform once conditions allow
    pub request: NetRequest,

    /// Drain priority
    pub priority: Priority,

    /// Retry policy governing this request's attempt budget and backoff
    pub policy: RetryPolicy,

    /// Per-attempt timeout override; the processor's default applies when
    /// unset
    pub timeout: Option<Duration>,

    /// Retryability override; transient-error classification applies when
    /// unset
    pub predicate: Option<Arc<dyn RetryPredicate<NetError>>>,

    /// Attempts already made
    pub retry_count: u32,

    /// Earliest instant the next attempt may run, set after a backoff delay
    pub not_before: Option<Instant>,

    /// When the request entered the queue
    pub created_at: DateTime<Utc>,

    /// When the most recent attempt ran
    pub last_attempt_at: Option<DateTime<Utc>>,

    completion: Option<oneshot::Sender<Result<NetResponse>>>,
}

impl std::fmt::Debug for QueuedRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedRequest")
            .field("id", &self.id)
            .field("request", &self.request)
            .field("priority", &self.priority)
            .field("policy", &self.policy)
            .field("timeout", &self.timeout)
            .field("has_predicate", &self.predicate.is_some())
            .field("retry_count", &self.retry_count)
            .field("not_before", &self.not_before)
            .field("created_at", &self.created_at)
            .field("last_attempt_at", &self.last_attempt_at)
            .finish_non_exhaustive()
    }
}

impl QueuedRequest {
    /// Create an entry and the receiver its submitter awaits
    pub fn new(
        request: NetRequest,
        priority: Priority,
        policy: RetryPolicy,
    ) -> (Self, CompletionReceiver) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                id: Uuid::new_v4(),
                request,
                priority,
                policy,
                timeout: None,
                predicate: None,
                retry_count: 0,
                not_before: None,
                created_at: Utc::now(),
                last_attempt_at: None,
                completion: Some(tx),
            },
            rx,
        )
    }

    /// Record that an attempt was made
    pub fn record_attempt(&mut self) {
        self.retry_count += 1;
        self.last_attempt_at = Some(Utc::now());
    }

    /// Whether the retry budget is spent
    pub fn is_exhausted(&self) -> bool {
        self.retry_count >= self.policy.total_attempts()
    }

    /// Whether the backoff window, if any, has passed
    pub fn is_due(&self) -> bool {
        self.not_before.is_none_or(|at| at <= Instant::now())
    }

    /// Settle the completion channel
    ///
    /// Idempotent: only the first settlement is delivered. A dropped
    /// receiver means the submitter stopped waiting, which is fine.
    pub fn settle(&mut self, outcome: Result<NetResponse>) {
        if let Some(tx) = self.completion.take() {
            let _ = tx.send(outcome);
        }
    }
}

impl Drop for QueuedRequest {
    fn drop(&mut self) {
        // An entry dropped without an explicit outcome counts as cancelled
        self.settle(Err(NetError::Cancelled));
    }
}

/// Point-in-time queue composition, published on every mutation
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct QueueStats {
    /// Total pending entries
    pub pending: usize,

    /// Pending entries per priority
    pub by_priority: HashMap<Priority, usize>,
}

struct QueueInner {
    entries: Mutex<VecDeque<QueuedRequest>>,
    changes: Broadcaster<QueueStats>,
}

/// The shared request queue
///
/// Clones share state.
#[derive(Clone)]
pub struct RequestQueue {
    inner: Arc<QueueInner>,
}

impl Default for RequestQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self {
            inner: Arc::new(QueueInner {
                entries: Mutex::new(VecDeque::new()),
                changes: Broadcaster::new(),
            }),
        }
    }

    /// Insert an entry at its priority position
    ///
    /// The entry lands after every entry of equal or higher priority, so
    /// arrival order is preserved within a rank.
    pub fn enqueue(&self, entry: QueuedRequest) {
        {
            let mut entries = self.inner.entries.lock().expect("queue lock poisoned");
            let position = entries
                .iter()
                .position(|existing| existing.priority.rank() > entry.priority.rank())
                .unwrap_or(entries.len());
            tracing::debug!(
                id = %entry.id,
                priority = ?entry.priority,
                position,
                pending = entries.len() + 1,
                "request queued"
            );
            entries.insert(position, entry);
        }
        self.publish_stats();
    }

    /// Pop the highest-priority entry
    pub fn dequeue(&self) -> Option<QueuedRequest> {
        let entry = {
            let mut entries = self.inner.entries.lock().expect("queue lock poisoned");
            entries.pop_front()
        };
        if entry.is_some() {
            self.publish_stats();
        }
        entry
    }

    /// Cancel a pending entry by id
    ///
    /// The entry's completion settles with `NetError::Cancelled`. Returns
    /// whether an entry was found.
    pub fn remove(&self, id: Uuid) -> bool {
        let removed = {
            let mut entries = self.inner.entries.lock().expect("queue lock poisoned");
            let position = entries.iter().position(|entry| entry.id == id);
            position.map(|at| entries.remove(at))
        };
        match removed.flatten() {
            Some(mut entry) => {
                entry.settle(Err(NetError::Cancelled));
                tracing::debug!(id = %id, "queued request cancelled");
                self.publish_stats();
                true
            }
            None => false,
        }
    }

    /// Drop every pending entry
    ///
    /// Each settles with `NetError::QueueCleared`. Returns how many were
    /// dropped.
    pub fn clear(&self) -> usize {
        let drained: Vec<QueuedRequest> = {
            let mut entries = self.inner.entries.lock().expect("queue lock poisoned");
            entries.drain(..).collect()
        };
        let count = drained.len();
        for mut entry in drained {
            entry.settle(Err(NetError::QueueCleared));
        }
        if count > 0 {
            tracing::info!(count, "request queue cleared");
            self.publish_stats();
        }
        count
    }

    /// Pending entry count
    pub fn len(&self) -> usize {
        self.inner.entries.lock().expect("queue lock poisoned").len()
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current composition
    pub fn stats(&self) -> QueueStats {
        let entries = self.inner.entries.lock().expect("queue lock poisoned");
        let mut by_priority: HashMap<Priority, usize> = HashMap::new();
        for entry in entries.iter() {
            *by_priority.entry(entry.priority).or_default() += 1;
        }
        QueueStats {
            pending: entries.len(),
            by_priority,
        }
    }

    /// Ids of pending entries in drain order
    pub fn pending_ids(&self) -> Vec<Uuid> {
        self.inner
            .entries
            .lock()
            .expect("queue lock poisoned")
            .iter()
            .map(|entry| entry.id)
            .collect()
    }

    /// Register a listener for composition changes
    pub fn subscribe_changes<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&QueueStats) + Send + Sync + 'static,
    {
        self.inner.changes.subscribe(listener)
    }

    fn publish_stats(&self) {
        self.inner.changes.publish(&self.stats());
    }
}
