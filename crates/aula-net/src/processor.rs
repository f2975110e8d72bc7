//! Queue drain state machine
//!
//! The processor empties the request queue whenever conditions allow. A
//! drain is triggered three ways: a periodic tick while online, the monitor
//! reporting connectivity regained, and an explicit kick from the client
//! after an enqueue. Passes never overlap; a reentrancy flag turns a second
//! trigger into a no-op while one is running.
//!
//! Each pass gives every item at most one attempt. A transiently failing
//! item goes back to the queue carrying a not-before instant derived from
//! its backoff delay; until that instant passes, later passes put it back
//! untouched. Retries of one request never stall requests behind it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::NetConfig;
use crate::error::NetError;
use crate::monitor::NetworkMonitor;
use crate::queue::RequestQueue;
use crate::retry::{calculate_delay, execute_attempt, AttemptContext, RetryObserver, TracingObserver};
use crate::transport::Transport;

/// Outcome of one drain pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrainStats {
    /// Items given an attempt this pass
    pub attempted: usize,

    /// Items that completed successfully
    pub succeeded: usize,

    /// Items put back for a later pass
    pub requeued: usize,

    /// Items still inside their backoff window, put back untouched
    pub deferred: usize,

    /// Items settled with a permanent error
    pub failed: usize,

    /// Items settled after spending their retry budget
    pub exhausted: usize,

    /// The pass stopped early because connectivity dropped
    pub stopped_offline: bool,

    /// The pass was skipped because another was already running
    pub skipped: bool,
}

/// Drains the request queue in response to time, connectivity, and kicks
pub struct QueueProcessor {
    queue: RequestQueue,
    monitor: NetworkMonitor,
    transport: Arc<dyn Transport>,
    observer: Arc<dyn RetryObserver>,
    drain_interval: Duration,
    pacing: Duration,
    request_timeout: Duration,
    draining: AtomicBool,
    kick: Notify,
    shutdown_tx: watch::Sender<bool>,
}

impl QueueProcessor {
    /// Create a processor reporting attempts through `tracing`
    pub fn new(
        queue: RequestQueue,
        monitor: NetworkMonitor,
        transport: Arc<dyn Transport>,
        config: &NetConfig,
    ) -> Arc<Self> {
        Self::with_observer(queue, monitor, transport, config, Arc::new(TracingObserver))
    }

    /// Create a processor with a custom attempt observer
    pub fn with_observer(
        queue: RequestQueue,
        monitor: NetworkMonitor,
        transport: Arc<dyn Transport>,
        config: &NetConfig,
        observer: Arc<dyn RetryObserver>,
    ) -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new(Self {
            queue,
            monitor,
            transport,
            observer,
            drain_interval: Duration::from_millis(config.drain_interval_ms),
            pacing: Duration::from_millis(config.drain_pacing_ms),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
            draining: AtomicBool::new(false),
            kick: Notify::new(),
            shutdown_tx,
        })
    }

    /// Ask for a drain at the next opportunity
    pub fn kick(&self) {
        self.kick.notify_one();
    }

    /// Stop the background task started by [`spawn`](Self::spawn)
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Start the trigger loop on a background task
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        let mut status_rx = this.monitor.watch();
        let mut shutdown_rx = this.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.drain_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately; swallow it so startup does
            // not race the caller's setup
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    changed = status_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        if !status_rx.borrow_and_update().is_online {
                            continue;
                        }
                        tracing::info!("connectivity regained, draining queue");
                    }
                    _ = this.kick.notified() => {}
                    _ = shutdown_rx.changed() => break,
                }
                this.drain().await;
            }
        })
    }

    /// Run one drain pass
    ///
    /// Pops at most as many items as were pending when the pass began, so an
    /// item requeued mid-pass waits for the next trigger instead of being
    /// retried in a tight loop.
    pub async fn drain(&self) -> DrainStats {
        if self.draining.swap(true, Ordering::SeqCst) {
            return DrainStats {
                skipped: true,
                ..DrainStats::default()
            };
        }
        let _guard = DrainGuard(&self.draining);

        let mut stats = DrainStats::default();
        let budget = self.queue.len();
        if budget == 0 {
            return stats;
        }
        tracing::debug!(pending = budget, "draining request queue");

        let mut waiting = Vec::new();
        for _ in 0..budget {
            if !self.monitor.is_online() {
                tracing::debug!("connectivity lost mid-drain, stopping");
                stats.stopped_offline = true;
                break;
            }
            let Some(mut entry) = self.queue.dequeue() else {
                break;
            };
            if !entry.is_due() {
                // Still inside its backoff window; goes back after the pass
                waiting.push(entry);
                stats.deferred += 1;
                continue;
            }

            let ctx = AttemptContext::new("queue-processor", entry.request.method.as_str())
                .with_url(entry.request.url.clone())
                .at(entry.retry_count + 1, entry.policy.total_attempts());
            self.observer.on_attempt_start(&ctx);
            entry.record_attempt();
            stats.attempted += 1;

            let started = Instant::now();
            let timeout = entry.timeout.unwrap_or(self.request_timeout);
            let outcome =
                execute_attempt(Some(timeout), self.transport.send(&entry.request)).await;

            match outcome {
                Ok(response) => {
                    self.observer.on_success(&ctx, started.elapsed());
                    entry.settle(Ok(response));
                    stats.succeeded += 1;
                }
                Err(err) => {
                    let retryable = match &entry.predicate {
                        Some(predicate) => predicate.should_retry(&err, entry.retry_count - 1),
                        None => err.is_transient(),
                    };
                    if !retryable {
                        self.observer.on_cancelled(&ctx, Some(&err));
                        entry.settle(Err(err));
                        stats.failed += 1;
                    } else if entry.is_exhausted() {
                        self.observer.on_exhausted(&ctx, &err);
                        let attempts = entry.retry_count;
                        entry.settle(Err(NetError::QueueExhausted { attempts }));
                        stats.exhausted += 1;
                    } else {
                        // The entry waits out its backoff delay before any
                        // later pass gives it another attempt
                        let delay = calculate_delay(&entry.policy, entry.retry_count);
                        if !delay.is_zero() {
                            entry.not_before = Some(tokio::time::Instant::now() + delay);
                        }
                        self.observer.on_attempt_failed(&ctx, &err, delay);
                        self.queue.enqueue(entry);
                        stats.requeued += 1;
                    }
                }
            }

            if !self.pacing.is_zero() && !self.queue.is_empty() {
                tokio::time::sleep(self.pacing).await;
            }
        }

        for entry in waiting {
            self.queue.enqueue(entry);
        }

        tracing::debug!(
            attempted = stats.attempted,
            succeeded = stats.succeeded,
            requeued = stats.requeued,
            deferred = stats.deferred,
            failed = stats.failed,
            exhausted = stats.exhausted,
            "drain pass finished"
        );
        stats
    }
}

struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
