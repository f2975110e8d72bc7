//! Network condition tracking
//!
//! The monitor holds the authoritative [`NetworkStatus`] snapshot and fans
//! out changes two ways: synchronous callbacks through a [`Broadcaster`] and
//! a `tokio::sync::watch` channel for async consumers like the queue
//! processor. Connectivity reports come from the embedding platform; the
//! monitor itself never probes the network.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::broadcast::{Broadcaster, Subscription};
use crate::types::{ConnectionQuality, EffectiveType, NetworkStatus};

/// Connection metadata as reported by the embedding platform
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ConnectionInfo {
    pub effective_type: Option<EffectiveType>,
    pub downlink_mbps: Option<f64>,
    pub rtt_ms: Option<u32>,
    pub save_data: Option<bool>,
}

struct MonitorInner {
    status: RwLock<NetworkStatus>,
    broadcaster: Broadcaster<NetworkStatus>,
    watch_tx: watch::Sender<NetworkStatus>,
}

/// Tracks network conditions and notifies subscribers on change
///
/// Clones share state; cloning is how the monitor is handed to the queue
/// processor and the client at the same time.
#[derive(Clone)]
pub struct NetworkMonitor {
    inner: Arc<MonitorInner>,
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkMonitor {
    /// Create a monitor assuming connectivity
    pub fn new() -> Self {
        Self::with_status(NetworkStatus::online())
    }

    /// Create a monitor with a known initial status
    pub fn with_status(initial: NetworkStatus) -> Self {
        let (watch_tx, _) = watch::channel(initial.clone());
        Self {
            inner: Arc::new(MonitorInner {
                status: RwLock::new(initial),
                broadcaster: Broadcaster::new(),
                watch_tx,
            }),
        }
    }

    /// The current status snapshot
    pub fn status(&self) -> NetworkStatus {
        self.inner
            .status
            .read()
            .expect("status lock poisoned")
            .clone()
    }

    /// Whether the network is currently reachable
    pub fn is_online(&self) -> bool {
        self.inner
            .status
            .read()
            .expect("status lock poisoned")
            .is_online
    }

    /// Qualitative classification of the current conditions
    pub fn quality(&self) -> ConnectionQuality {
        self.status().quality()
    }

    /// Replace the status snapshot
    ///
    /// No-op when the report matches the current snapshot, so platforms that
    /// re-fire unchanged events do not wake subscribers.
    pub fn set_status(&self, status: NetworkStatus) {
        {
            let mut current = self.inner.status.write().expect("status lock poisoned");
            if *current == status {
                return;
            }
            if current.is_online != status.is_online {
                if status.is_online {
                    tracing::info!(quality = ?status.quality(), "network restored");
                } else {
                    tracing::info!("network lost");
                }
            } else {
                tracing::debug!(quality = ?status.quality(), "network conditions changed");
            }
            *current = status.clone();
        }

        self.inner.broadcaster.publish(&status);
        // Receivers may all be gone; that only means nobody is watching
        let _ = self.inner.watch_tx.send(status);
    }

    /// Report that connectivity was regained, keeping no metadata
    pub fn report_online(&self) {
        self.set_status(NetworkStatus::online());
    }

    /// Report that connectivity was lost
    pub fn report_offline(&self) {
        self.set_status(NetworkStatus::offline());
    }

    /// Merge fresh connection metadata into the current snapshot
    ///
    /// Connectivity itself is untouched; a metadata report while offline
    /// does not imply the network came back.
    pub fn update_connection(&self, info: ConnectionInfo) {
        let mut status = self.status();
        status.effective_type = info.effective_type;
        status.downlink_mbps = info.downlink_mbps;
        status.rtt_ms = info.rtt_ms;
        status.save_data = info.save_data;
        self.set_status(status);
    }

    /// Register a status listener
    ///
    /// The listener is invoked immediately with the current snapshot, then on
    /// every change until the subscription is dropped.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&NetworkStatus) + Send + Sync + 'static,
    {
        let listener = Arc::new(listener);
        let forward = Arc::clone(&listener);
        let subscription = self
            .inner
            .broadcaster
            .subscribe(move |status: &NetworkStatus| (*forward)(status));
        // Initial delivery goes to the new listener only; a panic here is
        // contained the same way publish contains it
        let current = self.status();
        if catch_unwind(AssertUnwindSafe(|| (*listener)(&current))).is_err() {
            tracing::warn!("subscriber panicked during initial delivery, skipping");
        }
        subscription
    }

    /// A watch receiver that yields every status change
    pub fn watch(&self) -> watch::Receiver<NetworkStatus> {
        self.inner.watch_tx.subscribe()
    }

    /// Number of callback subscribers
    pub fn subscriber_count(&self) -> usize {
        self.inner.broadcaster.subscriber_count()
    }
}

/// Async observer of network status changes
#[async_trait]
pub trait NetworkObserver: Send + Sync {
    /// Called after the monitor accepts a changed status
    async fn on_status_change(&self, status: NetworkStatus);
}

/// Forward status changes to an async observer on a background task
///
/// The task ends when the monitor is dropped. The handle can be aborted to
/// detach early.
pub fn drive_observer(
    monitor: &NetworkMonitor,
    observer: Arc<dyn NetworkObserver>,
) -> JoinHandle<()> {
    let mut rx = monitor.watch();
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let status = rx.borrow_and_update().clone();
            observer.on_status_change(status).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EffectiveType;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    #[test]
    fn starts_online_by_default() {
        let monitor = NetworkMonitor::new();
        assert!(monitor.is_online());
        assert_eq!(monitor.quality(), ConnectionQuality::Good);
    }

    #[test]
    fn subscribe_delivers_current_status_immediately() {
        let monitor = NetworkMonitor::with_status(NetworkStatus::offline());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_clone = seen.clone();
        let _sub = monitor.subscribe(move |status| {
            seen_clone.lock().unwrap().push(status.is_online);
        });

        assert_eq!(seen.lock().unwrap().as_slice(), &[false]);
    }

    #[test]
    fn change_notifies_subscribers() {
        let monitor = NetworkMonitor::new();
        let transitions = Arc::new(Mutex::new(Vec::new()));

        let transitions_clone = transitions.clone();
        let _sub = monitor.subscribe(move |status| {
            transitions_clone.lock().unwrap().push(status.is_online);
        });

        monitor.report_offline();
        monitor.report_online();

        assert_eq!(transitions.lock().unwrap().as_slice(), &[true, false, true]);
    }

    #[test]
    fn duplicate_reports_are_swallowed() {
        let monitor = NetworkMonitor::new();
        let hits = Arc::new(AtomicU32::new(0));

        let hits_clone = hits.clone();
        let _sub = monitor.subscribe(move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hits.load(Ordering::SeqCst), 1, "initial delivery only");

        monitor.report_online();
        monitor.report_online();
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        monitor.report_offline();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn late_subscriber_does_not_renotify_earlier_ones() {
        let monitor = NetworkMonitor::new();
        let first_hits = Arc::new(AtomicU32::new(0));

        let first_clone = first_hits.clone();
        let _first = monitor.subscribe(move |_| {
            first_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(first_hits.load(Ordering::SeqCst), 1);

        let second_hits = Arc::new(AtomicU32::new(0));
        let second_clone = second_hits.clone();
        let _second = monitor.subscribe(move |_| {
            second_clone.fetch_add(1, Ordering::SeqCst);
        });

        // The snapshot went to the new listener only
        assert_eq!(first_hits.load(Ordering::SeqCst), 1);
        assert_eq!(second_hits.load(Ordering::SeqCst), 1);

        monitor.report_offline();
        assert_eq!(first_hits.load(Ordering::SeqCst), 2);
        assert_eq!(second_hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn connection_report_keeps_connectivity() {
        let monitor = NetworkMonitor::with_status(NetworkStatus::offline());
        monitor.update_connection(ConnectionInfo {
            effective_type: Some(EffectiveType::ThreeG),
            downlink_mbps: Some(2.5),
            rtt_ms: Some(200),
            save_data: None,
        });

        let status = monitor.status();
        assert!(!status.is_online, "metadata alone does not flip online");
        assert_eq!(status.effective_type, Some(EffectiveType::ThreeG));
        assert_eq!(monitor.quality(), ConnectionQuality::Offline);

        monitor.set_status(NetworkStatus {
            is_online: true,
            ..monitor.status()
        });
        assert_eq!(monitor.quality(), ConnectionQuality::Good);
    }

    #[test]
    fn metadata_change_counts_as_change() {
        let monitor = NetworkMonitor::new();
        let hits = Arc::new(AtomicU32::new(0));

        let hits_clone = hits.clone();
        let _sub = monitor.subscribe(move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });

        let mut status = NetworkStatus::online();
        status.effective_type = Some(EffectiveType::TwoG);
        monitor.set_status(status.clone());

        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(monitor.quality(), ConnectionQuality::Poor);
        assert!(monitor.status().is_slow());
    }

    #[tokio::test]
    async fn watch_channel_sees_transitions() {
        let monitor = NetworkMonitor::new();
        let mut rx = monitor.watch();

        monitor.report_offline();
        rx.changed().await.unwrap();
        assert!(!rx.borrow_and_update().is_online);

        monitor.report_online();
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_online);
    }

    #[tokio::test]
    async fn async_observer_is_driven() {
        struct Recorder(Mutex<Vec<bool>>, tokio::sync::Notify);

        #[async_trait]
        impl NetworkObserver for Recorder {
            async fn on_status_change(&self, status: NetworkStatus) {
                self.0.lock().unwrap().push(status.is_online);
                self.1.notify_one();
            }
        }

        let monitor = NetworkMonitor::new();
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new()), tokio::sync::Notify::new()));
        let handle = drive_observer(&monitor, recorder.clone());

        monitor.report_offline();
        recorder.1.notified().await;
        assert_eq!(recorder.0.lock().unwrap().as_slice(), &[false]);

        handle.abort();
    }
}
