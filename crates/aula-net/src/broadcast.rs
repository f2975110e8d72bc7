//! Generic fan-out notification hub
//!
//! Used by the network monitor (status changes) and the queue processor
//! (queue composition changes) to push updates to interested observers.
//! Publishing iterates a snapshot of the subscriber list, so subscribing or
//! unsubscribing from inside a callback cannot corrupt delivery.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Registry<T> {
    listeners: Mutex<Vec<(u64, Listener<T>)>>,
    next_id: AtomicU64,
}

impl<T> Registry<T> {
    fn remove(&self, id: u64) {
        let mut listeners = self.listeners.lock().expect("listener registry poisoned");
        listeners.retain(|(listener_id, _)| *listener_id != id);
    }
}

/// Fan-out publisher for values of type `T`
pub struct Broadcaster<T> {
    registry: Arc<Registry<T>>,
}

impl<T: 'static> Default for Broadcaster<T> {
    fn default() -> Self {
        Self::new()
    }
}

// 'static because subscriptions hold a boxed remover capturing a
// Weak<Registry<T>>
impl<T: 'static> Broadcaster<T> {
    /// Create a broadcaster with no subscribers
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry {
                listeners: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Register a listener, returning its subscription handle
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::SeqCst);
        {
            let mut listeners = self
                .registry
                .listeners
                .lock()
                .expect("listener registry poisoned");
            listeners.push((id, Arc::new(listener)));
        }

        let registry = Arc::downgrade(&self.registry);
        Subscription {
            id,
            active: AtomicBool::new(true),
            remove: Box::new(move |id| {
                if let Some(registry) = Weak::upgrade(&registry) {
                    registry.remove(id);
                }
            }),
        }
    }

    /// Deliver a value to every current subscriber
    ///
    /// The subscriber list is snapshotted before iteration. A panicking
    /// listener is logged and skipped; delivery to the rest continues.
    pub fn publish(&self, value: &T) {
        let snapshot: Vec<Listener<T>> = {
            let listeners = self
                .registry
                .listeners
                .lock()
                .expect("listener registry poisoned");
            listeners.iter().map(|(_, l)| Arc::clone(l)).collect()
        };

        for listener in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(value))).is_err() {
                tracing::warn!("subscriber panicked during publish, skipping");
            }
        }
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.registry
            .listeners
            .lock()
            .expect("listener registry poisoned")
            .len()
    }
}

impl<T> Clone for Broadcaster<T> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

/// Handle for a registered listener
///
/// Unsubscribing is idempotent; dropping the handle unsubscribes too.
pub struct Subscription {
    id: u64,
    active: AtomicBool,
    remove: Box<dyn Fn(u64) + Send + Sync>,
}

impl Subscription {
    /// Remove the listener; calling more than once is a no-op
    pub fn unsubscribe(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            (self.remove)(self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.active.load(Ordering::SeqCst))
            .finish()
    }
}
