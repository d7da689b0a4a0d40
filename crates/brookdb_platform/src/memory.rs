//! Memory-pressure alerts.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Severity of a memory alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryAlertLevel {
    /// The system is under moderate memory pressure.
    Warn,
    /// The process is at risk of termination.
    Critical,
}

/// Callback receiving memory alerts. May fire on any thread.
pub type MemoryAlertCallback = Arc<dyn Fn(MemoryAlertLevel) + Send + Sync>;

/// Handle to an active alert subscription.
pub trait MemoryAlertHandle: Send + Sync {
    /// Cancels the subscription; no further alerts are delivered.
    fn cancel(&self);
}

/// Host-provided source of memory alerts.
pub trait MemoryAlertSource: Send + Sync {
    /// Subscribes `callback` to alerts until the returned handle is
    /// cancelled.
    fn subscribe(&self, callback: MemoryAlertCallback) -> Arc<dyn MemoryAlertHandle>;
}

struct MockSubscription {
    id: u64,
    source: Arc<MockMemoryAlertSourceInner>,
}

impl MemoryAlertHandle for MockSubscription {
    fn cancel(&self) {
        self.source
            .subscribers
            .lock()
            .retain(|(id, _)| *id != self.id);
    }
}

#[derive(Default)]
struct MockMemoryAlertSourceInner {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<(u64, MemoryAlertCallback)>>,
}

/// A manually-driven alert source for tests.
#[derive(Default)]
pub struct MockMemoryAlertSource {
    inner: Arc<MockMemoryAlertSourceInner>,
}

impl MockMemoryAlertSource {
    /// Creates a source with no subscribers.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Delivers `level` to every live subscriber.
    pub fn raise(&self, level: MemoryAlertLevel) {
        let subscribers = self.inner.subscribers.lock().clone();
        for (_, callback) in subscribers {
            callback(level);
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }
}

impl MemoryAlertSource for MockMemoryAlertSource {
    fn subscribe(&self, callback: MemoryAlertCallback) -> Arc<dyn MemoryAlertHandle> {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        self.inner.subscribers.lock().push((id, callback));
        Arc::new(MockSubscription {
            id,
            source: Arc::clone(&self.inner),
        })
    }
}
