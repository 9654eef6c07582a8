// Snapshot fan-out to connected subscribers.
// The registry lock is only held to clone the sender list; delivery is a
// non-blocking try_send, so one stuck subscriber never slows the publisher.

use crate::models::Snapshot;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::mpsc;

/// Opaque identity of one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Outcome of one publish.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    /// Subscribers whose buffer was full.
    pub dropped_slow: Vec<SubscriptionId>,
    /// Subscribers whose receiver was already gone.
    pub dropped_closed: Vec<SubscriptionId>,
}

struct Registry {
    latest: Option<Arc<Snapshot>>,
    subscribers: HashMap<SubscriptionId, mpsc::Sender<Arc<Snapshot>>>,
}

struct Inner {
    registry: Mutex<Registry>,
    // Serializes publishers so every subscriber sees one publish order.
    publish_order: Mutex<()>,
    next_id: AtomicU64,
    buffer: usize,
    published_total: AtomicU64,
    dropped_total: AtomicU64,
}

impl Inner {
    fn remove(&self, id: SubscriptionId) -> bool {
        match self.registry.lock() {
            Ok(mut r) => r.subscribers.remove(&id).is_some(),
            Err(poisoned) => poisoned.into_inner().subscribers.remove(&id).is_some(),
        }
    }
}

/// Shared handle to the subscriber registry; clones refer to the same registry.
#[derive(Clone)]
pub struct Broadcaster {
    inner: Arc<Inner>,
}

/// One registered delivery channel. Dropping it unsubscribes.
pub struct Subscription {
    id: SubscriptionId,
    rx: mpsc::Receiver<Arc<Snapshot>>,
    owner: Weak<Inner>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Next snapshot, or `None` once the broadcaster has dropped this subscription.
    pub async fn recv(&mut self) -> Option<Arc<Snapshot>> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Arc<Snapshot>> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.owner.upgrade() {
            inner.remove(self.id);
        }
    }
}

impl Broadcaster {
    /// `buffer` is the number of undelivered snapshots a subscriber may hold
    /// before it is treated as slow and dropped.
    pub fn new(buffer: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: Mutex::new(Registry {
                    latest: None,
                    subscribers: HashMap::new(),
                }),
                publish_order: Mutex::new(()),
                next_id: AtomicU64::new(1),
                buffer: buffer.max(1),
                published_total: AtomicU64::new(0),
                dropped_total: AtomicU64::new(0),
            }),
        }
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.inner
            .registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers a subscriber. The latest snapshot, if any, is already queued.
    pub fn subscribe(&self) -> Subscription {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.inner.buffer);
        {
            let mut registry = self.registry();
            if let Some(latest) = registry.latest.clone() {
                // Fresh channel with capacity >= 1, cannot be full.
                let _ = tx.try_send(latest);
            }
            registry.subscribers.insert(id, tx);
        }
        tracing::debug!(subscription = %id, "subscriber registered");
        Subscription {
            id,
            rx,
            owner: Arc::downgrade(&self.inner),
        }
    }

    /// Removes a subscription. Returns whether it was still registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.inner.remove(id);
        if removed {
            tracing::debug!(subscription = %id, "subscriber removed");
        }
        removed
    }

    /// Stores `snapshot` as latest and pushes it to every subscriber.
    pub fn publish(&self, snapshot: Arc<Snapshot>) -> PublishReport {
        let _order = self
            .inner
            .publish_order
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let targets: Vec<(SubscriptionId, mpsc::Sender<Arc<Snapshot>>)> = {
            let mut registry = self.registry();
            registry.latest = Some(snapshot.clone());
            registry
                .subscribers
                .iter()
                .map(|(id, tx)| (*id, tx.clone()))
                .collect()
        };

        let mut report = PublishReport::default();
        for (id, tx) in targets {
            match tx.try_send(snapshot.clone()) {
                Ok(()) => report.delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => report.dropped_slow.push(id),
                Err(mpsc::error::TrySendError::Closed(_)) => report.dropped_closed.push(id),
            }
        }

        if !report.dropped_slow.is_empty() || !report.dropped_closed.is_empty() {
            let mut registry = self.registry();
            for id in report.dropped_slow.iter().chain(report.dropped_closed.iter()) {
                registry.subscribers.remove(id);
            }
        }
        for id in &report.dropped_slow {
            tracing::warn!(subscription = %id, "subscriber too slow, dropping");
        }
        self.inner.published_total.fetch_add(1, Ordering::Relaxed);
        self.inner.dropped_total.fetch_add(
            (report.dropped_slow.len() + report.dropped_closed.len()) as u64,
            Ordering::Relaxed,
        );
        report
    }

    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.registry().latest.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry().subscribers.len()
    }

    pub fn published_total(&self) -> u64 {
        self.inner.published_total.load(Ordering::Relaxed)
    }

    pub fn dropped_total(&self) -> u64 {
        self.inner.dropped_total.load(Ordering::Relaxed)
    }
}
