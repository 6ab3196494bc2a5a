use kubert::index::{
    ClusterRemoved, IndexClusterResource, IndexNamespacedResource, NamespacedRemoved,
};
use parking_lot::RwLock;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use tokio::sync::watch;

/// Reports whether every registered watch has applied its initial listing.
///
/// Readiness is monotonic: once every watch has synced, the gate stays ready even if a watch later
/// restarts and relists. A gate with no registered watches never becomes ready, so all watches
/// must be registered before any of them is spawned.
#[derive(Clone, Debug)]
pub struct SyncGate(Arc<Inner>);

/// Marks a single watch as synced on its owning [`SyncGate`].
#[derive(Debug)]
pub struct Synced {
    gate: SyncGate,
    name: &'static str,
    done: bool,
}

/// Wraps a shared index, marking its watch as synced once the initial listing has been applied.
///
/// kubert buffers a watch's initial listing and applies it with a single `reset`, so the watch is
/// only marked after that `reset` has written every listed resource to the index.
#[derive(Debug)]
pub struct Tracked<T> {
    inner: Arc<RwLock<T>>,
    synced: Synced,
}

#[derive(Debug)]
struct Inner {
    registered: AtomicUsize,
    pending: AtomicUsize,
    ready: watch::Sender<bool>,
}

// === impl SyncGate ===

impl Default for SyncGate {
    fn default() -> Self {
        let (ready, _) = watch::channel(false);
        Self(Arc::new(Inner {
            registered: AtomicUsize::new(0),
            pending: AtomicUsize::new(0),
            ready,
        }))
    }
}

impl SyncGate {
    pub fn register(&self, name: &'static str) -> Synced {
        self.0.registered.fetch_add(1, Ordering::AcqRel);
        self.0.pending.fetch_add(1, Ordering::AcqRel);
        tracing::debug!(watch = name, "registered");
        Synced {
            gate: self.clone(),
            name,
            done: false,
        }
    }

    pub fn is_ready(&self) -> bool {
        *self.0.ready.borrow()
    }

    /// Completes once the gate is ready.
    pub async fn ready(&self) {
        let mut rx = self.0.ready.subscribe();
        // The sender is owned by the gate, so the channel cannot close while `self` is borrowed.
        let _ = rx.wait_for(|ready| *ready).await;
    }

    /// The number of registered watches that have not yet synced.
    pub fn pending(&self) -> usize {
        self.0.pending.load(Ordering::Acquire)
    }

    pub fn registered(&self) -> usize {
        self.0.registered.load(Ordering::Acquire)
    }
}

// === impl Synced ===

impl Synced {
    /// Marks the watch as synced. Subsequent calls have no effect.
    pub fn mark(&mut self) {
        if std::mem::replace(&mut self.done, true) {
            return;
        }

        tracing::debug!(watch = self.name, "synced");
        if self.gate.0.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.gate.0.ready.send_replace(true);
        }
    }
}

// === impl Tracked ===

impl<T> Tracked<T> {
    pub fn new(inner: Arc<RwLock<T>>, synced: Synced) -> Self {
        Self { inner, synced }
    }

    pub fn shared(self) -> Arc<RwLock<Self>> {
        Arc::new(RwLock::new(self))
    }
}

impl<T, R> IndexNamespacedResource<R> for Tracked<T>
where
    T: IndexNamespacedResource<R>,
{
    fn apply(&mut self, resource: R) {
        self.inner.write().apply(resource);
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.inner.write().delete(namespace, name);
    }

    fn reset(&mut self, resources: Vec<R>, removed: NamespacedRemoved) {
        self.inner.write().reset(resources, removed);
        self.synced.mark();
    }
}

impl<T, R> IndexClusterResource<R> for Tracked<T>
where
    T: IndexClusterResource<R>,
{
    fn apply(&mut self, resource: R) {
        self.inner.write().apply(resource);
    }

    fn delete(&mut self, name: String) {
        self.inner.write().delete(name);
    }

    fn reset(&mut self, resources: Vec<R>, removed: ClusterRemoved) {
        self.inner.write().reset(resources, removed);
        self.synced.mark();
    }
}
