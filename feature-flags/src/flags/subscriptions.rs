use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

pub type WatchCallback = Box<dyn FnMut(bool) + Send>;

struct Watcher {
    key: String,
    last: Option<bool>,
    live: Arc<AtomicBool>,
    callback: Arc<Mutex<WatchCallback>>,
}

/// A callback that is due to run with a newly resolved value.
pub(crate) struct PendingNotification {
    key: String,
    live: Arc<AtomicBool>,
    callback: Arc<Mutex<WatchCallback>>,
    value: bool,
}

impl PendingNotification {
    pub(crate) fn key(&self) -> &str {
        &self.key
    }

    pub(crate) fn deliver(self) {
        // cancelled between collection and delivery
        if !self.live.load(Ordering::SeqCst) {
            return;
        }
        let mut guard = match self.callback.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let callback: &mut WatchCallback = &mut guard;
        callback(self.value);
    }
}

#[derive(Default)]
pub(crate) struct WatcherRegistry {
    next_id: u64,
    watchers: BTreeMap<u64, Watcher>,
}

impl WatcherRegistry {
    pub(crate) fn register(&mut self, key: &str, callback: WatchCallback) -> (u64, Arc<AtomicBool>) {
        let id = self.next_id;
        self.next_id += 1;
        let live = Arc::new(AtomicBool::new(true));
        self.watchers.insert(
            id,
            Watcher {
                key: key.to_string(),
                last: None,
                live: live.clone(),
                callback: Arc::new(Mutex::new(callback)),
            },
        );
        (id, live)
    }

    pub(crate) fn unregister(&mut self, id: u64) {
        self.watchers.remove(&id);
    }

    pub(crate) fn len(&self) -> usize {
        self.watchers.len()
    }

    /// Re-evaluates every watcher and returns the ones whose value changed since the last
    /// pass, in registration order. A watcher that was never evaluated always counts as
    /// changed.
    pub(crate) fn collect_changes<F>(&mut self, resolve: F) -> Vec<PendingNotification>
    where
        F: Fn(&str) -> bool,
    {
        let mut pending = Vec::new();
        for watcher in self.watchers.values_mut() {
            let value = resolve(&watcher.key);
            if watcher.last != Some(value) {
                watcher.last = Some(value);
                pending.push(PendingNotification {
                    key: watcher.key.clone(),
                    live: watcher.live.clone(),
                    callback: watcher.callback.clone(),
                    value,
                });
            }
        }
        pending
    }
}

pub(crate) fn lock_registry(registry: &Mutex<WatcherRegistry>) -> MutexGuard<'_, WatcherRegistry> {
    match registry.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Cancellation handle for a flag watcher. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    key: String,
    live: Arc<AtomicBool>,
    registry: Weak<Mutex<WatcherRegistry>>,
}

impl Subscription {
    pub(crate) fn new(
        id: u64,
        key: &str,
        live: Arc<AtomicBool>,
        registry: Weak<Mutex<WatcherRegistry>>,
    ) -> Self {
        Self {
            id,
            key: key.to_string(),
            live,
            registry,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_active(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.live.store(false, Ordering::SeqCst);
        if let Some(registry) = self.registry.upgrade() {
            lock_registry(&registry).unregister(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("active", &self.is_active())
            .finish()
    }
}
