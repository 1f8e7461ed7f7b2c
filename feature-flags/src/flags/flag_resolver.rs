use std::collections::HashMap;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::instrument;

use crate::cache::TtlCache;
use crate::config::Config;
use crate::errors::FlagError;
use crate::flags::environment_gate::EnvironmentGate;
use crate::flags::flag_models::{Flag, RefreshOutcome, ServerPayload};
use crate::flags::flag_source::FlagSource;
use crate::flags::overrides::OverrideCache;
use crate::flags::subscriptions::{lock_registry, Subscription, WatchCallback, WatcherRegistry};

// Watchers that keep flipping flags from inside their callbacks are cut off after this
// many passes.
const MAX_DIGEST_PASSES: usize = 10;

// Releases the digest flag however the digest ends, unwinding included.
struct DigestGuard<'a>(&'a AtomicBool);

impl Drop for DigestGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
struct ResolverState {
    // last server-declared value per key, replaced wholesale on every refresh
    server: HashMap<String, bool>,
    flags: Vec<Flag>,
}

/// Resolves flags from three layers: the environment gate, then a live local override,
/// then the last server-declared value. Unknown keys resolve to `false`.
///
/// The resolver is an owned value shared by reference (usually an `Arc`), never a global.
pub struct FlagResolver {
    state: RwLock<ResolverState>,
    overrides: OverrideCache,
    gate: EnvironmentGate,
    watchers: Arc<Mutex<WatcherRegistry>>,
    digesting: AtomicBool,
    dirty: AtomicBool,
}

impl FlagResolver {
    pub fn new(overrides: OverrideCache, gate: EnvironmentGate) -> Self {
        Self {
            state: RwLock::new(ResolverState::default()),
            overrides,
            gate,
            watchers: Arc::new(Mutex::new(WatcherRegistry::default())),
            digesting: AtomicBool::new(false),
            dirty: AtomicBool::new(false),
        }
    }

    pub fn from_config(config: &Config, cache: Arc<dyn TtlCache + Send + Sync>) -> Self {
        let overrides = OverrideCache::with_ttl(cache, &config.app_name, config.override_ttl());
        Self::new(overrides, EnvironmentGate::from_config(config))
    }

    fn read_state(&self) -> RwLockReadGuard<'_, ResolverState> {
        match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, ResolverState> {
        match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn resolve_with(&self, key: &str, server: &HashMap<String, bool>) -> bool {
        if !self.gate.allows(key) {
            tracing::debug!(key = %key, environment = %self.gate.environment(), "flag gated off in this environment");
            return false;
        }
        match self.overrides.get(key) {
            Some(value) => value,
            None => server.get(key).copied().unwrap_or(false),
        }
    }

    /// Replaces the server state and the flag sequence with the given payload. Malformed
    /// records are skipped and reported in the outcome; the rest still apply.
    #[instrument(skip_all)]
    pub fn set_from_server(&self, payload: impl Into<ServerPayload>) -> RefreshOutcome {
        let (records, skipped) = payload.into().into_records();
        for error in &skipped {
            tracing::warn!(error = %error, "skipping flag record");
        }

        let server: HashMap<String, bool> = records
            .iter()
            .map(|record| (record.key.clone(), record.active))
            .collect();

        let flags: Vec<Flag> = records
            .into_iter()
            .map(|record| Flag {
                active: self.resolve_with(&record.key, &server),
                key: record.key,
                name: record.name,
                description: record.description,
            })
            .collect();

        {
            let mut state = self.write_state();
            state.server = server;
            state.flags = flags.clone();
        }
        tracing::info!(
            flags = flags.len(),
            skipped = skipped.len(),
            "updated flags from server"
        );

        self.digest();
        RefreshOutcome { flags, skipped }
    }

    /// Waits for a pending fetch and applies its result. Until the fetch settles the
    /// previous flags stay in place; a failed fetch leaves them untouched.
    pub async fn set_from_future<F, E>(&self, fetch: F) -> Result<RefreshOutcome, FlagError>
    where
        F: Future<Output = Result<ServerPayload, E>>,
        E: std::fmt::Display,
    {
        match fetch.await {
            Ok(payload) => Ok(self.set_from_server(payload)),
            Err(e) => {
                tracing::warn!(error = %e, "flag fetch failed, keeping previous flags");
                Err(FlagError::FetchFailed(e.to_string()))
            }
        }
    }

    pub async fn refresh_from(
        &self,
        source: &(dyn FlagSource + Send + Sync),
    ) -> Result<RefreshOutcome, FlagError> {
        self.set_from_future(source.fetch()).await
    }

    pub fn resolve(&self, key: &str) -> bool {
        let state = self.read_state();
        self.resolve_with(key, &state.server)
    }

    pub fn is_on(&self, key: &str) -> bool {
        self.resolve(key)
    }

    /// Whether a live override exists, regardless of the environment gate.
    pub fn is_overridden(&self, key: &str) -> bool {
        self.overrides.is_present(key)
    }

    pub fn server_value(&self, key: &str) -> Option<bool> {
        self.read_state().server.get(key).copied()
    }

    pub fn enable(&self, key: &str) {
        self.set_override(key, true);
    }

    pub fn disable(&self, key: &str) {
        self.set_override(key, false);
    }

    fn set_override(&self, key: &str, value: bool) {
        self.set_snapshot(key, value);
        self.overrides.set(key, value);
        tracing::debug!(key = %key, value, "flag overridden");
        self.digest();
    }

    /// Drops the override and puts the flag back on its server value.
    pub fn reset(&self, key: &str) {
        let server_value = self.server_value(key).unwrap_or(false);
        self.set_snapshot(key, server_value);
        self.overrides.remove(key);
        tracing::debug!(key = %key, "flag override reset");
        self.digest();
    }

    /// Drops every override of this application and re-resolves all flags.
    pub fn reset_all(&self) {
        self.overrides.clear();
        {
            let mut state = self.write_state();
            let ResolverState { server, flags } = &mut *state;
            for flag in flags.iter_mut() {
                flag.active = self.resolve_with(&flag.key, server);
            }
        }
        tracing::info!("all flag overrides reset");
        self.digest();
    }

    // Keys not in the current sequence only get their override written; they show up once
    // a refresh declares them.
    fn set_snapshot(&self, key: &str, active: bool) {
        let mut state = self.write_state();
        for flag in state.flags.iter_mut().filter(|flag| flag.key == key) {
            flag.active = active;
        }
    }

    /// Snapshot of the current flag sequence, in server order.
    pub fn get_all(&self) -> Vec<Flag> {
        self.read_state().flags.clone()
    }

    pub fn get(&self, key: &str) -> Option<Flag> {
        self.read_state()
            .flags
            .iter()
            .find(|flag| flag.key == key)
            .cloned()
    }

    /// Watches the resolved value of `key`. The callback runs once right away and then
    /// every time the value changes. Dropping the returned handle unsubscribes.
    pub fn subscribe<F>(&self, key: &str, callback: F) -> Subscription
    where
        F: FnMut(bool) + Send + 'static,
    {
        let boxed: WatchCallback = Box::new(callback);
        let (id, live) = lock_registry(&self.watchers).register(key, boxed);
        let subscription = Subscription::new(id, key, live, Arc::downgrade(&self.watchers));
        self.digest();
        subscription
    }

    pub fn watcher_count(&self) -> usize {
        lock_registry(&self.watchers).len()
    }

    /// Re-evaluates every watcher and notifies those whose value changed. Runs after each
    /// mutation; hosts also call it from their own loop so that expired overrides surface.
    ///
    /// A digest requested while another one runs, from a callback or another thread, is
    /// folded into the running one. A panicking watcher is logged and skipped.
    pub fn digest(&self) {
        loop {
            if self.digesting.swap(true, Ordering::SeqCst) {
                self.dirty.store(true, Ordering::SeqCst);
                return;
            }
            {
                let _guard = DigestGuard(&self.digesting);
                self.run_digest_passes();
            }
            // a request flagged after the last pass but before the release above
            if !self.dirty.load(Ordering::SeqCst) {
                return;
            }
        }
    }

    fn run_digest_passes(&self) {
        let mut passes = 0;
        loop {
            self.dirty.store(false, Ordering::SeqCst);
            let pending = lock_registry(&self.watchers).collect_changes(|key| self.resolve(key));
            for notification in pending {
                let key = notification.key().to_string();
                if catch_unwind(AssertUnwindSafe(|| notification.deliver())).is_err() {
                    tracing::error!(key = %key, "flag watcher panicked");
                }
            }

            passes += 1;
            if !self.dirty.load(Ordering::SeqCst) {
                return;
            }
            if passes >= MAX_DIGEST_PASSES {
                tracing::warn!(passes, "flag watchers did not settle, giving up");
                self.dirty.store(false, Ordering::SeqCst);
                return;
            }
        }
    }
}
