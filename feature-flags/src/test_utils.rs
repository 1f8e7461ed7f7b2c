use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use rand::{distributions::Alphanumeric, Rng};
use serde_json::json;

use crate::cache::{Clock, MemoryTtlCache, TtlCache};
use crate::errors::CacheError;
use crate::flags::environment_gate::{EnvironmentGate, RestrictedFlags};
use crate::flags::flag_models::{ServerFlagRecord, ServerPayload};
use crate::flags::flag_resolver::FlagResolver;
use crate::flags::overrides::OverrideCache;

pub const TEST_APP_NAME: &str = "test-app";

pub fn random_string(prefix: &str, length: usize) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(Alphanumeric)
        .take(length)
        .map(char::from)
        .collect();
    format!("{}{}", prefix, suffix)
}

/// A clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        let start = Utc
            .with_ymd_and_hms(2024, 1, 1, 12, 0, 0)
            .single()
            .unwrap_or_else(Utc::now);
        Self::starting_at(start)
    }
}

impl ManualClock {
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    fn lock_now(&self) -> MutexGuard<'_, DateTime<Utc>> {
        match self.now.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn advance(&self, by: Duration) {
        let by = chrono::Duration::from_std(by).unwrap_or_else(|_| chrono::Duration::zero());
        let mut now = self.lock_now();
        if let Some(next) = now.checked_add_signed(by) {
            *now = next;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.lock_now()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCacheCall {
    Add { key: String, value: String, ttl: Duration },
    Get { key: String },
    Remove { key: String },
    RemovePrefix { prefix: String },
}

/// In-memory cache that records every call and can be switched into a failing state to
/// simulate an unavailable backing store.
#[derive(Clone)]
pub struct MockTtlCache {
    inner: Arc<MemoryTtlCache>,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
    calls: Arc<Mutex<Vec<MockCacheCall>>>,
}

impl Default for MockTtlCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTtlCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(ManualClock::default()))
    }

    pub fn with_clock(clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self {
            inner: Arc::new(MemoryTtlCache::with_clock(clock)),
            fail_reads: Arc::new(AtomicBool::new(false)),
            fail_writes: Arc::new(AtomicBool::new(false)),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn lock_calls(&self) -> MutexGuard<'_, Vec<MockCacheCall>> {
        match self.calls.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn fail_reads(&self, fail: bool) -> Self {
        self.fail_reads.store(fail, Ordering::SeqCst);
        self.clone()
    }

    pub fn fail_writes(&self, fail: bool) -> Self {
        self.fail_writes.store(fail, Ordering::SeqCst);
        self.clone()
    }

    pub fn get_calls(&self) -> Vec<MockCacheCall> {
        self.lock_calls().clone()
    }

    /// Reads straight from the underlying store without recording a call.
    pub fn peek(&self, key: &str) -> Option<String> {
        self.inner.get(key).ok().flatten()
    }

    fn check(&self, flag: &AtomicBool) -> Result<(), CacheError> {
        if flag.load(Ordering::SeqCst) {
            Err(CacheError::Unavailable("mock cache offline".to_string()))
        } else {
            Ok(())
        }
    }
}

impl TtlCache for MockTtlCache {
    fn add(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        self.lock_calls().push(MockCacheCall::Add {
            key: key.to_owned(),
            value: value.clone(),
            ttl,
        });
        self.check(&self.fail_writes)?;
        self.inner.add(key, value, ttl)
    }

    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.lock_calls().push(MockCacheCall::Get {
            key: key.to_owned(),
        });
        self.check(&self.fail_reads)?;
        self.inner.get(key)
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.lock_calls().push(MockCacheCall::Remove {
            key: key.to_owned(),
        });
        self.check(&self.fail_writes)?;
        self.inner.remove(key)
    }

    fn remove_prefix(&self, prefix: &str) -> Result<(), CacheError> {
        self.lock_calls().push(MockCacheCall::RemovePrefix {
            prefix: prefix.to_owned(),
        });
        self.check(&self.fail_writes)?;
        self.inner.remove_prefix(prefix)
    }
}

pub fn flag_record(key: &str, active: bool) -> ServerFlagRecord {
    ServerFlagRecord {
        key: key.to_string(),
        active,
        name: None,
        description: None,
    }
}

pub fn payload_from(flags: &[(&str, bool)]) -> ServerPayload {
    ServerPayload::from(
        flags
            .iter()
            .map(|(key, active)| flag_record(key, *active))
            .collect::<Vec<_>>(),
    )
}

pub fn sample_flags_json() -> serde_json::Value {
    json!({
        "data": [
            {"key": "new-dashboard", "name": "New dashboard", "description": "Redesigned home", "active": true},
            {"key": "beta-export", "active": false},
            {"key": "shapeshift", "name": "ShapeShift", "active": true}
        ]
    })
}

pub fn setup_gate(environment: &str) -> EnvironmentGate {
    let restricted: RestrictedFlags = "shapeshift:production".parse().unwrap_or_default();
    EnvironmentGate::new(environment, restricted)
}

/// Resolver over a mock cache, running in `environment`, namespaced under `TEST_APP_NAME`.
pub fn setup_resolver(environment: &str) -> (Arc<FlagResolver>, MockTtlCache, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::default());
    let cache = MockTtlCache::with_clock(clock.clone());
    let overrides = OverrideCache::new(Arc::new(cache.clone()), TEST_APP_NAME);
    let resolver = FlagResolver::new(overrides, setup_gate(environment));
    (Arc::new(resolver), cache, clock)
}
