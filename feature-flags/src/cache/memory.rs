use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::cache::{Clock, SystemClock, TtlCache};
use crate::errors::CacheError;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: DateTime<Utc>,
}

/// In-process TTL store. Expired entries are dropped when they are read and swept on every
/// write.
pub struct MemoryTtlCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl Default for MemoryTtlCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTtlCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.lock_entries()
            .values()
            .filter(|entry| entry.expires_at > now)
            .count()
    }

    /// Number of entries held, expired or not.
    #[cfg(test)]
    fn stored(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TtlCache for MemoryTtlCache {
    fn add(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| CacheError::InvalidConfiguration(format!("ttl out of range: {e}")))?;
        let now = self.clock.now();
        let mut entries = self.lock_entries();
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(
            key.to_owned(),
            CacheEntry {
                value,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = self.clock.now();
        let mut entries = self.lock_entries();
        match entries.get(key) {
            Some(entry) if entry.expires_at > now => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.lock_entries().remove(key);
        Ok(())
    }

    fn remove_prefix(&self, prefix: &str) -> Result<(), CacheError> {
        let now = self.clock.now();
        self.lock_entries()
            .retain(|key, entry| entry.expires_at > now && !key.starts_with(prefix));
        Ok(())
    }
}
