//! Generic time-expiring key/value store used to persist flag overrides.
//!
//! Backends only have to honour the TTL passed to `add`; callers never see an entry past
//! its expiration. Values are opaque strings, encoding is the caller's concern.

pub mod memory;
pub mod redis_cache;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::{CacheBackend, Config};
use crate::errors::CacheError;

pub use self::memory::MemoryTtlCache;
pub use self::redis_cache::RedisTtlCache;

pub trait TtlCache {
    /// Stores `value` under `key`, replacing any previous entry and restarting its TTL.
    fn add(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    /// Returns `None` for keys that were never written, were removed, or have expired.
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), CacheError>;

    /// Removes every entry whose key starts with `prefix`.
    fn remove_prefix(&self, prefix: &str) -> Result<(), CacheError>;
}

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Builds the backing store selected by `CACHE_BACKEND`.
pub fn from_config(config: &Config) -> Result<Arc<dyn TtlCache + Send + Sync>, CacheError> {
    let cache: Arc<dyn TtlCache + Send + Sync> = match config.cache_backend {
        CacheBackend::Memory => Arc::new(MemoryTtlCache::new()),
        CacheBackend::Redis => Arc::new(RedisTtlCache::new(
            config.redis_url.clone(),
            config.cache_name.clone(),
            config.redis_timeout(),
        )?),
    };
    Ok(cache)
}
