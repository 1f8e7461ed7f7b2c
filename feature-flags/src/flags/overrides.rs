use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::TtlCache;

pub const OVERRIDE_KEY_PREFIX: &str = "featureFlags";
pub const DEFAULT_OVERRIDE_TTL: Duration = Duration::from_secs(60 * 60);

/// Locally persisted, time-limited flag overrides for one application.
///
/// Keys are stored as `featureFlags.<app_name>.<flag_key>`. The backing store is best
/// effort: a failing read is reported as "no override" and a failing write is dropped, so
/// flag resolution never blocks on it.
pub struct OverrideCache {
    cache: Arc<dyn TtlCache + Send + Sync>,
    prefix: String,
    ttl: Duration,
}

impl OverrideCache {
    pub fn new(cache: Arc<dyn TtlCache + Send + Sync>, app_name: &str) -> Self {
        Self::with_ttl(cache, app_name, DEFAULT_OVERRIDE_TTL)
    }

    pub fn with_ttl(cache: Arc<dyn TtlCache + Send + Sync>, app_name: &str, ttl: Duration) -> Self {
        Self {
            cache,
            prefix: format!("{OVERRIDE_KEY_PREFIX}.{app_name}."),
            ttl,
        }
    }

    pub fn prefixed_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn set(&self, key: &str, value: bool) {
        let prefixed = self.prefixed_key(key);
        if let Err(e) = self.cache.add(&prefixed, value.to_string(), self.ttl) {
            tracing::warn!(key = %prefixed, error = %e, "dropping flag override write");
        }
    }

    pub fn set_many(&self, overrides: &HashMap<String, bool>) {
        for (key, value) in overrides {
            self.set(key, *value);
        }
    }

    /// `None` when there is no live override, which is not the same as `Some(false)`.
    pub fn get(&self, key: &str) -> Option<bool> {
        let prefixed = self.prefixed_key(key);
        let raw = match self.cache.get(&prefixed) {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(key = %prefixed, error = %e, "flag override read failed, treating as absent");
                return None;
            }
        };

        match raw.parse::<bool>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(key = %prefixed, value = %raw, "ignoring unreadable flag override");
                None
            }
        }
    }

    pub fn is_present(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&self, key: &str) {
        let prefixed = self.prefixed_key(key);
        if let Err(e) = self.cache.remove(&prefixed) {
            tracing::warn!(key = %prefixed, error = %e, "dropping flag override removal");
        }
    }

    /// Removes every override of this application. Other applications sharing the backing
    /// store keep theirs.
    pub fn clear(&self) {
        if let Err(e) = self.cache.remove_prefix(&self.prefix) {
            tracing::warn!(prefix = %self.prefix, error = %e, "failed to clear flag overrides");
        }
    }
}
