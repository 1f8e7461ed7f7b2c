use std::time::Duration;

use redis::Commands;

use crate::cache::TtlCache;
use crate::errors::CacheError;

/// Redis-backed TTL store, so overrides outlive the process. Every key is stored as
/// `<namespace>:<key>` and expiry is left to redis (`SET ... PX`).
pub struct RedisTtlCache {
    client: redis::Client,
    namespace: String,
    timeout: Duration,
}

impl RedisTtlCache {
    pub fn new(addr: String, namespace: String, timeout: Duration) -> Result<Self, CacheError> {
        if timeout.is_zero() {
            return Err(CacheError::InvalidConfiguration(
                "redis timeout must be greater than zero".to_string(),
            ));
        }
        let client = redis::Client::open(addr)?;

        Ok(RedisTtlCache {
            client,
            namespace,
            timeout,
        })
    }

    fn connection(&self) -> Result<redis::Connection, CacheError> {
        let conn = self.client.get_connection_with_timeout(self.timeout)?;
        conn.set_read_timeout(Some(self.timeout))?;
        conn.set_write_timeout(Some(self.timeout))?;
        Ok(conn)
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }
}

// SCAN MATCH takes a glob, so the literal prefix must not be read as one.
fn escape_glob(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl TtlCache for RedisTtlCache {
    fn add(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        let mut conn = self.connection()?;
        redis::cmd("SET")
            .arg(self.namespaced(key))
            .arg(value)
            .arg("PX")
            .arg(millis)
            .query::<()>(&mut conn)?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection()?;
        let value: Option<String> = conn.get(self.namespaced(key))?;
        Ok(value)
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection()?;
        conn.del::<_, ()>(self.namespaced(key))?;
        Ok(())
    }

    fn remove_prefix(&self, prefix: &str) -> Result<(), CacheError> {
        let mut conn = self.connection()?;
        let pattern = format!("{}*", escape_glob(&self.namespaced(prefix)));
        let keys: Vec<String> = conn.scan_match::<_, String>(pattern)?.collect();
        if keys.is_empty() {
            return Ok(());
        }
        tracing::debug!(count = keys.len(), prefix = %prefix, "removing cached entries");
        conn.del::<_, ()>(keys)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::random_string;

    fn setup_redis_cache(url: Option<String>) -> RedisTtlCache {
        let redis_url = match url {
            Some(value) => value,
            None => "redis://localhost:6379/".to_string(),
        };
        RedisTtlCache::new(
            redis_url,
            random_string("test_cache_", 8),
            Duration::from_millis(200),
        )
        .expect("Failed to create redis cache")
    }

    #[test]
    fn test_escape_glob() {
        assert_eq!(escape_glob("featureFlags.app."), "featureFlags.app.");
        assert_eq!(escape_glob("a*b?[c]\\"), "a\\*b\\?\\[c\\]\\\\");
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let result = RedisTtlCache::new(
            "redis://localhost:6379/".to_string(),
            "ns".to_string(),
            Duration::ZERO,
        );
        assert!(matches!(result, Err(CacheError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_unreachable_redis_reports_unavailable() {
        let cache = setup_redis_cache(Some("redis://localhost:1111/".to_string()));
        assert!(cache.get("anything").is_err());
        assert!(cache.add("anything", "true".to_string(), Duration::from_secs(1)).is_err());
    }

    #[test]
    #[ignore = "requires a local redis"]
    fn test_roundtrip_and_prefix_removal() {
        let cache = setup_redis_cache(None);
        let hour = Duration::from_secs(3600);
        cache.add("featureFlags.a.x", "true".to_string(), hour).unwrap();
        cache.add("featureFlags.a.y", "false".to_string(), hour).unwrap();
        cache.add("featureFlags.b.x", "true".to_string(), hour).unwrap();

        assert_eq!(cache.get("featureFlags.a.x").unwrap(), Some("true".to_string()));

        cache.remove_prefix("featureFlags.a.").unwrap();
        assert_eq!(cache.get("featureFlags.a.x").unwrap(), None);
        assert_eq!(cache.get("featureFlags.a.y").unwrap(), None);
        assert_eq!(cache.get("featureFlags.b.x").unwrap(), Some("true".to_string()));

        cache.remove("featureFlags.b.x").unwrap();
        assert_eq!(cache.get("featureFlags.b.x").unwrap(), None);
    }

    #[test]
    #[ignore = "requires a local redis"]
    fn test_entries_expire() {
        let cache = setup_redis_cache(None);
        cache
            .add("short", "true".to_string(), Duration::from_millis(50))
            .unwrap();
        std::thread::sleep(Duration::from_millis(120));
        assert_eq!(cache.get("short").unwrap(), None);
    }
}
