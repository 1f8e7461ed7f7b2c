use envconfig::Envconfig;
use std::ops::Deref;
use std::str::FromStr;
use std::time::Duration;

use crate::flags::environment_gate::RestrictedFlags;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlexBool(pub bool);

impl FromStr for FlexBool {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(FlexBool(true)),
            "false" | "0" | "no" | "off" | "" => Ok(FlexBool(false)),
            _ => Err(format!("Invalid boolean value: {}", s)),
        }
    }
}

impl From<FlexBool> for bool {
    fn from(flex: FlexBool) -> Self {
        flex.0
    }
}

impl Deref for FlexBool {
    type Target = bool;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Memory,
    Redis,
}

impl FromStr for CacheBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "" => Ok(CacheBackend::Memory),
            "redis" => Ok(CacheBackend::Redis),
            _ => Err(format!("Invalid cache backend: {}", s)),
        }
    }
}

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    #[envconfig(from = "APP_NAME", default = "app")]
    pub app_name: String,

    #[envconfig(from = "DEPLOYMENT_ENVIRONMENT", default = "development")]
    pub deployment_environment: String,

    // key:environment pairs, e.g. "shapeshift:production,payments-v2:staging"
    #[envconfig(from = "RESTRICTED_FLAGS", default = "shapeshift:production")]
    pub restricted_flags: RestrictedFlags,

    #[envconfig(from = "OVERRIDE_TTL_SECS", default = "3600")]
    pub override_ttl_secs: u64,

    #[envconfig(from = "CACHE_BACKEND", default = "memory")]
    pub cache_backend: CacheBackend,

    #[envconfig(from = "CACHE_NAME", default = "FeatureFlags")]
    pub cache_name: String,

    #[envconfig(from = "REDIS_URL", default = "redis://localhost:6379/")]
    pub redis_url: String,

    #[envconfig(from = "REDIS_TIMEOUT_MS", default = "100")]
    pub redis_timeout_ms: u64,

    #[envconfig(from = "DEBUG", default = "false")]
    pub debug: FlexBool,
}

impl Config {
    pub fn default_test_config() -> Self {
        Self {
            app_name: "test-app".to_string(),
            deployment_environment: "production".to_string(),
            restricted_flags: RestrictedFlags::from_str("shapeshift:production")
                .unwrap_or_default(),
            override_ttl_secs: 3600,
            cache_backend: CacheBackend::Memory,
            cache_name: "FeatureFlags".to_string(),
            redis_url: "redis://localhost:6379/".to_string(),
            redis_timeout_ms: 100,
            debug: FlexBool(false),
        }
    }

    pub fn override_ttl(&self) -> Duration {
        Duration::from_secs(self.override_ttl_secs)
    }

    pub fn redis_timeout(&self) -> Duration {
        Duration::from_millis(self.redis_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::init_from_hashmap(&HashMap::new()).unwrap();
        assert_eq!(config.app_name, "app");
        assert_eq!(config.deployment_environment, "development");
        assert_eq!(config.override_ttl(), Duration::from_secs(3600));
        assert_eq!(config.cache_backend, CacheBackend::Memory);
        assert_eq!(config.cache_name, "FeatureFlags");
        assert!(!*config.debug);
        assert_eq!(
            config.restricted_flags.required_environment("shapeshift"),
            Some("production")
        );
        assert_eq!(config.restricted_flags.len(), 1);
    }

    #[test]
    fn test_config_from_env_values() {
        let env = HashMap::from([
            ("APP_NAME".to_string(), "wallet".to_string()),
            ("DEPLOYMENT_ENVIRONMENT".to_string(), "Staging".to_string()),
            ("RESTRICTED_FLAGS".to_string(), "none".to_string()),
            ("OVERRIDE_TTL_SECS".to_string(), "60".to_string()),
            ("CACHE_BACKEND".to_string(), "redis".to_string()),
            ("DEBUG".to_string(), "yes".to_string()),
        ]);
        let config = Config::init_from_hashmap(&env).unwrap();
        assert_eq!(config.app_name, "wallet");
        assert_eq!(config.override_ttl(), Duration::from_secs(60));
        assert_eq!(config.cache_backend, CacheBackend::Redis);
        assert!(config.restricted_flags.is_empty());
        assert!(*config.debug);
    }

    #[test]
    fn test_invalid_cache_backend_is_rejected() {
        let env = HashMap::from([("CACHE_BACKEND".to_string(), "sqlite".to_string())]);
        assert!(Config::init_from_hashmap(&env).is_err());
    }

    #[test]
    fn test_flex_bool_parsing() {
        assert_eq!(FlexBool::from_str("ON"), Ok(FlexBool(true)));
        assert_eq!(FlexBool::from_str(" 0 "), Ok(FlexBool(false)));
        assert_eq!(FlexBool::from_str(""), Ok(FlexBool(false)));
        assert!(FlexBool::from_str("maybe").is_err());
    }
}
