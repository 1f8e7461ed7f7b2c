use std::sync::Arc;

use thiserror::Error;

/// Failures of the backing TTL store. These never leave `OverrideCache`: reads degrade to
/// "absent" and writes are dropped.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),
    #[error("cache operation timed out")]
    Timeout,
    #[error("invalid cache configuration: {0}")]
    InvalidConfiguration(String),
    #[error(transparent)]
    Redis(#[from] Arc<redis::RedisError>),
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout() {
            CacheError::Timeout
        } else if err.is_connection_refusal() || err.is_io_error() {
            CacheError::Unavailable(err.to_string())
        } else {
            CacheError::Redis(Arc::new(err))
        }
    }
}

#[derive(Error, Debug)]
pub enum FlagError {
    #[error("flag record {index} is malformed: {reason}")]
    MalformedRecord { index: usize, reason: String },
    #[error("flag payload is malformed: {0}")]
    MalformedPayload(String),
    #[error("failed to parse flag payload: {0}")]
    RequestParsingError(#[from] serde_json::Error),
    #[error("failed to fetch flags: {0}")]
    FetchFailed(String),
}

impl FlagError {
    /// Returns a short error code for logging.
    pub fn error_code(&self) -> &'static str {
        match self {
            FlagError::MalformedRecord { .. } => "malformed_record",
            FlagError::MalformedPayload(_) => "malformed_payload",
            FlagError::RequestParsingError(_) => "payload_parsing_error",
            FlagError::FetchFailed(_) => "fetch_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redis_timeout_maps_to_cache_timeout() {
        let err = redis::RedisError::from(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "slow",
        ));
        assert!(matches!(CacheError::from(err), CacheError::Timeout));
    }

    #[test]
    fn test_redis_refusal_maps_to_unavailable() {
        let err = redis::RedisError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "nope",
        ));
        assert!(matches!(CacheError::from(err), CacheError::Unavailable(_)));
    }

    #[test]
    fn test_error_codes() {
        let err = FlagError::MalformedRecord {
            index: 2,
            reason: "missing field `key`".to_string(),
        };
        assert_eq!(err.error_code(), "malformed_record");
        assert_eq!(
            err.to_string(),
            "flag record 2 is malformed: missing field `key`"
        );
        assert_eq!(
            FlagError::MalformedPayload("expected a list".to_string()).error_code(),
            "malformed_payload"
        );
        assert_eq!(
            FlagError::FetchFailed("503".to_string()).error_code(),
            "fetch_failed"
        );
    }
}
