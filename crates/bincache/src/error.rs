//! Error types for cache bin operations

use thiserror::Error;

/// Errors that can occur during cache bin operations
///
/// Only transport and configuration problems surface here. A payload that
/// fails to decode is never an error: the read path reports it as a miss.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The key-value store is unreachable or rejected a command
    #[error("Backend error: {0}")]
    Backend(String),

    /// A server-side script did not report success
    #[error("Script error: {0}")]
    Script(String),

    /// Invalid bin configuration
    #[error("Invalid cache configuration: {0}")]
    InvalidConfiguration(String),

    /// A logical clock marker could not be parsed
    #[error("Invalid clock marker: {0}")]
    InvalidMarker(String),

    /// Payload serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Payload deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Compression or decompression of a payload failed
    #[error("Compression error: {0}")]
    Compression(String),
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            Self::Deserialization(err.to_string())
        } else {
            Self::Serialization(err.to_string())
        }
    }
}

/// Result type alias for cache bin operations
pub type CacheResult<T> = Result<T, CacheError>;

#[cfg(test)]
#[allow(clippy::panic)]
#[allow(clippy::expect_used)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn verify_error_message(error: &CacheError, error_str: &str) {
        match error {
            CacheError::Backend(msg) => {
                assert!(error_str.contains("Backend error"));
                assert!(error_str.contains(msg));
            }
            CacheError::Script(msg) => {
                assert!(error_str.contains("Script error"));
                assert!(error_str.contains(msg));
            }
            CacheError::InvalidConfiguration(msg) => {
                assert!(error_str.contains("Invalid cache configuration"));
                assert!(error_str.contains(msg));
            }
            CacheError::InvalidMarker(msg) => {
                assert!(error_str.contains("Invalid clock marker"));
                assert!(error_str.contains(msg));
            }
            CacheError::Serialization(msg) => {
                assert!(error_str.contains("Serialization error"));
                assert!(error_str.contains(msg));
            }
            CacheError::Deserialization(msg) => {
                assert!(error_str.contains("Deserialization error"));
                assert!(error_str.contains(msg));
            }
            CacheError::Compression(msg) => {
                assert!(error_str.contains("Compression error"));
                assert!(error_str.contains(msg));
            }
        }
    }

    #[test]
    fn test_error_display_messages() {
        let errors = vec![
            CacheError::Backend("connection refused".to_string()),
            CacheError::Script("EVAL returned 0".to_string()),
            CacheError::InvalidConfiguration("empty bin name".to_string()),
            CacheError::InvalidMarker("abc.def".to_string()),
            CacheError::Serialization("bad value".to_string()),
            CacheError::Deserialization("unexpected token".to_string()),
            CacheError::Compression("corrupt deflate stream".to_string()),
        ];

        for error in &errors {
            let error_str = error.to_string();
            verify_error_message(error, &error_str);
        }
    }

    #[test]
    fn test_from_serde_json_syntax_error() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let cache_err = CacheError::from(err);
        assert!(matches!(cache_err, CacheError::Deserialization(_)));
    }
}
