//! Redis transport errors

use bincache::CacheError;
use thiserror::Error;

/// Failures of the Redis transport
///
/// Every variant surfaces to cache bins as a [`CacheError`].
#[derive(Debug, Error)]
pub enum RedisStoreError {
    #[error("Redis command failed: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Redis connection pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    #[error("Failed to create Redis connection pool: {0}")]
    CreatePool(#[from] deadpool_redis::CreatePoolError),

    #[error("Script '{script}' returned unexpected reply: {reply}")]
    UnexpectedReply { script: &'static str, reply: String },
}

impl From<RedisStoreError> for CacheError {
    fn from(err: RedisStoreError) -> Self {
        match err {
            RedisStoreError::UnexpectedReply { .. } => Self::Script(err.to_string()),
            other => Self::Backend(other.to_string()),
        }
    }
}
