//! Redis storage for `bincache`
//!
//! [`RedisStore`] implements [`bincache::KeyValueStore`] on top of a
//! `deadpool-redis` connection pool. Entries are stored as Redis hashes and
//! bin-wide deletes run as Lua scripts that walk the keyspace with `SCAN`.
//!
//! # Usage
//!
//! ```rust,no_run
//! use bincache::prelude::*;
//! use bincache_redis::{RedisConfig, RedisStore};
//! use std::sync::Arc;
//!
//! # async fn example() -> CacheResult<()> {
//! let store = Arc::new(RedisStore::connect(&RedisConfig::new("redis://127.0.0.1:6379/0")).await?);
//! let bin = CacheBin::from_settings(&CacheSettings::new(), "cache_block", store)?;
//!
//! bin.set("sidebar", "<ul>...</ul>", Expire::Temporary).await?;
//! bin.clear_args(None, false).await?;
//! # Ok(())
//! # }
//! ```

#![allow(clippy::return_self_not_must_use)] // Builder patterns

pub mod config;
pub mod error;
pub mod scripts;
pub mod store;

pub use config::RedisConfig;
pub use error::RedisStoreError;
pub use store::RedisStore;
