//! [`KeyValueStore`] over Redis hashes

use crate::{
    config::RedisConfig,
    error::RedisStoreError,
    scripts::{DELETE_BY_PATTERN, DELETE_CHUNK_SIZE, DELETE_VOLATILE_BY_PATTERN},
};
use async_trait::async_trait;
use bincache::{
    CacheError, CacheResult,
    keyspace::glob_pattern,
    store::{CounterPair, KeyValueStore, StoreWrite, WireEntry, effective_ttl, floor_fields},
};
use deadpool_redis::{Connection, Pool, Runtime};
use redis::{Pipeline, Script, Value};
use std::{collections::HashMap, fmt, slice::Chunks};
use tracing::{debug, info};

/// Redis-backed store
///
/// Entries are hashes, one field per [`WireEntry`] field. Writes replace the
/// whole hash and set its TTL in one `MULTI`/`EXEC` block. The pool handle is
/// cheap to clone and owned by the caller.
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
    delete_by_pattern: Script,
    delete_volatile_by_pattern: Script,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("pool", &self.pool.status())
            .finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Build a pool from `config` and check that Redis answers
    pub async fn connect(config: &RedisConfig) -> CacheResult<Self> {
        config.validate().map_err(CacheError::InvalidConfiguration)?;
        info!(url = %config.url, pool_size = config.pool_size, "connecting to Redis");

        let pool = config
            .pool_config()
            .create_pool(Some(Runtime::Tokio1))
            .map_err(RedisStoreError::from)?;
        let store = Self::from_pool(pool);

        let mut conn = store.connection().await?;
        let _: () = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(RedisStoreError::from)?;

        Ok(store)
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: Pool) -> Self {
        Self {
            pool,
            delete_by_pattern: Script::new(DELETE_BY_PATTERN),
            delete_volatile_by_pattern: Script::new(DELETE_VOLATILE_BY_PATTERN),
        }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    async fn connection(&self) -> CacheResult<Connection> {
        Ok(self.pool.get().await.map_err(RedisStoreError::from)?)
    }

    async fn run_delete_script(
        &self,
        name: &'static str,
        script: &Script,
        prefix: &str,
    ) -> CacheResult<u64> {
        let pattern = glob_pattern(prefix);
        let mut conn = self.connection().await?;
        let reply: Value = script
            .arg(&pattern)
            .invoke_async(&mut conn)
            .await
            .map_err(RedisStoreError::from)?;

        let deleted = deleted_count(name, &reply)?;
        debug!(script = name, pattern = %pattern, deleted, "scan-delete");
        Ok(deleted)
    }
}

/// Split a batched delete into `DEL` commands of bounded size
fn delete_chunks(keys: &[String]) -> Chunks<'_, String> {
    keys.chunks(DELETE_CHUNK_SIZE)
}

fn queue_deletes(pipe: &mut Pipeline, keys: &[String]) {
    for chunk in delete_chunks(keys) {
        pipe.cmd("DEL").arg(chunk).ignore();
    }
}

fn queue_write(pipe: &mut Pipeline, key: &str, entry: &WireEntry, ttl: Option<u64>) {
    pipe.cmd("DEL").arg(key).ignore();
    if entry.is_empty() {
        return;
    }

    let hset = pipe.cmd("HSET").arg(key);
    for (name, value) in entry.iter() {
        hset.arg(name).arg(&value[..]);
    }
    hset.ignore();

    if let Some(ttl) = effective_ttl(ttl) {
        pipe.cmd("EXPIRE").arg(key).arg(ttl).ignore();
    }
}

fn wire_entry(fields: HashMap<String, Vec<u8>>) -> Option<WireEntry> {
    if fields.is_empty() {
        None
    } else {
        Some(fields.into_iter().collect())
    }
}

fn deleted_count(script: &'static str, reply: &Value) -> Result<u64, RedisStoreError> {
    match reply {
        Value::Int(count) if *count >= 0 => Ok(count.unsigned_abs()),
        other => Err(RedisStoreError::UnexpectedReply {
            script,
            reply: format!("{other:?}"),
        }),
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> CacheResult<Option<WireEntry>> {
        let mut conn = self.connection().await?;
        let fields: HashMap<String, Vec<u8>> = redis::cmd("HGETALL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(RedisStoreError::from)?;
        Ok(wire_entry(fields))
    }

    async fn get_multiple(&self, keys: &[String]) -> CacheResult<HashMap<String, WireEntry>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let mut pipe = redis::pipe();
        for key in keys {
            pipe.cmd("HGETALL").arg(key);
        }

        let mut conn = self.connection().await?;
        let replies: Vec<HashMap<String, Vec<u8>>> = pipe
            .query_async(&mut conn)
            .await
            .map_err(RedisStoreError::from)?;

        Ok(keys
            .iter()
            .zip(replies)
            .filter_map(|(key, fields)| wire_entry(fields).map(|entry| (key.clone(), entry)))
            .collect())
    }

    async fn set(&self, key: &str, entry: &WireEntry, ttl: Option<u64>) -> CacheResult<()> {
        let mut pipe = redis::pipe();
        pipe.atomic();
        queue_write(&mut pipe, key, entry, ttl);

        let mut conn = self.connection().await?;
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(RedisStoreError::from)?;
        Ok(())
    }

    async fn set_multiple(&self, writes: &[StoreWrite]) -> CacheResult<()> {
        if writes.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for write in writes {
            queue_write(&mut pipe, &write.key, &write.entry, write.ttl);
        }

        let mut conn = self.connection().await?;
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(RedisStoreError::from)?;
        debug!(count = writes.len(), "pipelined set");
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.connection().await?;
        let _: () = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(RedisStoreError::from)?;
        Ok(())
    }

    async fn delete_multiple(&self, keys: &[String]) -> CacheResult<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        queue_deletes(&mut pipe, keys);

        let mut conn = self.connection().await?;
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(RedisStoreError::from)?;
        debug!(count = keys.len(), "pipelined delete");
        Ok(())
    }

    async fn delete_by_prefix(&self, prefix: &str) -> CacheResult<u64> {
        self.run_delete_script("delete_by_prefix", &self.delete_by_pattern, prefix)
            .await
    }

    async fn delete_volatile_by_prefix(&self, prefix: &str) -> CacheResult<u64> {
        self.run_delete_script(
            "delete_volatile_by_prefix",
            &self.delete_volatile_by_pattern,
            prefix,
        )
        .await
    }

    async fn get_counter_pair(&self, key: &str) -> CacheResult<CounterPair> {
        let mut conn = self.connection().await?;
        let (first, second): (Option<String>, Option<String>) = redis::cmd("HMGET")
            .arg(key)
            .arg(floor_fields::PERMANENT)
            .arg(floor_fields::VOLATILE)
            .query_async(&mut conn)
            .await
            .map_err(RedisStoreError::from)?;
        Ok(CounterPair { first, second })
    }

    async fn set_counter_pair(
        &self,
        key: &str,
        first: &str,
        second: &str,
        only_second: bool,
    ) -> CacheResult<()> {
        let mut cmd = redis::cmd("HSET");
        cmd.arg(key).arg(floor_fields::VOLATILE).arg(second);
        if !only_second {
            cmd.arg(floor_fields::PERMANENT).arg(first);
        }

        let mut conn = self.connection().await?;
        let _: () = cmd
            .query_async(&mut conn)
            .await
            .map_err(RedisStoreError::from)?;
        Ok(())
    }
}
