//! Cache bin facade
//!
//! A [`CacheBin`] is one namespace of the cache. It stamps writes with the
//! logical clock, judges reads against the bin's flush floors and carries out
//! clear calls according to its flush mode.
//!
//! Entries are never trusted just because they exist in the store. A read
//! decodes the record, rejects it if it is corrupt, past its absolute expiry
//! or older than the applicable floor, and deletes what it rejected.

use crate::{
    clock::{LogicalClock, TimeSource},
    codec::{EntryCodec, PayloadCodec},
    config::{BinConfig, CacheSettings},
    entry::{CacheEntry, Expire, MAX_EXPIRE_AT, Payload, Validity},
    error::{CacheError, CacheResult},
    floors::{FloorStore, FlushFloors},
    keyspace::KeySpace,
    policy::{ClearRequest, FlushAction, plan},
    stats::{BinStats, BinStatsSnapshot},
    store::{KeyValueStore, StoreWrite, WireEntry},
};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tracing::{debug, warn};

/// One write of a [`CacheBin::set_multiple`] batch
#[derive(Debug, Clone, PartialEq)]
pub struct CacheItem {
    pub id: String,
    pub data: Payload,
    pub expire: Expire,
}

impl CacheItem {
    pub fn new(id: impl Into<String>, data: impl Into<Payload>, expire: Expire) -> Self {
        Self {
            id: id.into(),
            data: data.into(),
            expire,
        }
    }
}

/// Result of [`CacheBin::get_multiple`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultiGet {
    /// Valid entries by id
    pub entries: HashMap<String, CacheEntry>,
    /// Requested ids without a valid entry, in request order
    pub missing: Vec<String>,
}

/// A namespaced cache bin over a [`KeyValueStore`]
#[derive(Debug, Clone)]
pub struct CacheBin {
    config: BinConfig,
    keys: KeySpace,
    store: Arc<dyn KeyValueStore>,
    floors: FloorStore,
    clock: LogicalClock,
    codec: EntryCodec,
    stats: Arc<BinStats>,
}

impl CacheBin {
    /// Bin over `store`; fails if `config` does not validate
    pub fn new(config: BinConfig, store: Arc<dyn KeyValueStore>) -> CacheResult<Self> {
        config.validate().map_err(CacheError::InvalidConfiguration)?;

        let keys = KeySpace::new(config.key_prefix.as_deref(), &config.name);
        let floors = FloorStore::new(store.clone(), keys.flush_key());
        let codec = match config.compression {
            Some(stage) => EntryCodec::default().with_compression(stage),
            None => EntryCodec::default(),
        };

        debug!(
            bin = %config.name,
            namespace = %keys.namespace(),
            flush_mode = %config.flush_mode,
            max_ttl = config.max_ttl,
            "cache bin created"
        );

        Ok(Self {
            config,
            keys,
            store,
            floors,
            clock: LogicalClock::system(),
            codec,
            stats: Arc::new(BinStats::new()),
        })
    }

    /// Bin configured from site-wide settings
    pub fn from_settings(
        settings: &CacheSettings,
        bin: &str,
        store: Arc<dyn KeyValueStore>,
    ) -> CacheResult<Self> {
        Self::new(settings.resolve(bin), store)
    }

    /// Drive the logical clock from `time` instead of the system clock
    pub fn with_time_source(mut self, time: Arc<dyn TimeSource>) -> Self {
        self.clock = LogicalClock::new(time);
        self
    }

    /// Replace the serializer used for structured payloads
    pub fn with_payload_codec(mut self, payload: Arc<dyn PayloadCodec>) -> Self {
        let codec = EntryCodec::new(payload);
        self.codec = match self.codec.compression() {
            Some(stage) => codec.with_compression(*stage),
            None => codec,
        };
        self
    }

    /// Bin name
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Resolved configuration
    pub fn config(&self) -> &BinConfig {
        &self.config
    }

    /// Key naming of this bin
    pub fn key_space(&self) -> &KeySpace {
        &self.keys
    }

    /// Snapshot of the bin counters
    pub fn stats(&self) -> BinStatsSnapshot {
        self.stats.snapshot()
    }

    /// Current flush floors, read from the store
    pub async fn flush_floors(&self) -> CacheResult<FlushFloors> {
        self.floors.get().await
    }

    /// Always `false`: the store cannot answer this without a full scan
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Fetch a valid entry
    ///
    /// Expired, flushed or undecodable records read as `None` and are
    /// deleted from the store.
    pub async fn get(&self, id: &str) -> CacheResult<Option<CacheEntry>> {
        let key = self.keys.entry_key(id);
        let Some(wire) = self.store.get(&key).await? else {
            self.stats.record_reads(1, 0, 0);
            debug!(bin = %self.config.name, id = %id, "cache miss");
            return Ok(None);
        };

        let floors = self.floors.get().await?;
        let now = self.clock.now_secs();

        match self.accept(id, &wire, &floors, now) {
            Some(entry) => {
                self.stats.record_reads(1, 1, 0);
                debug!(bin = %self.config.name, id = %id, "cache hit");
                Ok(Some(entry))
            }
            None => {
                self.stats.record_reads(1, 0, 1);
                // Awaited so the cleanup error can be logged; it never fails the read
                if let Err(e) = self.store.delete(&key).await {
                    warn!(bin = %self.config.name, key = %key, error = %e, "failed to delete invalid entry");
                } else {
                    self.stats.record_lazy_deletes(1);
                }
                Ok(None)
            }
        }
    }

    /// Fetch many entries in one round trip
    ///
    /// Invalid entries found on the way are removed with one batched delete.
    pub async fn get_multiple<S: AsRef<str>>(&self, ids: &[S]) -> CacheResult<MultiGet> {
        if ids.is_empty() {
            return Ok(MultiGet::default());
        }

        let keys = self.keys.entry_keys(ids.iter().map(|id| id.as_ref()));
        let records = self.store.get_multiple(&keys).await?;

        let mut result = MultiGet::default();
        let mut dead = Vec::new();

        if !records.is_empty() {
            let floors = self.floors.get().await?;
            let now = self.clock.now_secs();

            for (id, key) in ids.iter().map(|id| id.as_ref()).zip(&keys) {
                if result.entries.contains_key(id) {
                    continue;
                }
                let Some(wire) = records.get(key) else {
                    continue;
                };
                match self.accept(id, wire, &floors, now) {
                    Some(entry) => {
                        result.entries.insert(id.to_string(), entry);
                    }
                    None if !dead.contains(key) => dead.push(key.clone()),
                    None => {}
                }
            }
        }

        result.missing = ids
            .iter()
            .map(|id| id.as_ref())
            .filter(|id| !result.entries.contains_key(*id))
            .map(str::to_string)
            .collect();

        let hits = result.entries.len() as u64;
        self.stats
            .record_reads(hits + result.missing.len() as u64, hits, dead.len() as u64);
        debug!(
            bin = %self.config.name,
            requested = ids.len(),
            hits,
            invalid = dead.len(),
            "multi-get"
        );

        if !dead.is_empty() {
            if let Err(e) = self.store.delete_multiple(&dead).await {
                warn!(bin = %self.config.name, count = dead.len(), error = %e, "failed to delete invalid entries");
            } else {
                self.stats.record_lazy_deletes(dead.len() as u64);
            }
        }

        Ok(result)
    }

    /// Store an entry
    ///
    /// The store TTL is capped by the bin's maximum TTL. An expiry that has
    /// already passed deletes any stored copy instead of writing.
    pub async fn set(&self, id: &str, data: impl Into<Payload>, expire: Expire) -> CacheResult<()> {
        let data = data.into();
        let key = self.keys.entry_key(id);
        let now = self.clock.now_secs();

        if expire.is_expired_at(now) {
            // A stale copy may still be stored; make sure it cannot be read
            self.store.delete(&key).await?;
            self.stats.record_preventive_deletes(1);
            debug!(bin = %self.config.name, id = %id, expire = %expire, "expiry already passed, deleted instead of written");
            return Ok(());
        }

        let floors = self.floors.get().await?;
        let (wire, ttl) = self.prepare(id, &data, expire, &floors, now)?;
        self.store.set(&key, &wire, ttl).await?;

        self.stats.record_sets(1);
        debug!(bin = %self.config.name, id = %id, expire = %expire, ttl = ?ttl, "cache set");
        Ok(())
    }

    /// Store an entry that expires `ttl` from now
    pub async fn set_with_ttl(&self, id: &str, data: impl Into<Payload>, ttl: Duration) -> CacheResult<()> {
        let expire = Expire::At(
            self.clock
                .now_secs()
                .saturating_add(ttl.as_secs())
                .min(MAX_EXPIRE_AT),
        );
        self.set(id, data, expire).await
    }

    /// Write many entries with one batched store write
    ///
    /// Items whose expiry has already passed are deleted in one batched
    /// delete instead.
    pub async fn set_multiple(&self, items: &[CacheItem]) -> CacheResult<()> {
        if items.is_empty() {
            return Ok(());
        }

        let now = self.clock.now_secs();
        let (expired, live): (Vec<&CacheItem>, Vec<&CacheItem>) =
            items.iter().partition(|item| item.expire.is_expired_at(now));

        if !live.is_empty() {
            let floors = self.floors.get().await?;
            let writes = live
                .iter()
                .map(|item| {
                    let (entry, ttl) = self.prepare(&item.id, &item.data, item.expire, &floors, now)?;
                    Ok(StoreWrite {
                        key: self.keys.entry_key(&item.id),
                        entry,
                        ttl,
                    })
                })
                .collect::<CacheResult<Vec<_>>>()?;
            self.store.set_multiple(&writes).await?;
            self.stats.record_sets(writes.len() as u64);
        }

        if !expired.is_empty() {
            let keys = self.keys.entry_keys(expired.iter().map(|item| item.id.as_str()));
            self.store.delete_multiple(&keys).await?;
            self.stats.record_preventive_deletes(keys.len() as u64);
        }

        debug!(
            bin = %self.config.name,
            written = live.len(),
            expired = expired.len(),
            "cache set multiple"
        );
        Ok(())
    }

    /// Clear entries according to the shape of `request` and the flush mode
    pub async fn clear(&self, request: ClearRequest<'_>) -> CacheResult<()> {
        let mode = self.config.flush_mode;
        let action = plan(mode, request);
        debug!(bin = %self.config.name, flush_mode = %mode, ?request, ?action, "clear");

        match action {
            FlushAction::BumpVolatileFloor => {
                self.floors.advance(&self.clock, true).await?;
                self.stats.record_floor_bump();
            }
            FlushAction::DeleteVolatile => {
                let prefix = self.keys.all_entries_prefix();
                let removed = self.store.delete_volatile_by_prefix(&prefix).await?;
                self.stats.record_bulk_delete(removed);
                debug!(bin = %self.config.name, removed, "temporary entries deleted");
            }
            FlushAction::BumpAllFloors { bulk_delete } => {
                self.floors.advance(&self.clock, false).await?;
                self.stats.record_floor_bump();
                if bulk_delete {
                    let prefix = self.keys.all_entries_prefix();
                    let removed = self.store.delete_by_prefix(&prefix).await?;
                    self.stats.record_bulk_delete(removed);
                    debug!(bin = %self.config.name, removed, "all entries deleted");
                }
            }
            FlushAction::DeletePrefix(id_prefix) => {
                let prefix = self.keys.prefix(id_prefix);
                let removed = self.store.delete_by_prefix(&prefix).await?;
                self.stats.record_bulk_delete(removed);
                debug!(bin = %self.config.name, prefix = %id_prefix, removed, "prefix deleted");
            }
            FlushAction::DeleteKeys(ids) => {
                let keys = self.keys.entry_keys(ids);
                match keys.as_slice() {
                    [key] => self.store.delete(key).await?,
                    _ => self.store.delete_multiple(&keys).await?,
                }
                self.stats.record_key_deletes(keys.len() as u64);
            }
            FlushAction::Noop => {
                debug!(bin = %self.config.name, "ignoring malformed clear call");
            }
        }

        Ok(())
    }

    /// [`clear`](Self::clear) with the classic `(id, wildcard)` arguments
    ///
    /// - `(None, false)`: drop temporary entries
    /// - `(Some("*"), true)`: wipe the bin
    /// - `(Some(prefix), true)`: drop ids starting with `prefix`
    /// - `(Some(id), false)`: drop one entry
    pub async fn clear_args(&self, id: Option<&str>, wildcard: bool) -> CacheResult<()> {
        self.clear(ClearRequest::from_args(id, wildcard)).await
    }

    /// Delete one entry
    pub async fn delete(&self, id: &str) -> CacheResult<()> {
        self.clear(ClearRequest::Key(id)).await
    }

    /// Delete entries by id with one batched store delete
    pub async fn delete_multiple(&self, ids: &[String]) -> CacheResult<()> {
        self.clear(ClearRequest::Keys(ids)).await
    }

    fn accept(&self, id: &str, wire: &WireEntry, floors: &FlushFloors, now: u64) -> Option<CacheEntry> {
        let entry = self.codec.decode(wire)?;
        if entry.id != id {
            debug!(bin = %self.config.name, id = %id, stored_id = %entry.id, "record belongs to another id");
            return None;
        }
        match entry.validity(floors, now) {
            Validity::Valid => Some(entry),
            reason => {
                debug!(
                    bin = %self.config.name,
                    id = %entry.id,
                    created = %entry.created,
                    ?reason,
                    "entry rejected"
                );
                None
            }
        }
    }

    fn prepare(
        &self,
        id: &str,
        data: &Payload,
        expire: Expire,
        floors: &FlushFloors,
        now: u64,
    ) -> CacheResult<(WireEntry, Option<u64>)> {
        let requested = match expire {
            Expire::At(at) => Some(at.saturating_sub(now)),
            Expire::Permanent | Expire::Temporary => None,
        };
        let ttl = self.config.cap_ttl(requested);
        let created = self
            .clock
            .created_marker(floors.applicable(expire.is_volatile()));
        let wire = self.codec.encode(id, data, expire, created)?;
        Ok((wire, ttl))
    }
}
