//! In-process key-value store
//!
//! [`MemoryStore`] implements [`KeyValueStore`] on top of `DashMap`s. It is
//! meant for tests, local development and single-process deployments.
//! Expiry is evaluated against a [`TimeSource`], so a [`ManualTimeSource`]
//! can drive TTLs deterministically.
//!
//! Every trait method counts as one round trip; [`MemoryStore::calls`]
//! reports how many of each were made.
//!
//! [`ManualTimeSource`]: crate::clock::ManualTimeSource

use crate::{
    clock::{SystemTimeSource, TimeSource},
    error::CacheResult,
    store::{CounterPair, KeyValueStore, StoreWrite, WireEntry, effective_ttl, fields},
};
use async_trait::async_trait;
use dashmap::DashMap;
use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

#[derive(Debug, Clone)]
struct StoredEntry {
    entry: WireEntry,
    ttl: Option<u64>,
    expires_at: Option<u64>,
}

impl StoredEntry {
    fn is_live(&self, now: u64) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

#[derive(Debug, Default)]
struct CallCounters {
    get: AtomicU64,
    get_multiple: AtomicU64,
    set: AtomicU64,
    set_multiple: AtomicU64,
    delete: AtomicU64,
    delete_multiple: AtomicU64,
    delete_by_prefix: AtomicU64,
    delete_volatile_by_prefix: AtomicU64,
    get_counter_pair: AtomicU64,
    set_counter_pair: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Round trips made against a [`MemoryStore`], per operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCalls {
    pub get: u64,
    pub get_multiple: u64,
    pub set: u64,
    pub set_multiple: u64,
    pub delete: u64,
    pub delete_multiple: u64,
    pub delete_by_prefix: u64,
    pub delete_volatile_by_prefix: u64,
    pub get_counter_pair: u64,
    pub set_counter_pair: u64,
}

impl StoreCalls {
    pub fn total(&self) -> u64 {
        self.get
            + self.get_multiple
            + self.set
            + self.set_multiple
            + self.delete
            + self.delete_multiple
            + self.delete_by_prefix
            + self.delete_volatile_by_prefix
            + self.get_counter_pair
            + self.set_counter_pair
    }
}

/// `DashMap`-backed [`KeyValueStore`]
#[derive(Debug)]
pub struct MemoryStore {
    entries: DashMap<String, StoredEntry>,
    counters: DashMap<String, CounterPair>,
    calls: CallCounters,
    time: Arc<dyn TimeSource>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Store whose TTLs follow the system clock
    pub fn new() -> Self {
        Self::with_time_source(Arc::new(SystemTimeSource))
    }

    pub fn with_time_source(time: Arc<dyn TimeSource>) -> Self {
        Self {
            entries: DashMap::new(),
            counters: DashMap::new(),
            calls: CallCounters::default(),
            time,
        }
    }

    pub fn calls(&self) -> StoreCalls {
        let c = &self.calls;
        StoreCalls {
            get: c.get.load(Ordering::Relaxed),
            get_multiple: c.get_multiple.load(Ordering::Relaxed),
            set: c.set.load(Ordering::Relaxed),
            set_multiple: c.set_multiple.load(Ordering::Relaxed),
            delete: c.delete.load(Ordering::Relaxed),
            delete_multiple: c.delete_multiple.load(Ordering::Relaxed),
            delete_by_prefix: c.delete_by_prefix.load(Ordering::Relaxed),
            delete_volatile_by_prefix: c.delete_volatile_by_prefix.load(Ordering::Relaxed),
            get_counter_pair: c.get_counter_pair.load(Ordering::Relaxed),
            set_counter_pair: c.set_counter_pair.load(Ordering::Relaxed),
        }
    }

    pub fn reset_calls(&self) {
        let c = &self.calls;
        for counter in [
            &c.get,
            &c.get_multiple,
            &c.set,
            &c.set_multiple,
            &c.delete,
            &c.delete_multiple,
            &c.delete_by_prefix,
            &c.delete_volatile_by_prefix,
            &c.get_counter_pair,
            &c.set_counter_pair,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Whether a live entry record exists under `key`
    pub fn contains_key(&self, key: &str) -> bool {
        self.live(key).is_some()
    }

    /// Raw record under `key`, bypassing call counting
    pub fn raw(&self, key: &str) -> Option<WireEntry> {
        self.live(key)
    }

    /// TTL the record under `key` was written with
    pub fn ttl(&self, key: &str) -> Option<u64> {
        let now = self.time.now_secs();
        self.entries
            .get(key)
            .filter(|stored| stored.is_live(now))
            .and_then(|stored| stored.ttl)
    }

    /// Number of live entry records
    pub fn len(&self) -> usize {
        let now = self.time.now_secs();
        self.entries.iter().filter(|e| e.value().is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live(&self, key: &str) -> Option<WireEntry> {
        let now = self.time.now_secs();
        let found = self.entries.get(key).map(|stored| stored.clone())?;
        if found.is_live(now) {
            Some(found.entry)
        } else {
            self.entries.remove_if(key, |_, stored| !stored.is_live(now));
            None
        }
    }

    fn write(&self, key: &str, entry: &WireEntry, ttl: Option<u64>) {
        let ttl = effective_ttl(ttl);
        let expires_at = ttl.map(|ttl| self.time.now_secs().saturating_add(ttl));
        self.entries.insert(
            key.to_string(),
            StoredEntry {
                entry: entry.clone(),
                ttl,
                expires_at,
            },
        );
    }

    fn remove_matching(&self, prefix: &str, volatile_only: bool) -> u64 {
        let mut removed = 0;
        self.entries.retain(|key, stored| {
            let matches = key.starts_with(prefix)
                && (!volatile_only || stored.entry.get_str(fields::VOLATILE) == Some("1"));
            if matches {
                removed += 1;
            }
            !matches
        });
        removed
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> CacheResult<Option<WireEntry>> {
        bump(&self.calls.get);
        Ok(self.live(key))
    }

    async fn get_multiple(&self, keys: &[String]) -> CacheResult<HashMap<String, WireEntry>> {
        bump(&self.calls.get_multiple);
        Ok(keys
            .iter()
            .filter_map(|key| self.live(key).map(|entry| (key.clone(), entry)))
            .collect())
    }

    async fn set(&self, key: &str, entry: &WireEntry, ttl: Option<u64>) -> CacheResult<()> {
        bump(&self.calls.set);
        self.write(key, entry, ttl);
        Ok(())
    }

    async fn set_multiple(&self, writes: &[StoreWrite]) -> CacheResult<()> {
        bump(&self.calls.set_multiple);
        for write in writes {
            self.write(&write.key, &write.entry, write.ttl);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        bump(&self.calls.delete);
        self.entries.remove(key);
        self.counters.remove(key);
        Ok(())
    }

    async fn delete_multiple(&self, keys: &[String]) -> CacheResult<()> {
        bump(&self.calls.delete_multiple);
        for key in keys {
            self.entries.remove(key);
            self.counters.remove(key);
        }
        Ok(())
    }

    async fn delete_by_prefix(&self, prefix: &str) -> CacheResult<u64> {
        bump(&self.calls.delete_by_prefix);
        Ok(self.remove_matching(prefix, false))
    }

    async fn delete_volatile_by_prefix(&self, prefix: &str) -> CacheResult<u64> {
        bump(&self.calls.delete_volatile_by_prefix);
        Ok(self.remove_matching(prefix, true))
    }

    async fn get_counter_pair(&self, key: &str) -> CacheResult<CounterPair> {
        bump(&self.calls.get_counter_pair);
        Ok(self
            .counters
            .get(key)
            .map(|pair| pair.clone())
            .unwrap_or_default())
    }

    async fn set_counter_pair(
        &self,
        key: &str,
        first: &str,
        second: &str,
        only_second: bool,
    ) -> CacheResult<()> {
        bump(&self.calls.set_counter_pair);
        let mut pair = self.counters.entry(key.to_string()).or_default();
        if !only_second {
            pair.first = Some(first.to_string());
        }
        pair.second = Some(second.to_string());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
#[allow(clippy::expect_used)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::clock::ManualTimeSource;

    fn record(volatile: bool) -> WireEntry {
        WireEntry::new()
            .with(fields::ID, "x")
            .with(fields::VOLATILE, if volatile { "1" } else { "0" })
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = MemoryStore::new();
        store.set("a", &record(false), None).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(record(false)));

        store.delete("a").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
        // Deleting a missing key is fine
        store.delete("a").await.unwrap();
    }

    #[tokio::test]
    async fn test_ttl_expiry_follows_time_source() {
        let time = ManualTimeSource::new(100);
        let store = MemoryStore::with_time_source(Arc::new(time.clone()));

        store.set("short", &record(false), Some(10)).await.unwrap();
        store.set("forever", &record(false), Some(0)).await.unwrap();
        assert_eq!(store.ttl("short"), Some(10));
        assert_eq!(store.ttl("forever"), None);

        time.advance(9);
        assert!(store.contains_key("short"));
        time.advance(1);
        assert!(!store.contains_key("short"));
        assert!(store.contains_key("forever"));
    }

    #[tokio::test]
    async fn test_get_multiple_returns_present_keys_only() {
        let store = MemoryStore::new();
        store
            .set_multiple(&[
                StoreWrite {
                    key: "a".to_string(),
                    entry: record(false),
                    ttl: None,
                },
                StoreWrite {
                    key: "b".to_string(),
                    entry: record(true),
                    ttl: Some(60),
                },
            ])
            .await
            .unwrap();

        let keys = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let found = store.get_multiple(&keys).await.unwrap();
        assert_eq!(found.len(), 2);
        assert!(!found.contains_key("c"));

        let calls = store.calls();
        assert_eq!(calls.set_multiple, 1);
        assert_eq!(calls.get_multiple, 1);
        assert_eq!(calls.total(), 2);
    }

    #[tokio::test]
    async fn test_prefix_deletes() {
        let store = MemoryStore::new();
        store.set("bin:p:1", &record(false), None).await.unwrap();
        store.set("bin:p:2", &record(true), None).await.unwrap();
        store.set("bin:q:1", &record(true), None).await.unwrap();
        store.set("other:p:1", &record(true), None).await.unwrap();

        assert_eq!(store.delete_volatile_by_prefix("bin:").await.unwrap(), 2);
        assert!(store.contains_key("bin:p:1"));
        assert!(!store.contains_key("bin:q:1"));

        assert_eq!(store.delete_by_prefix("bin:p:").await.unwrap(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.contains_key("other:p:1"));
    }

    #[tokio::test]
    async fn test_counter_pair() {
        let store = MemoryStore::new();
        assert_eq!(store.get_counter_pair("f").await.unwrap(), CounterPair::default());

        store.set_counter_pair("f", "1.000", "1.000", false).await.unwrap();
        store.set_counter_pair("f", "9.000", "2.000", true).await.unwrap();

        let pair = store.get_counter_pair("f").await.unwrap();
        assert_eq!(pair.first.as_deref(), Some("1.000"));
        assert_eq!(pair.second.as_deref(), Some("2.000"));

        store.reset_calls();
        assert_eq!(store.calls(), StoreCalls::default());
    }
}
