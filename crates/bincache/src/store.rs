//! Key-value store adapter contract
//!
//! Cache bins never talk to a transport directly. They drive a
//! [`KeyValueStore`], which stores each entry as a small record of named
//! byte fields (a hash, in Redis terms) with an optional per-key TTL, plus one
//! two-slot counter record per bin for the flush floors.
//!
//! Implementations must honour two contracts:
//!
//! - Every multi-key method is a single round trip (pipeline or one command),
//!   never a loop of single-key calls.
//! - Prefix deletions run server-side and atomically with respect to other
//!   commands; no client-side scan-then-delete.
//!
//! Deleting a key that does not exist is a no-op, not an error. Retries and
//! timeouts belong to the implementation; bins treat any error as fatal for
//! the operation at hand.

use crate::{error::CacheResult, ttl::MAX_STORE_TTL};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};

/// Field names of a stored entry record
pub mod fields {
    pub const ID: &str = "id";
    pub const CREATED: &str = "created";
    pub const EXPIRE: &str = "expire";
    pub const DATA: &str = "data";
    pub const SERIALIZED: &str = "serialized";
    pub const VOLATILE: &str = "volatile";
    pub const COMPRESSED: &str = "compressed";
}

/// Field names of the flush floor record
pub mod floor_fields {
    pub const PERMANENT: &str = "permanent";
    pub const VOLATILE: &str = "volatile";
}

/// Raw entry record as persisted in the store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WireEntry {
    fields: BTreeMap<String, Bytes>,
}

impl WireEntry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Bytes>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Bytes>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Bytes> {
        self.fields.get(name)
    }

    /// Field value as UTF-8 text; `None` if absent or not valid UTF-8
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| std::str::from_utf8(v).ok())
    }

    /// `true` when the field holds a non-zero integer
    pub fn flag(&self, name: &str) -> bool {
        self.get_str(name)
            .and_then(|v| v.trim().parse::<i64>().ok())
            .is_some_and(|v| v != 0)
    }

    pub fn remove(&mut self, name: &str) -> Option<Bytes> {
        self.fields.remove(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Bytes)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Approximate stored size (field names plus values)
    pub fn size_bytes(&self) -> usize {
        self.fields.iter().map(|(k, v)| k.len() + v.len()).sum()
    }
}

impl<K: Into<String>, V: Into<Bytes>> FromIterator<(K, V)> for WireEntry {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// One write in a batched [`KeyValueStore::set_multiple`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreWrite {
    pub key: String,
    pub entry: WireEntry,
    /// Seconds; `None` or `Some(0)` means no expiry
    pub ttl: Option<u64>,
}

/// Raw two-slot counter record; absent slots are `None`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CounterPair {
    pub first: Option<String>,
    pub second: Option<String>,
}

/// Normalize a TTL so that zero means "no expiry"
///
/// TTLs above [`MAX_STORE_TTL`] are clamped to it; stores reject expiry
/// times that overflow their millisecond clocks.
pub fn effective_ttl(ttl: Option<u64>) -> Option<u64> {
    ttl.filter(|t| *t > 0).map(|t| t.min(MAX_STORE_TTL))
}

/// Remote key-value store consumed by cache bins
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<WireEntry>>;

    /// Present keys only, keyed by store key
    async fn get_multiple(&self, keys: &[String]) -> CacheResult<HashMap<String, WireEntry>>;

    /// Replaces any existing record. `ttl` of `None`/zero means no expiry.
    async fn set(&self, key: &str, entry: &WireEntry, ttl: Option<u64>) -> CacheResult<()>;

    async fn set_multiple(&self, writes: &[StoreWrite]) -> CacheResult<()>;

    async fn delete(&self, key: &str) -> CacheResult<()>;

    async fn delete_multiple(&self, keys: &[String]) -> CacheResult<()>;

    /// Delete every key starting with the literal `prefix`; returns the count
    async fn delete_by_prefix(&self, prefix: &str) -> CacheResult<u64>;

    /// Like [`delete_by_prefix`](Self::delete_by_prefix), restricted to
    /// records whose `volatile` field is `1`
    async fn delete_volatile_by_prefix(&self, prefix: &str) -> CacheResult<u64>;

    /// Read the `permanent` and `volatile` slots of a counter record
    async fn get_counter_pair(&self, key: &str) -> CacheResult<CounterPair>;

    /// Write both slots, or only the second one when `only_second` is set
    async fn set_counter_pair(
        &self,
        key: &str,
        first: &str,
        second: &str,
        only_second: bool,
    ) -> CacheResult<()>;
}

impl std::fmt::Debug for dyn KeyValueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn KeyValueStore")
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
#[allow(clippy::expect_used)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_entry_fields() {
        let entry = WireEntry::new()
            .with(fields::ID, "node:1")
            .with(fields::VOLATILE, "1")
            .with(fields::SERIALIZED, "0")
            .with(fields::DATA, Bytes::from_static(&[0xff, 0xfe]));

        assert_eq!(entry.len(), 4);
        assert_eq!(entry.get_str(fields::ID), Some("node:1"));
        assert!(entry.flag(fields::VOLATILE));
        assert!(!entry.flag(fields::SERIALIZED));
        assert!(!entry.flag(fields::COMPRESSED));
        // Binary data is not text
        assert_eq!(entry.get_str(fields::DATA), None);
        assert_eq!(entry.get(fields::DATA).map(Bytes::len), Some(2));
    }

    #[test]
    fn test_wire_entry_from_iter_and_remove() {
        let mut entry: WireEntry = [("id", "a"), ("created", "1.000")].into_iter().collect();
        assert_eq!(entry.size_bytes(), 2 + 1 + 7 + 5);
        assert_eq!(entry.remove("id"), Some(Bytes::from_static(b"a")));
        assert_eq!(entry.iter().count(), 1);
        assert!(!entry.is_empty());
    }

    #[test]
    fn test_effective_ttl() {
        assert_eq!(effective_ttl(None), None);
        assert_eq!(effective_ttl(Some(0)), None);
        assert_eq!(effective_ttl(Some(30)), Some(30));
        assert_eq!(effective_ttl(Some(u64::MAX)), Some(MAX_STORE_TTL));
    }
}
