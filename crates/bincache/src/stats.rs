//! Per-bin operation counters
//!
//! Counters are plain relaxed atomics; a [`BinStatsSnapshot`] is a
//! point-in-time copy and may mix values from concurrent operations.

#![allow(clippy::cast_precision_loss)] // Rates intentionally accept precision loss

use serde::Serialize;
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

// Hot read-path counters get their own cache lines
#[repr(align(64))]
#[derive(Debug, Default)]
struct AlignedCounter(AtomicU64);

impl AlignedCounter {
    #[inline]
    fn add(&self, value: u64) {
        self.0.fetch_add(value, Ordering::Relaxed);
    }

    #[inline]
    fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Live counters of one bin
#[derive(Debug)]
pub struct BinStats {
    gets: AlignedCounter,
    hits: AlignedCounter,
    misses: AlignedCounter,
    invalidated: AtomicU64,
    lazy_deletes: AtomicU64,
    sets: AtomicU64,
    preventive_deletes: AtomicU64,
    floor_bumps: AtomicU64,
    bulk_deletes: AtomicU64,
    bulk_deleted_keys: AtomicU64,
    key_deletes: AtomicU64,
    created_at: Instant,
}

impl BinStats {
    pub fn new() -> Self {
        Self {
            gets: AlignedCounter::default(),
            hits: AlignedCounter::default(),
            misses: AlignedCounter::default(),
            invalidated: AtomicU64::new(0),
            lazy_deletes: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            preventive_deletes: AtomicU64::new(0),
            floor_bumps: AtomicU64::new(0),
            bulk_deletes: AtomicU64::new(0),
            bulk_deleted_keys: AtomicU64::new(0),
            key_deletes: AtomicU64::new(0),
            created_at: Instant::now(),
        }
    }

    /// Record the outcome of reading `requested` ids
    ///
    /// `invalidated` counts entries that existed but were expired, flushed
    /// or undecodable.
    #[inline]
    pub fn record_reads(&self, requested: u64, hits: u64, invalidated: u64) {
        self.gets.add(requested);
        self.hits.add(hits);
        self.misses.add(requested.saturating_sub(hits));
        if invalidated > 0 {
            self.invalidated.fetch_add(invalidated, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_lazy_deletes(&self, keys: u64) {
        self.lazy_deletes.fetch_add(keys, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_sets(&self, count: u64) {
        self.sets.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_preventive_deletes(&self, count: u64) {
        self.preventive_deletes.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_floor_bump(&self) {
        self.floor_bumps.fetch_add(1, Ordering::Relaxed);
    }

    /// One server-side scan-delete that removed `keys` entries
    #[inline]
    pub fn record_bulk_delete(&self, keys: u64) {
        self.bulk_deletes.fetch_add(1, Ordering::Relaxed);
        self.bulk_deleted_keys.fetch_add(keys, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_key_deletes(&self, count: u64) {
        self.key_deletes.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> BinStatsSnapshot {
        BinStatsSnapshot {
            gets: self.gets.get(),
            hits: self.hits.get(),
            misses: self.misses.get(),
            invalidated: self.invalidated.load(Ordering::Relaxed),
            lazy_deletes: self.lazy_deletes.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            preventive_deletes: self.preventive_deletes.load(Ordering::Relaxed),
            floor_bumps: self.floor_bumps.load(Ordering::Relaxed),
            bulk_deletes: self.bulk_deletes.load(Ordering::Relaxed),
            bulk_deleted_keys: self.bulk_deleted_keys.load(Ordering::Relaxed),
            key_deletes: self.key_deletes.load(Ordering::Relaxed),
            uptime: self.created_at.elapsed(),
        }
    }
}

impl Default for BinStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`BinStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BinStatsSnapshot {
    pub gets: u64,
    pub hits: u64,
    pub misses: u64,
    /// Entries found in the store but expired, flushed or corrupt
    pub invalidated: u64,
    pub lazy_deletes: u64,
    pub sets: u64,
    /// Writes replaced by a delete because the expiry had already passed
    pub preventive_deletes: u64,
    pub floor_bumps: u64,
    pub bulk_deletes: u64,
    pub bulk_deleted_keys: u64,
    pub key_deletes: u64,
    pub uptime: Duration,
}

impl BinStatsSnapshot {
    pub fn hit_rate(&self) -> f64 {
        if self.gets == 0 {
            0.0
        } else {
            self.hits as f64 / self.gets as f64
        }
    }

    pub fn miss_rate(&self) -> f64 {
        if self.gets == 0 {
            0.0
        } else {
            self.misses as f64 / self.gets as f64
        }
    }
}
