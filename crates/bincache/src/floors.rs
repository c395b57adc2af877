//! Per-bin flush floors
//!
//! A bin keeps two markers in a small record next to its entries: the
//! permanent floor and the volatile floor. An entry whose creation marker is
//! below the floor that applies to it is treated as flushed, whether or not
//! it still physically exists.
//!
//! Floors are read fresh for every bin operation. Caching them across
//! operations would let a read act on floors that a concurrent flush has
//! already moved.

use crate::{
    clock::{LogicalClock, Marker},
    error::CacheResult,
    store::KeyValueStore,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// `(permanent, volatile)` floor markers of one bin
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushFloors {
    pub permanent: Marker,
    pub volatile: Marker,
}

impl FlushFloors {
    pub const fn new(permanent: Marker, volatile: Marker) -> Self {
        Self {
            permanent,
            volatile,
        }
    }

    /// Floor for an entry with the given volatility
    ///
    /// Volatile entries are also subject to full flushes, so their floor is
    /// the later of the two markers.
    pub fn applicable(&self, volatile: bool) -> Marker {
        if volatile {
            self.permanent.max(self.volatile)
        } else {
            self.permanent
        }
    }

    pub fn latest(&self) -> Marker {
        self.permanent.max(self.volatile)
    }
}

/// Reads and advances the floor record of one bin
#[derive(Debug, Clone)]
pub struct FloorStore {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl FloorStore {
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current floors; missing slots read as [`Marker::ZERO`]
    pub async fn get(&self) -> CacheResult<FlushFloors> {
        let pair = self.store.get_counter_pair(&self.key).await?;
        Ok(FlushFloors::new(
            self.parse_slot(pair.first.as_deref()),
            self.parse_slot(pair.second.as_deref()),
        ))
    }

    /// Persist `marker` as the volatile floor, or as both floors
    pub async fn set(&self, marker: Marker, volatile_only: bool) -> CacheResult<()> {
        let value = marker.to_string();
        self.store
            .set_counter_pair(&self.key, &value, &value, volatile_only)
            .await
    }

    /// Move floors to a fresh marker and return the new floors
    ///
    /// The new marker is one tick past both the current floors and the first
    /// marker of the current second. Entries stamped earlier in this second
    /// therefore fall strictly below it, while entries written afterwards
    /// reuse it and stay valid.
    pub async fn advance(
        &self,
        clock: &LogicalClock,
        volatile_only: bool,
    ) -> CacheResult<FlushFloors> {
        let current = self.get().await?;
        let base = current.latest().max(Marker::at(clock.now_secs()));
        let marker = clock.next(Some(base));

        self.set(marker, volatile_only).await?;

        let floors = if volatile_only {
            FlushFloors::new(current.permanent, marker)
        } else {
            FlushFloors::new(marker, marker)
        };
        debug!(
            key = %self.key,
            permanent = %floors.permanent,
            volatile = %floors.volatile,
            volatile_only,
            "flush floors advanced"
        );
        Ok(floors)
    }

    fn parse_slot(&self, value: Option<&str>) -> Marker {
        Marker::parse_or_zero(value).unwrap_or_else(|err| {
            warn!(key = %self.key, error = %err, "unreadable flush floor, treating as never flushed");
            Marker::ZERO
        })
    }
}
