//! Namespaced cache bins with lazy flush-floor invalidation
//!
//! This crate turns a remote key-value store that only knows per-key TTLs into
//! a set of independently wipeable cache bins. Flushing a bin, a prefix of a
//! bin, or only its temporary entries does not require scanning the store:
//! every bin keeps two logical-clock markers (the *flush floors*) and any
//! entry created before the floor that applies to it is treated as gone.
//!
//! # Features
//!
//! - **Same-Second Safety**: `seconds.sequence` markers order writes and
//!   flushes that happen within one wall-clock second
//! - **Flush Modes**: per-bin policy choosing between lazy floor bumps and
//!   eager server-side deletes
//! - **Batched I/O**: multi-key reads, writes and deletes are one round trip
//! - **Corruption Tolerant**: undecodable entries read as misses and are
//!   cleaned up
//! - **Pluggable Storage**: any [`KeyValueStore`]; an in-process
//!   [`MemoryStore`] ships with the crate
//! - **Optional Compression**: zlib stage for large payloads
//! - **Metrics**: per-bin counters, exportable to Prometheus with the
//!   `metrics` feature
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │               CacheBin                   │
//! │   get / get_multiple / set / clear       │
//! └──────────────────────────────────────────┘
//!      │             │              │
//! ┌──────────┐ ┌────────────┐ ┌─────────────┐
//! │  Entry   │ │ FloorStore │ │ FlushMode   │
//! │  Codec   │ │ + Logical  │ │ policy      │
//! │          │ │   Clock    │ │             │
//! └──────────┘ └────────────┘ └─────────────┘
//!      │             │
//! ┌──────────────────────────────────────────┐
//! │        KeyValueStore adapter             │
//! │   MemoryStore | Redis | ...              │
//! └──────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust
//! use bincache::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> CacheResult<()> {
//! let store = Arc::new(MemoryStore::new());
//! let settings = CacheSettings::new().with_perm_ttl("1 week");
//! let bin = CacheBin::from_settings(&settings, "cache_page", store)?;
//!
//! bin.set("node:1", "rendered page", Expire::Temporary).await?;
//! assert!(bin.get("node:1").await?.is_some());
//!
//! // Drop every id starting with "node:"
//! bin.clear_args(Some("node:"), true).await?;
//! assert!(bin.get("node:1").await?.is_none());
//! # Ok(())
//! # }
//! ```
//!
//! # Clear Calls
//!
//! | Call | Meaning |
//! |---|---|
//! | `clear_args(None, false)` | drop temporary entries |
//! | `clear_args(Some("*"), true)` | wipe the bin |
//! | `clear_args(Some(prefix), true)` | drop ids starting with `prefix` |
//! | `clear_args(Some(id), false)` | drop one entry |
//!
//! How each call is carried out depends on the bin's [`FlushMode`]; see the
//! [`policy`] module. In [`FlushMode::Never`] a prefix clear invalidates the
//! whole bin, because floors cannot be tracked per prefix.

#![allow(clippy::return_self_not_must_use)] // Builder patterns
#![allow(clippy::float_cmp)] // Statistics need exact float comparisons

pub mod bin;
pub mod clock;
pub mod codec;
pub mod config;
pub mod entry;
pub mod error;
pub mod floors;
pub mod keyspace;
pub mod memory_store;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod policy;
pub mod stats;
pub mod store;
pub mod ttl;

pub use bin::{CacheBin, CacheItem, MultiGet};
pub use clock::{LogicalClock, ManualTimeSource, Marker, SystemTimeSource, TimeSource};
pub use codec::{CompressionStage, EntryCodec, JsonCodec, PayloadCodec};
pub use config::{BinConfig, CacheSettings, TtlSetting};
pub use entry::{CacheEntry, Expire, Payload, Validity};
pub use error::{CacheError, CacheResult};
pub use floors::{FloorStore, FlushFloors};
pub use keyspace::KeySpace;
pub use memory_store::{MemoryStore, StoreCalls};
#[cfg(feature = "metrics")]
pub use metrics::PrometheusExporter;
pub use policy::{ClearRequest, FlushAction, FlushMode};
pub use stats::{BinStats, BinStatsSnapshot};
pub use store::{CounterPair, KeyValueStore, StoreWrite, WireEntry};

pub mod prelude {
    //! Convenient re-exports of commonly used types and traits

    pub use crate::{
        bin::{CacheBin, CacheItem, MultiGet},
        clock::{ManualTimeSource, Marker, TimeSource},
        config::{BinConfig, CacheSettings},
        entry::{CacheEntry, Expire, Payload},
        error::{CacheError, CacheResult},
        memory_store::MemoryStore,
        policy::{ClearRequest, FlushMode},
        store::KeyValueStore,
    };
}
