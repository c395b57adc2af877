//! Logical clock markers for flush ordering
//!
//! Wall-clock seconds alone cannot order a flush against a write that lands
//! in the same second. A [`Marker`] pairs the seconds with an intra-second
//! sequence number, rendered as `SECONDS.SEQ` with `SEQ` zero-padded to three
//! digits, so both entry creation stamps and flush floors are totally ordered.
//!
//! The sequence has a ceiling of 1000 ticks per second per bin. Past that the
//! clock keeps counting (`S.1000`, `S.1001`, ...) and logs a warning; markers
//! still compare correctly, but the textual form loses its fixed width and
//! concurrent writers in other processes may collide with it.

use crate::error::{CacheError, CacheResult};
use std::{
    fmt,
    str::FromStr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{SystemTime, UNIX_EPOCH},
};
use tracing::warn;

/// Highest sequence number that fits the three-digit textual form
pub const MAX_SEQUENCE: u32 = 999;

/// A `seconds.sequence` logical clock value
///
/// Ordering compares seconds first and breaks ties on the sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Marker {
    seconds: u64,
    sequence: u32,
}

impl Marker {
    /// The "never flushed" marker
    pub const ZERO: Self = Self {
        seconds: 0,
        sequence: 0,
    };

    pub const fn new(seconds: u64, sequence: u32) -> Self {
        Self { seconds, sequence }
    }

    /// First marker of the given second (`SECONDS.000`)
    pub const fn at(seconds: u64) -> Self {
        Self::new(seconds, 0)
    }

    pub const fn seconds(&self) -> u64 {
        self.seconds
    }

    pub const fn sequence(&self) -> u32 {
        self.sequence
    }

    pub const fn is_zero(&self) -> bool {
        self.seconds == 0 && self.sequence == 0
    }

    /// Parse a stored value, treating absent or empty input as [`Marker::ZERO`]
    pub fn parse_or_zero(value: Option<&str>) -> CacheResult<Self> {
        match value.map(str::trim) {
            None | Some("") => Ok(Self::ZERO),
            Some(text) => text.parse(),
        }
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:03}", self.seconds, self.sequence)
    }
}

impl FromStr for Marker {
    type Err = CacheError;

    /// Accepts `SECONDS.SEQ` and bare `SECONDS` (values written before the
    /// sequence existed).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CacheError::InvalidMarker(s.to_string());
        let text = s.trim();

        let (seconds, sequence) = match text.split_once('.') {
            Some((seconds, sequence)) => (seconds, Some(sequence)),
            None => (text, None),
        };

        if seconds.is_empty() || !seconds.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let seconds = seconds.parse::<u64>().map_err(|_| invalid())?;

        let sequence = match sequence {
            None => 0,
            Some(seq) if !seq.is_empty() && seq.bytes().all(|b| b.is_ascii_digit()) => {
                seq.parse::<u32>().map_err(|_| invalid())?
            }
            Some(_) => return Err(invalid()),
        };

        Ok(Self::new(seconds, sequence))
    }
}

/// Source of wall-clock seconds
pub trait TimeSource: Send + Sync + fmt::Debug {
    /// Current Unix time in whole seconds
    fn now_secs(&self) -> u64;
}

/// Reads the system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now_secs(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

/// Manually driven clock; clones share the same time
#[derive(Debug, Clone, Default)]
pub struct ManualTimeSource {
    now: Arc<AtomicU64>,
}

impl ManualTimeSource {
    pub fn new(now_secs: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(now_secs)),
        }
    }

    pub fn set(&self, now_secs: u64) {
        self.now.store(now_secs, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTimeSource {
    fn now_secs(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Compute the marker that follows `previous` at wall-clock second `now`
///
/// A clock that reads behind `previous` (skew between processes) is handled
/// like the same second: the sequence advances so the result stays strictly
/// greater.
pub fn next_marker(previous: Option<Marker>, now: u64) -> Marker {
    let Some(previous) = previous else {
        return Marker::at(now);
    };

    if now > previous.seconds {
        return Marker::at(now);
    }

    let sequence = previous.sequence.saturating_add(1);
    if sequence > MAX_SEQUENCE {
        warn!(
            seconds = previous.seconds,
            sequence, "logical clock exceeded {MAX_SEQUENCE} ticks in one second"
        );
    }
    Marker::new(previous.seconds, sequence)
}

/// Logical clock bound to a time source
#[derive(Debug, Clone)]
pub struct LogicalClock {
    time: Arc<dyn TimeSource>,
}

impl LogicalClock {
    pub fn new(time: Arc<dyn TimeSource>) -> Self {
        Self { time }
    }

    pub fn system() -> Self {
        Self::new(Arc::new(SystemTimeSource))
    }

    pub fn now_secs(&self) -> u64 {
        self.time.now_secs()
    }

    /// Strictly greater than `previous`
    pub fn next(&self, previous: Option<Marker>) -> Marker {
        next_marker(previous, self.now_secs())
    }

    /// Creation stamp for an entry written under `floor`
    ///
    /// Never below the floor: a write in the same second as a flush reuses
    /// the floor marker itself, which is valid (`created == floor`).
    pub fn created_marker(&self, floor: Marker) -> Marker {
        floor.max(Marker::at(self.now_secs()))
    }
}

impl Default for LogicalClock {
    fn default() -> Self {
        Self::system()
    }
}
