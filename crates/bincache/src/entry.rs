//! Cache entry model and validity rules

use crate::{
    clock::Marker,
    error::{CacheError, CacheResult},
    floors::FlushFloors,
};
use bytes::Bytes;
use serde::{Serialize, de::DeserializeOwned};
use std::fmt;

/// Wire sentinel for [`Expire::Permanent`]
pub const EXPIRE_PERMANENT: i64 = 0;
/// Wire sentinel for [`Expire::Temporary`]
pub const EXPIRE_TEMPORARY: i64 = -1;
/// Latest absolute expiry produced from a relative TTL
pub const MAX_EXPIRE_AT: u64 = i64::MAX as u64;

/// Expiry requested for an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Expire {
    /// No absolute expiry; invalidated only by the permanent floor or TTL
    Permanent,
    /// No absolute expiry; also invalidated by temporary flushes
    Temporary,
    /// Absolute Unix timestamp in seconds
    At(u64),
}

impl Expire {
    /// Entries flagged volatile follow the volatile floor
    pub fn is_volatile(self) -> bool {
        matches!(self, Self::Temporary)
    }

    /// `true` once a concrete timestamp is at or before `now`
    pub fn is_expired_at(self, now: u64) -> bool {
        matches!(self, Self::At(at) if at <= now)
    }

    pub fn to_wire(self) -> String {
        match self {
            Self::Permanent => EXPIRE_PERMANENT.to_string(),
            Self::Temporary => EXPIRE_TEMPORARY.to_string(),
            Self::At(at) => at.to_string(),
        }
    }

    /// Negative values other than the temporary sentinel decode as an
    /// already-past timestamp.
    pub fn from_wire(value: &str) -> Option<Self> {
        let value = value.trim();
        if let Ok(at) = value.parse::<u64>() {
            return Some(if at == 0 { Self::Permanent } else { Self::At(at) });
        }
        match value.parse::<i64>().ok()? {
            EXPIRE_PERMANENT => Some(Self::Permanent),
            EXPIRE_TEMPORARY => Some(Self::Temporary),
            _ => Some(Self::At(0)),
        }
    }
}

impl fmt::Display for Expire {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Permanent => f.write_str("permanent"),
            Self::Temporary => f.write_str("temporary"),
            Self::At(at) => write!(f, "at {at}"),
        }
    }
}

/// Cached value
///
/// Raw payloads are stored as-is. Structured payloads go through the bin's
/// payload codec and are flagged `serialized` on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Raw(Bytes),
    Structured(serde_json::Value),
}

impl Payload {
    pub fn json<T: Serialize + ?Sized>(value: &T) -> CacheResult<Self> {
        serde_json::to_value(value)
            .map(Self::Structured)
            .map_err(|e| CacheError::Serialization(e.to_string()))
    }

    pub fn is_serialized(&self) -> bool {
        matches!(self, Self::Structured(_))
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Raw(bytes) => Some(bytes),
            Self::Structured(_) => None,
        }
    }

    /// Raw payload as UTF-8 text
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    pub fn as_value(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Structured(value) => Some(value),
            Self::Raw(_) => None,
        }
    }
}

impl From<Bytes> for Payload {
    fn from(bytes: Bytes) -> Self {
        Self::Raw(bytes)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Raw(Bytes::from(bytes))
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::Raw(Bytes::copy_from_slice(text.as_bytes()))
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self::Raw(Bytes::from(text))
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Self::Structured(value)
    }
}

/// A decoded cache entry
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub id: String,
    pub data: Payload,
    pub created: Marker,
    pub expire: Expire,
    pub volatile: bool,
}

/// Outcome of checking an entry against expiry and flush floors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    Valid,
    /// Absolute expiry reached
    Expired,
    /// Created before the applicable flush floor
    Flushed,
}

impl CacheEntry {
    pub fn validity(&self, floors: &FlushFloors, now: u64) -> Validity {
        if self.expire.is_expired_at(now) {
            Validity::Expired
        } else if self.created < floors.applicable(self.volatile) {
            Validity::Flushed
        } else {
            Validity::Valid
        }
    }

    pub fn is_valid(&self, floors: &FlushFloors, now: u64) -> bool {
        self.validity(floors, now) == Validity::Valid
    }

    /// Deserialize the payload into `T`
    ///
    /// Structured payloads convert directly; raw payloads are parsed as JSON.
    pub fn data_as<T: DeserializeOwned>(&self) -> CacheResult<T> {
        match &self.data {
            Payload::Structured(value) => Ok(T::deserialize(value)?),
            Payload::Raw(bytes) => Ok(serde_json::from_slice(bytes)?),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
#[allow(clippy::expect_used)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    fn entry(expire: Expire, created: Marker) -> CacheEntry {
        CacheEntry {
            id: "x".to_string(),
            data: Payload::from("v"),
            created,
            expire,
            volatile: expire.is_volatile(),
        }
    }

    #[test]
    fn test_expire_wire_forms() {
        assert_eq!(Expire::Permanent.to_wire(), "0");
        assert_eq!(Expire::Temporary.to_wire(), "-1");
        assert_eq!(Expire::At(1_700_000_000).to_wire(), "1700000000");

        assert_eq!(Expire::from_wire("0"), Some(Expire::Permanent));
        assert_eq!(Expire::from_wire("-1"), Some(Expire::Temporary));
        assert_eq!(Expire::from_wire("42"), Some(Expire::At(42)));
        assert_eq!(Expire::from_wire("-7"), Some(Expire::At(0)));
        assert_eq!(Expire::from_wire("soon"), None);
    }

    #[test]
    fn test_expire_beyond_signed_range_round_trips() {
        for at in [MAX_EXPIRE_AT, MAX_EXPIRE_AT + 1, u64::MAX] {
            let expire = Expire::At(at);
            assert_eq!(Expire::from_wire(&expire.to_wire()), Some(expire));
        }
    }

    #[test]
    fn test_expiry_is_inclusive() {
        assert!(Expire::At(100).is_expired_at(100));
        assert!(Expire::At(100).is_expired_at(101));
        assert!(!Expire::At(100).is_expired_at(99));
        assert!(!Expire::Permanent.is_expired_at(u64::MAX));
        assert!(!Expire::Temporary.is_expired_at(u64::MAX));
    }

    #[test]
    fn test_validity_against_floors() {
        let floors = FlushFloors::new(Marker::new(100, 1), Marker::new(100, 3));

        // Equal to the floor is valid
        assert_eq!(
            entry(Expire::Permanent, Marker::new(100, 1)).validity(&floors, 100),
            Validity::Valid
        );
        assert_eq!(
            entry(Expire::Permanent, Marker::new(100, 0)).validity(&floors, 100),
            Validity::Flushed
        );
        // Volatile entries use the volatile floor
        assert_eq!(
            entry(Expire::Temporary, Marker::new(100, 2)).validity(&floors, 100),
            Validity::Flushed
        );
        assert_eq!(
            entry(Expire::Temporary, Marker::new(100, 3)).validity(&floors, 100),
            Validity::Valid
        );
        // Expiry is checked before floors
        assert_eq!(
            entry(Expire::At(90), Marker::new(100, 5)).validity(&floors, 100),
            Validity::Expired
        );
        assert!(entry(Expire::At(200), Marker::new(100, 5)).is_valid(&floors, 100));
    }

    #[test]
    fn test_payload_conversions() {
        assert_eq!(Payload::from("abc").as_str(), Some("abc"));
        assert_eq!(Payload::from(vec![1u8, 2]).as_bytes().map(Bytes::len), Some(2));
        assert!(!Payload::from("abc").is_serialized());

        let structured = Payload::json(&vec![1, 2, 3]).unwrap();
        assert!(structured.is_serialized());
        assert_eq!(structured.as_value(), Some(&json!([1, 2, 3])));
        assert_eq!(structured.as_bytes(), None);
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Node {
        nid: u32,
        title: String,
    }

    #[test]
    fn test_data_as() {
        let node = Node {
            nid: 7,
            title: "Hello".to_string(),
        };
        let mut cached = entry(Expire::Permanent, Marker::at(1));
        cached.data = Payload::json(&node).unwrap();
        assert_eq!(cached.data_as::<Node>().unwrap(), node);

        cached.data = Payload::from(r#"{"nid":8,"title":"Raw"}"#);
        assert_eq!(cached.data_as::<Node>().unwrap().nid, 8);

        cached.data = Payload::from("not json");
        assert!(cached.data_as::<Node>().is_err());
    }
}
