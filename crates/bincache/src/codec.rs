//! Entry encoding and decoding
//!
//! [`EntryCodec`] turns a payload plus its metadata into the [`WireEntry`]
//! record that the store persists, and back. Structured payloads go through
//! a pluggable [`PayloadCodec`]; an optional [`CompressionStage`] deflates
//! large payload bytes after serialization and inflates flagged ones before
//! deserialization.
//!
//! Decoding never fails loudly. Any record that is incomplete, corrupt, or
//! does not deserialize comes back as `None`, which the read path treats as
//! a miss and cleans up.

use crate::{
    clock::Marker,
    entry::{CacheEntry, Expire, Payload},
    error::{CacheError, CacheResult},
    store::{WireEntry, fields},
};
use bytes::Bytes;
use flate2::{Compression, read::ZlibDecoder, write::ZlibEncoder};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    io::{Read, Write},
    sync::Arc,
};
use tracing::debug;

/// Serializer for structured payloads
pub trait PayloadCodec: Send + Sync + fmt::Debug {
    fn serialize(&self, value: &serde_json::Value) -> CacheResult<Vec<u8>>;
    fn deserialize(&self, bytes: &[u8]) -> CacheResult<serde_json::Value>;
}

/// JSON payload serialization
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl PayloadCodec for JsonCodec {
    fn serialize(&self, value: &serde_json::Value) -> CacheResult<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| CacheError::Serialization(e.to_string()))
    }

    fn deserialize(&self, bytes: &[u8]) -> CacheResult<serde_json::Value> {
        serde_json::from_slice(bytes).map_err(|e| CacheError::Deserialization(e.to_string()))
    }
}

/// Deflates payload bytes above a size threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionStage {
    /// Payloads up to this many bytes are stored uncompressed
    pub threshold_bytes: usize,
    /// zlib level, 0-9
    pub level: u32,
}

impl Default for CompressionStage {
    fn default() -> Self {
        Self {
            threshold_bytes: 100,
            level: 1,
        }
    }
}

impl CompressionStage {
    pub fn new(threshold_bytes: usize, level: u32) -> Self {
        Self {
            threshold_bytes,
            level: level.min(9),
        }
    }

    /// `None` when the data is small enough to store as-is
    pub fn compress(&self, data: &[u8]) -> CacheResult<Option<Vec<u8>>> {
        if data.len() <= self.threshold_bytes {
            return Ok(None);
        }

        let mut encoder = ZlibEncoder::new(
            Vec::with_capacity(data.len() / 2),
            Compression::new(self.level),
        );
        encoder
            .write_all(data)
            .map_err(|e| CacheError::Compression(e.to_string()))?;
        encoder
            .finish()
            .map(Some)
            .map_err(|e| CacheError::Compression(e.to_string()))
    }

    pub fn decompress(data: &[u8]) -> CacheResult<Vec<u8>> {
        let mut decoder = ZlibDecoder::new(data);
        let mut out = Vec::with_capacity(data.len() * 4);
        decoder
            .read_to_end(&mut out)
            .map_err(|e| CacheError::Compression(e.to_string()))?;
        Ok(out)
    }
}

/// Builds and parses wire records
#[derive(Debug, Clone)]
pub struct EntryCodec {
    payload: Arc<dyn PayloadCodec>,
    compression: Option<CompressionStage>,
}

impl Default for EntryCodec {
    fn default() -> Self {
        Self::new(Arc::new(JsonCodec))
    }
}

impl EntryCodec {
    pub fn new(payload: Arc<dyn PayloadCodec>) -> Self {
        Self {
            payload,
            compression: None,
        }
    }

    pub fn with_compression(mut self, stage: CompressionStage) -> Self {
        self.compression = Some(stage);
        self
    }

    pub fn compression(&self) -> Option<&CompressionStage> {
        self.compression.as_ref()
    }

    pub fn encode(
        &self,
        id: &str,
        payload: &Payload,
        expire: Expire,
        created: Marker,
    ) -> CacheResult<WireEntry> {
        let (data, serialized) = match payload {
            Payload::Raw(bytes) => (bytes.clone(), false),
            Payload::Structured(value) => (Bytes::from(self.payload.serialize(value)?), true),
        };

        let mut wire = WireEntry::new()
            .with(fields::ID, id.to_string())
            .with(fields::CREATED, created.to_string())
            .with(fields::EXPIRE, expire.to_wire())
            .with(fields::SERIALIZED, flag(serialized))
            .with(fields::VOLATILE, flag(expire.is_volatile()));

        match self.compression.map(|stage| stage.compress(&data)).transpose()? {
            Some(Some(compressed)) => {
                wire.insert(fields::DATA, compressed);
                wire.insert(fields::COMPRESSED, flag(true));
            }
            _ => wire.insert(fields::DATA, data),
        }

        Ok(wire)
    }

    pub fn decode(&self, wire: &WireEntry) -> Option<CacheEntry> {
        let id = match wire.get_str(fields::ID) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                debug!("discarding record without identity");
                return None;
            }
        };

        let created = match wire.get_str(fields::CREATED).map(str::parse::<Marker>) {
            Some(Ok(created)) => created,
            _ => {
                debug!(id = %id, "discarding record with unreadable creation marker");
                return None;
            }
        };

        // Records written without an expire field predate it and were permanent
        let expire = match wire.get_str(fields::EXPIRE) {
            None => Expire::Permanent,
            Some(value) => match Expire::from_wire(value) {
                Some(expire) => expire,
                None => {
                    debug!(id = %id, expire = %value, "discarding record with unreadable expiry");
                    return None;
                }
            },
        };

        let mut data = wire.get(fields::DATA).cloned().unwrap_or_default();
        if !data.is_empty() && wire.flag(fields::COMPRESSED) {
            match CompressionStage::decompress(&data) {
                Ok(inflated) => data = Bytes::from(inflated),
                Err(e) => {
                    debug!(id = %id, error = %e, "discarding record that failed to inflate");
                    return None;
                }
            }
        }

        let payload = if wire.flag(fields::SERIALIZED) {
            match self.payload.deserialize(&data) {
                Ok(value) => Payload::Structured(value),
                Err(e) => {
                    debug!(id = %id, error = %e, "discarding record that failed to deserialize");
                    return None;
                }
            }
        } else {
            Payload::Raw(data)
        };

        Some(CacheEntry {
            id,
            data: payload,
            created,
            expire,
            volatile: wire.flag(fields::VOLATILE),
        })
    }
}

fn flag(value: bool) -> &'static str {
    if value { "1" } else { "0" }
}
