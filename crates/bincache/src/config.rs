//! Cache configuration structures
//!
//! [`CacheSettings`] holds site-wide settings as they come from a settings
//! file. [`CacheSettings::resolve`] folds them, together with any per-bin
//! overrides, into the [`BinConfig`] a single bin runs with.

use crate::{
    codec::CompressionStage,
    error::{CacheError, CacheResult},
    keyspace::validate_segment,
    policy::FlushMode,
    ttl::{PERM_TTL_DEFAULT, parse_ttl},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// A TTL given either as seconds or as a human-readable expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TtlSetting {
    Seconds(u64),
    Text(String),
}

impl TtlSetting {
    pub fn seconds(&self) -> CacheResult<u64> {
        match self {
            Self::Seconds(seconds) => Ok(*seconds),
            Self::Text(text) => parse_ttl(text),
        }
    }
}

impl From<u64> for TtlSetting {
    fn from(seconds: u64) -> Self {
        Self::Seconds(seconds)
    }
}

impl From<&str> for TtlSetting {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

fn default_temporary_flush_bins() -> Vec<String> {
    vec!["cache_page".to_string(), "cache_block".to_string()]
}

/// Site-wide cache settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Global maximum cache lifetime in seconds; `0` disables it and
    /// negative values are ignored
    pub cache_lifetime: i64,
    /// Site-wide flush mode code
    pub flush_mode: Option<i64>,
    /// Per-bin flush mode codes
    pub bin_flush_modes: HashMap<String, i64>,
    /// Site-wide TTL of permanent entries
    pub perm_ttl: Option<TtlSetting>,
    /// Per-bin TTL of permanent entries
    pub bin_perm_ttls: HashMap<String, TtlSetting>,
    /// Global key prefix shared by every bin
    pub key_prefix: Option<String>,
    /// Per-bin key prefixes; `null` means no prefix for that bin
    pub bin_key_prefixes: HashMap<String, Option<String>>,
    /// Bins that default to [`FlushMode::Temporary`]
    pub temporary_flush_bins: Vec<String>,
    /// Compress large payloads in every bin
    pub compression: Option<CompressionStage>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            cache_lifetime: 0,
            flush_mode: None,
            bin_flush_modes: HashMap::new(),
            perm_ttl: None,
            bin_perm_ttls: HashMap::new(),
            key_prefix: None,
            bin_key_prefixes: HashMap::new(),
            temporary_flush_bins: default_temporary_flush_bins(),
            compression: None,
        }
    }
}

impl CacheSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(json: &str) -> CacheResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| CacheError::InvalidConfiguration(format!("invalid cache settings: {e}")))
    }

    pub fn with_cache_lifetime(mut self, seconds: i64) -> Self {
        self.cache_lifetime = seconds;
        self
    }

    pub fn with_flush_mode(mut self, mode: FlushMode) -> Self {
        self.flush_mode = Some(mode.code());
        self
    }

    pub fn with_bin_flush_mode(mut self, bin: impl Into<String>, mode: FlushMode) -> Self {
        self.bin_flush_modes.insert(bin.into(), mode.code());
        self
    }

    pub fn with_perm_ttl(mut self, ttl: impl Into<TtlSetting>) -> Self {
        self.perm_ttl = Some(ttl.into());
        self
    }

    pub fn with_bin_perm_ttl(mut self, bin: impl Into<String>, ttl: impl Into<TtlSetting>) -> Self {
        self.bin_perm_ttls.insert(bin.into(), ttl.into());
        self
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    pub fn with_compression(mut self, stage: CompressionStage) -> Self {
        self.compression = Some(stage);
        self
    }

    /// Global maximum lifetime, if one is set
    pub fn max_lifetime(&self) -> Option<u64> {
        u64::try_from(self.cache_lifetime).ok().filter(|s| *s > 0)
    }

    /// Flush mode a bin runs with
    ///
    /// A global maximum lifetime already bounds staleness, so it forces
    /// [`FlushMode::Nothing`] regardless of any configured mode.
    pub fn flush_mode_for(&self, bin: &str) -> FlushMode {
        if self.max_lifetime().is_some() {
            return FlushMode::Nothing;
        }

        let code = self.bin_flush_modes.get(bin).copied().or(self.flush_mode);
        match code {
            Some(code) => FlushMode::from_code(code).unwrap_or_else(|| {
                warn!(bin = %bin, code, "unknown flush mode, using temporary");
                FlushMode::Temporary
            }),
            None if self.temporary_flush_bins.iter().any(|b| b == bin) => FlushMode::Temporary,
            None => FlushMode::Nothing,
        }
    }

    /// TTL of permanent entries in a bin
    pub fn perm_ttl_for(&self, bin: &str) -> u64 {
        let Some(setting) = self.bin_perm_ttls.get(bin).or(self.perm_ttl.as_ref()) else {
            return PERM_TTL_DEFAULT;
        };
        setting.seconds().unwrap_or_else(|e| {
            warn!(bin = %bin, error = %e, default = PERM_TTL_DEFAULT, "invalid permanent TTL, using default");
            PERM_TTL_DEFAULT
        })
    }

    /// TTL cap applied to every write in a bin; `0` means no cap
    pub fn max_ttl_for(&self, bin: &str) -> u64 {
        let perm_ttl = self.perm_ttl_for(bin);
        match self.max_lifetime() {
            Some(lifetime) => lifetime.min(perm_ttl),
            None => perm_ttl,
        }
    }

    pub fn key_prefix_for(&self, bin: &str) -> Option<String> {
        let prefix = match self.bin_key_prefixes.get(bin) {
            Some(prefix) => prefix.as_ref(),
            None => self.key_prefix.as_ref(),
        };
        prefix.filter(|p| !p.is_empty()).cloned()
    }

    pub fn resolve(&self, bin: &str) -> BinConfig {
        BinConfig {
            name: bin.to_string(),
            flush_mode: self.flush_mode_for(bin),
            max_ttl: self.max_ttl_for(bin),
            key_prefix: self.key_prefix_for(bin),
            compression: self.compression,
        }
    }
}

/// Resolved configuration of a single bin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinConfig {
    pub name: String,
    pub flush_mode: FlushMode,
    /// TTL cap in seconds applied to every write; `0` means no cap
    pub max_ttl: u64,
    pub key_prefix: Option<String>,
    pub compression: Option<CompressionStage>,
}

impl BinConfig {
    /// Bin with [`FlushMode::Nothing`], no TTL cap and no key prefix
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flush_mode: FlushMode::Nothing,
            max_ttl: 0,
            key_prefix: None,
            compression: None,
        }
    }

    pub fn with_flush_mode(mut self, mode: FlushMode) -> Self {
        self.flush_mode = mode;
        self
    }

    pub fn with_max_ttl(mut self, seconds: u64) -> Self {
        self.max_ttl = seconds;
        self
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    pub fn with_compression(mut self, stage: CompressionStage) -> Self {
        self.compression = Some(stage);
        self
    }

    /// Cap a requested TTL; `None` means the store keeps the entry forever
    pub fn cap_ttl(&self, requested: Option<u64>) -> Option<u64> {
        match (self.max_ttl, requested.filter(|t| *t > 0)) {
            (0, requested) => requested,
            (cap, Some(requested)) => Some(requested.min(cap)),
            (cap, None) => Some(cap),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        validate_segment("bin name", &self.name)?;

        if let Some(prefix) = self.key_prefix.as_deref().filter(|p| !p.is_empty()) {
            validate_segment("key prefix", prefix)?;
        }

        if let Some(stage) = &self.compression
            && stage.level > 9
        {
            return Err("compression level must be between 0 and 9".to_string());
        }

        Ok(())
    }
}
