//! Flush-mode policy
//!
//! A bin's [`FlushMode`] decides how much physical deletion a clear call is
//! allowed to do. [`plan`] crosses the mode with the shape of the clear call
//! ([`ClearRequest`]) and yields the [`FlushAction`] the bin carries out.
//!
//! | Request \ Mode | Nothing | Temporary / All | Never |
//! |---|---|---|---|
//! | temporary sweep | bump volatile floor | delete volatile entries | bump volatile floor |
//! | everything | bump floors + delete all | bump floors + delete all | bump floors |
//! | prefix | delete prefix | delete prefix | bump floors |
//! | key(s) | delete keys | delete keys | delete keys |
//!
//! A prefix flush in `Never` mode invalidates the whole bin. Floors cannot be
//! tracked per prefix, so this over-invalidates rather than leaving stale
//! entries readable.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Id sentinel that, combined with the wildcard flag, wipes a whole bin
pub const WILDCARD_ALL: &str = "*";

/// How a bin reacts to clear calls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlushMode {
    /// Never sweep temporary entries; they are invalidated by the volatile floor
    #[default]
    Nothing,
    /// Eagerly delete volatile entries on a temporary sweep
    Temporary,
    /// Legacy code, same behavior as [`FlushMode::Temporary`]
    All,
    /// Never bulk-delete; every flush is a floor bump
    Never,
}

impl FlushMode {
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Nothing),
            1 => Some(Self::Temporary),
            2 => Some(Self::All),
            3 => Some(Self::Never),
            _ => None,
        }
    }

    pub const fn code(self) -> i64 {
        match self {
            Self::Nothing => 0,
            Self::Temporary => 1,
            Self::All => 2,
            Self::Never => 3,
        }
    }

    pub const fn allows_bulk_delete(self) -> bool {
        !matches!(self, Self::Never)
    }

    /// Whether a temporary sweep physically deletes volatile entries
    pub const fn sweeps_temporary(self) -> bool {
        matches!(self, Self::Temporary | Self::All)
    }
}

impl fmt::Display for FlushMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Nothing => "nothing",
            Self::Temporary => "temporary",
            Self::All => "all",
            Self::Never => "never",
        };
        f.write_str(name)
    }
}

/// Shape of a clear call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearRequest<'a> {
    /// No id: drop temporary entries
    Temporary,
    /// Wipe every entry of the bin
    Everything,
    /// Every entry whose id starts with the prefix
    Prefix(&'a str),
    /// One entry
    Key(&'a str),
    /// A list of entries
    Keys(&'a [String]),
    /// Ambiguous arguments; ignored
    Malformed,
}

impl<'a> ClearRequest<'a> {
    /// Classify the classic `(id, wildcard)` argument pair
    pub fn from_args(id: Option<&'a str>, wildcard: bool) -> Self {
        match (id, wildcard) {
            (None, false) => Self::Temporary,
            (None, true) | (Some(""), _) => Self::Malformed,
            (Some(WILDCARD_ALL), true) => Self::Everything,
            (Some(prefix), true) => Self::Prefix(prefix),
            (Some(id), false) => Self::Key(id),
        }
    }
}

/// What a bin must do to satisfy a clear call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushAction<'a> {
    /// Advance only the volatile floor
    BumpVolatileFloor,
    /// Delete every volatile entry of the bin
    DeleteVolatile,
    /// Advance both floors, optionally followed by a full delete
    BumpAllFloors { bulk_delete: bool },
    DeletePrefix(&'a str),
    DeleteKeys(Vec<&'a str>),
    Noop,
}

/// Decide how `mode` handles `request`
pub fn plan<'a>(mode: FlushMode, request: ClearRequest<'a>) -> FlushAction<'a> {
    match request {
        ClearRequest::Temporary if mode.sweeps_temporary() => FlushAction::DeleteVolatile,
        ClearRequest::Temporary => FlushAction::BumpVolatileFloor,
        ClearRequest::Everything => FlushAction::BumpAllFloors {
            bulk_delete: mode.allows_bulk_delete(),
        },
        ClearRequest::Prefix(_) if !mode.allows_bulk_delete() => FlushAction::BumpAllFloors {
            bulk_delete: false,
        },
        ClearRequest::Prefix(prefix) => FlushAction::DeletePrefix(prefix),
        ClearRequest::Key(id) => FlushAction::DeleteKeys(vec![id]),
        ClearRequest::Keys(ids) if ids.is_empty() => FlushAction::Noop,
        ClearRequest::Keys(ids) => FlushAction::DeleteKeys(ids.iter().map(String::as_str).collect()),
        ClearRequest::Malformed => FlushAction::Noop,
    }
}
