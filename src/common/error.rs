//! Error types.
//!
//! Only fatal simulation conditions and explicitly unsupported operations
//! are errors. Translation misses are reported as `None` and handled by the
//! next resolution step.

use super::Address;
use crate::paging::PagingStyle;
use thiserror::Error;

/// Errors raised by translation structures and the simulation driver.
#[derive(Debug, Error)]
pub enum VmError {
    /// The page-frame allocator returned no page where one is required.
    #[error("{structure}: cannot allocate a page for {operation} at {addr:#x}")]
    OutOfFrames {
        structure: &'static str,
        operation: &'static str,
        addr: Address,
    },

    /// A cuckoo insertion displaced entries through every table.
    #[error("cuckoo insertion of vpn {vpn:#x} exhausted all {ways} tables")]
    CuckooExhausted { vpn: Address, ways: usize },

    /// Multi-page removal requested at an address not aligned to the level.
    #[error("address {addr:#x} is not aligned to {granularity:#x}")]
    Misaligned { addr: Address, granularity: u64 },

    /// Open addressing found no free slot.
    #[error("{structure}: no free slot for vpn {vpn:#x}")]
    TableFull {
        structure: &'static str,
        vpn: Address,
    },

    /// A directory entry points at a page, or a leaf at a table.
    #[error("{structure}: inconsistent entry on the path to {addr:#x}")]
    Inconsistent {
        structure: &'static str,
        addr: Address,
    },

    /// Operation is declared for this structure but not implemented.
    #[error("{structure}: {operation} is not supported")]
    Unsupported {
        structure: &'static str,
        operation: &'static str,
    },

    /// Paging style has no implementation.
    #[error("paging style {0:?} is not implemented")]
    UnsupportedStyle(PagingStyle),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Malformed trace input.
    #[error("trace line {line}: {reason}")]
    Trace { line: usize, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, VmError>;
