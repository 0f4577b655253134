//! Translation lookaside buffers.
//!
//! Every translation level implements [`Translator`]: given a request it
//! returns the physical page number, delegating misses to the level below
//! and caching the result. A core's chain is an L1 [`CommonTlb`] over an L2
//! [`CommonTlb`] (optionally fronted by a [`ClusterTlb`]) over the
//! page-table walker.

/// Slot array with free list and reverse maps.
pub mod array;

/// Clustered TLB.
pub mod cluster;

/// Plain LRU TLB.
pub mod common;

/// TLB entries and flags.
pub mod entry;

pub use array::TlbArray;
pub use cluster::{ClusterInsert, ClusterTlb};
pub use common::CommonTlb;
pub use entry::{ClusterTlbEntry, SubPage, TlbEntry, TlbFlags, TlbRecord};

use crate::common::{Address, MemReq, Result};
use crate::config::Config;
use serde::Serialize;

/// One level of address translation.
pub trait Translator: Send + Sync {
    /// Name used in diagnostics and statistics.
    fn name(&self) -> &str;

    /// Translates `req`, advancing `req.cycle` by the time taken and
    /// copying the page's dirty/shared state onto it.
    ///
    /// # Returns
    ///
    /// The physical page number of the request's page.
    fn translate(&self, req: &mut MemReq) -> Result<Address>;
}

/// Address geometry and timing switch shared by every TLB.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TlbGeometry {
    pub page_shift: u32,
    pub line_shift: u32,
    /// When `false`, TLBs keep state but charge no latency.
    pub timing_mode: bool,
}

impl TlbGeometry {
    pub fn from_config(config: &Config) -> Self {
        Self {
            page_shift: config.paging.page_shift,
            line_shift: config.paging.line_shift(),
            timing_mode: config.general.timing_mode,
        }
    }
}

/// Counters of one TLB.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TlbStats {
    pub accesses: u64,
    pub hits: u64,
    /// Misses, each followed by an insert.
    pub misses: u64,
    pub evictions: u64,
    /// Clustered TLB only: mappings handed to the regular TLB.
    pub bypasses: u64,
}

impl TlbStats {
    /// Hit rate in percent.
    pub fn hit_rate(&self) -> f64 {
        if self.accesses == 0 {
            0.0
        } else {
            self.hits as f64 / self.accesses as f64 * 100.0
        }
    }

    /// Adds `other` into `self`.
    pub fn merge(&mut self, other: &TlbStats) {
        self.accesses += other.accesses;
        self.hits += other.hits;
        self.misses += other.misses;
        self.evictions += other.evictions;
        self.bypasses += other.bypasses;
    }
}
