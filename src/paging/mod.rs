//! Page tables and the page-table walker.
//!
//! Three table organisations implement [`PageTableOps`]: a multi-level
//! radix tree ([`HierarchicalPaging`]), a flat open-addressing hash table
//! ([`HashPaging`]) and d-ary cuckoo tables ([`CuckooPaging`]). The
//! configured style selects one of them through [`Paging::new`]; the
//! result is shared by every core's walker behind a single lock.

/// d-ary cuckoo page table.
pub mod cuckoo;

/// Page table entry and its flags.
pub mod entry;

/// Flat open-addressing hash page table.
pub mod hash;

/// Keyed hash functions.
pub mod hasher;

/// Multi-level radix page table.
pub mod hierarchical;

/// Paging styles and per-level address decomposition.
pub mod mode;

/// Page-walk cache.
pub mod pw_cache;

/// Generic page table container.
pub mod table;

/// Walk timing and record chaining.
pub mod walk;

/// Page-table walker sitting below the last TLB level.
pub mod walker;

pub use cuckoo::CuckooPaging;
pub use entry::{EntryFlags, NextLevel, PageTableEntry};
pub use hash::HashPaging;
pub use hasher::HashFunction;
pub use hierarchical::HierarchicalPaging;
pub use mode::{LevelSpec, PagingStyle};
pub use pw_cache::{PageWalkCache, PwcArray, PwcStats};
pub use table::PageTable;
pub use walk::{load_page_tables, pgt_addr, WalkContext, WalkOrder};
pub use walker::{PageTableWalker, WalkerStats};

use crate::common::{Address, MemReq, Result, VmError};
use crate::config::Config;
use crate::mem::{PageAllocator, PageHandle};
use serde::Serialize;
use std::sync::{Arc, Mutex};

/// Timing and geometry shared by every table organisation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PagingParams {
    /// log2 of the page size used to place tables in physical memory.
    pub page_shift: u32,
    /// log2 of the cache line size; requests carry line addresses.
    pub line_shift: u32,
    /// Cycles per page-table memory access.
    pub mem_access_time: u64,
}

impl PagingParams {
    pub fn from_config(config: &Config) -> Self {
        Self {
            page_shift: config.paging.page_shift,
            line_shift: config.paging.line_shift(),
            mem_access_time: config.paging.mem_access_time,
        }
    }
}

/// Occupancy of one level, table or cuckoo way.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TableStats {
    pub name: String,
    /// Number of tables allocated at this level.
    pub tables: u64,
    /// Entries across those tables.
    pub capacity: u64,
    /// Present entries.
    pub live: u64,
    pub rehashes: u64,
}

/// Snapshot of a page table's statistics.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PagingStats {
    pub style: PagingStyle,
    pub mapped_pages: u64,
    pub tables: Vec<TableStats>,
    /// Pages that turned shared after having been remapped.
    pub error_migrated_pages: u64,
    /// Bytes of simulated memory occupied by the tables themselves.
    pub storage_bytes: u64,
}

/// Operations every page table organisation provides.
///
/// Mutating operations take `&mut self`; callers share a table through
/// [`SharedPaging`] and hold the lock for the whole operation.
pub trait PageTableOps {
    /// The style this table was built for.
    fn style(&self) -> PagingStyle;

    /// Maps the page containing `addr` to `page`.
    ///
    /// # Returns
    ///
    /// The latency of the mapping in cycles.
    fn map(&mut self, addr: Address, page: PageHandle) -> Result<u64>;

    /// Like `map`, and also records `req_id` as requester, marks the entry
    /// accessed, and dirty when `is_write`.
    fn map_for(&mut self, req_id: u32, addr: Address, page: PageHandle, is_write: bool) -> Result<u64>;

    /// Removes the mapping of the page containing `addr`.
    ///
    /// Returns `false` if nothing was mapped.
    fn unmap(&mut self, addr: Address) -> Result<bool>;

    /// Looks up the translation for `req`, charging one memory access per
    /// table entry touched to `req.cycle`.
    ///
    /// Returns the 4KB physical page number, or `None` on a miss.
    fn access(&mut self, req: &mut MemReq) -> Option<Address>;

    /// Looks up the translation for `req` and times the entry fetches as a
    /// page-table walk; `req.cycle` becomes the walk completion cycle.
    fn access_with_walk(&mut self, req: &mut MemReq, ctx: &WalkContext<'_>) -> Option<Address>;

    /// Pre-allocates the tables covering `[addr, addr + size)`.
    fn allocate_page_table(&mut self, addr: Address, size: u64) -> Result<()>;

    /// Releases the tables covering `[addr, addr + size)` and every page
    /// mapped through them.
    fn remove_page_table(&mut self, addr: Address, size: u64) -> Result<()>;

    fn stats(&self) -> PagingStats;
}

/// A page table of any supported organisation.
pub enum Paging {
    Hierarchical(HierarchicalPaging),
    Hash(HashPaging),
    Cuckoo(CuckooPaging),
}

/// A page table shared between cores.
pub type SharedPaging = Arc<Mutex<Paging>>;

impl Paging {
    /// Builds the table selected by `config.paging.style`.
    ///
    /// # Errors
    ///
    /// `UnsupportedStyle` for styles without an implementation, and
    /// `OutOfFrames` if the initial tables cannot be allocated.
    pub fn new(config: &Config, allocator: Arc<dyn PageAllocator>) -> Result<Self> {
        let params = PagingParams::from_config(config);
        let style = config.paging.style;
        match style {
            PagingStyle::HashNormal => Ok(Paging::Hash(HashPaging::new(&config.hash, allocator, params)?)),
            PagingStyle::HashChain => Err(VmError::UnsupportedStyle(style)),
            PagingStyle::CuckooNormal | PagingStyle::CuckooElastic => Ok(Paging::Cuckoo(CuckooPaging::new(
                style,
                &config.cuckoo,
                config.general.rng_seed,
                allocator,
                params,
            )?)),
            _ => Ok(Paging::Hierarchical(HierarchicalPaging::new(style, allocator, params)?)),
        }
    }

    /// Wraps the table for sharing between cores.
    pub fn shared(self) -> SharedPaging {
        Arc::new(Mutex::new(self))
    }

    fn ops(&self) -> &dyn PageTableOps {
        match self {
            Paging::Hierarchical(t) => t,
            Paging::Hash(t) => t,
            Paging::Cuckoo(t) => t,
        }
    }

    fn ops_mut(&mut self) -> &mut dyn PageTableOps {
        match self {
            Paging::Hierarchical(t) => t,
            Paging::Hash(t) => t,
            Paging::Cuckoo(t) => t,
        }
    }
}

impl PageTableOps for Paging {
    fn style(&self) -> PagingStyle {
        self.ops().style()
    }

    fn map(&mut self, addr: Address, page: PageHandle) -> Result<u64> {
        self.ops_mut().map(addr, page)
    }

    fn map_for(&mut self, req_id: u32, addr: Address, page: PageHandle, is_write: bool) -> Result<u64> {
        self.ops_mut().map_for(req_id, addr, page, is_write)
    }

    fn unmap(&mut self, addr: Address) -> Result<bool> {
        self.ops_mut().unmap(addr)
    }

    fn access(&mut self, req: &mut MemReq) -> Option<Address> {
        self.ops_mut().access(req)
    }

    fn access_with_walk(&mut self, req: &mut MemReq, ctx: &WalkContext<'_>) -> Option<Address> {
        self.ops_mut().access_with_walk(req, ctx)
    }

    fn allocate_page_table(&mut self, addr: Address, size: u64) -> Result<()> {
        self.ops_mut().allocate_page_table(addr, size)
    }

    fn remove_page_table(&mut self, addr: Address, size: u64) -> Result<()> {
        self.ops_mut().remove_page_table(addr, size)
    }

    fn stats(&self) -> PagingStats {
        self.ops().stats()
    }
}
