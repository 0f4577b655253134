//! Page-Frame Allocation.
//!
//! Translation structures request physical pages through `PageAllocator`:
//! once per table that occupies simulated memory and once per mapped leaf
//! page. Leaf pages come back through `reclaim` when their entry is
//! invalidated; table pages come back when the owning structure releases the
//! table.

use crate::common::Address;
use std::sync::{Mutex, PoisonError};

/// Largest supported allocation order (blocks of `2^MAX_ORDER` pages).
///
/// Order 18 backs one 1GB page.
pub const MAX_ORDER: u32 = 18;

/// Handle to an allocated block of physical pages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PageHandle {
    page_no: Address,
    order: u32,
}

impl PageHandle {
    /// Creates a handle for the block starting at `page_no`.
    pub fn new(page_no: Address, order: u32) -> Self {
        Self { page_no, order }
    }

    /// Returns the first physical page number of the block.
    pub fn page_no(&self) -> Address {
        self.page_no
    }

    /// Returns the block order.
    pub fn order(&self) -> u32 {
        self.order
    }
}

/// Interface to the simulator's page-frame allocator.
pub trait PageAllocator: Send + Sync {
    /// Allocates a block of `2^order` contiguous pages.
    ///
    /// Returns `None` when physical memory is exhausted.
    fn allocate_pages(&self, order: u32) -> Option<PageHandle>;

    /// Returns a block previously handed out by `allocate_pages`.
    fn reclaim(&self, page: PageHandle);
}

struct FrameState {
    next: Address,
    end: Address,
    free: Vec<Vec<Address>>,
    allocated: u64,
    reclaimed: u64,
}

/// A bump allocator with per-order free lists.
///
/// Serves the physical frame range `[base, base + frames)`. Reclaimed blocks
/// are reused before the bump pointer advances.
pub struct FrameAllocator {
    state: Mutex<FrameState>,
}

impl FrameAllocator {
    /// Creates an allocator over `frames` pages starting at page `base`.
    pub fn new(base: Address, frames: u64) -> Self {
        Self {
            state: Mutex::new(FrameState {
                next: base,
                end: base.saturating_add(frames),
                free: vec![Vec::new(); MAX_ORDER as usize + 1],
                allocated: 0,
                reclaimed: 0,
            }),
        }
    }

    /// Returns the number of blocks currently handed out.
    pub fn in_use(&self) -> u64 {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.allocated - state.reclaimed
    }

    /// Returns the total number of blocks handed out since creation.
    pub fn allocated(&self) -> u64 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .allocated
    }

    /// Returns the total number of blocks given back.
    pub fn reclaimed(&self) -> u64 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reclaimed
    }
}

impl PageAllocator for FrameAllocator {
    fn allocate_pages(&self, order: u32) -> Option<PageHandle> {
        if order > MAX_ORDER {
            return None;
        }
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(page_no) = state.free[order as usize].pop() {
            state.allocated += 1;
            return Some(PageHandle::new(page_no, order));
        }
        let block = 1u64 << order;
        let start = (state.next + block - 1) & !(block - 1);
        if start.checked_add(block)? > state.end {
            return None;
        }
        state.next = start + block;
        state.allocated += 1;
        Some(PageHandle::new(start, order))
    }

    fn reclaim(&self, page: PageHandle) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.free[page.order() as usize].push(page.page_no());
        state.reclaimed += 1;
    }
}
