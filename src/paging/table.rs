//! Generic page table container.
//!
//! A fixed-size array of entries, optionally backed by a block of simulated
//! physical pages. The backing block gives each entry a physical address,
//! which is what page-table walks fetch.

use super::entry::PageTableEntry;
use crate::common::constants::ENTRY_SIZE_512;
use crate::common::Address;
use crate::mem::allocator::MAX_ORDER;
use crate::mem::{PageAllocator, PageHandle};
use std::ops::{Index, IndexMut};

/// Returns the allocation order needed to back `entries` entries.
///
/// Capped at the allocator's largest order; larger tables wrap their entry
/// addresses within the block.
pub fn table_order(entries: usize, page_shift: u32) -> u32 {
    let bytes = entries as u64 * ENTRY_SIZE_512;
    let pages = bytes.div_ceil(1 << page_shift).max(1);
    pages.next_power_of_two().trailing_zeros().min(MAX_ORDER)
}

/// A page table: `len()` entries fixed at construction.
#[derive(Clone, Debug)]
pub struct PageTable {
    entries: Vec<PageTableEntry>,
    page: Option<PageHandle>,
}

impl PageTable {
    /// Creates a table of `size` empty entries.
    ///
    /// # Arguments
    ///
    /// * `size` - Number of entries; must be non-zero.
    /// * `page` - Physical block the table occupies, if simulated.
    pub fn new(size: usize, page: Option<PageHandle>) -> Self {
        assert!(size > 0, "page table must have at least one entry");
        Self {
            entries: vec![PageTableEntry::default(); size],
            page,
        }
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always `false`; tables are never empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_present(&self, id: usize) -> bool {
        self.entries.get(id).is_some_and(PageTableEntry::is_present)
    }

    /// Number of present entries.
    pub fn present_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_present()).count()
    }

    /// Physical block backing this table.
    pub fn page(&self) -> Option<PageHandle> {
        self.page
    }

    /// First physical page number of the backing block.
    pub fn page_no(&self) -> Option<Address> {
        self.page.map(|p| p.page_no())
    }

    /// Physical byte address of entry `id`, as fetched by a walk.
    pub fn entry_addr(&self, id: usize, page_shift: u32) -> Option<Address> {
        let page = self.page?;
        let block_bytes = 1u64 << (page_shift + page.order());
        let offset = (id as u64 * ENTRY_SIZE_512) % block_bytes;
        Some((page.page_no() << page_shift) | offset)
    }

    /// Marks every entry as mapping a large page.
    pub fn enable_large_page(&mut self) {
        for entry in &mut self.entries {
            entry.enable_large_page();
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &PageTableEntry> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PageTableEntry> {
        self.entries.iter_mut()
    }

    /// Moves every present entry out of the table, leaving it empty.
    pub fn drain_present(&mut self) -> Vec<PageTableEntry> {
        self.entries
            .iter_mut()
            .filter(|e| e.is_present())
            .map(std::mem::take)
            .collect()
    }

    /// Reclaims every leaf page and the table's own block.
    ///
    /// Used by flat tables whose entries all point at pages.
    pub fn release_pages(&mut self, allocator: &dyn PageAllocator) {
        for entry in &mut self.entries {
            if entry.is_present() && entry.page().is_some() {
                entry.invalidate_page(allocator);
            }
        }
        if let Some(page) = self.page.take() {
            allocator.reclaim(page);
        }
    }
}

impl Index<usize> for PageTable {
    type Output = PageTableEntry;

    fn index(&self, id: usize) -> &PageTableEntry {
        &self.entries[id]
    }
}

impl IndexMut<usize> for PageTable {
    fn index_mut(&mut self, id: usize) -> &mut PageTableEntry {
        &mut self.entries[id]
    }
}
