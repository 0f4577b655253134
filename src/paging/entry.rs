//! Page Table Entry.
//!
//! A `PageTableEntry` models one slot of any page-table variant: a
//! directory entry pointing at the next table, a leaf entry owning a
//! physical page, or a hash-table slot that also remembers its virtual page
//! number. The entry is present exactly when it references a next level.

use super::table::PageTable;
use crate::common::{Address, MemReq};
use crate::mem::{PageAllocator, PageHandle};
use bitflags::bitflags;

bitflags! {
    /// Status bits of a page table entry.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct EntryFlags: u32 {
        const PRESENT = 0x1;
        const READ_WRITE = 0x2;
        const USER = 0x4;
        const WRITE_THROUGH = 0x8;
        const CACHE_DISABLE = 0x10;
        const ACCESSED = 0x20;
        const DIRTY = 0x40;
        const PAGE_SIZE = 0x80;
        const GLOBAL = 0x100;
        const SHARED = 0x200;
        const DRAM_CACHED = 0x400;
    }
}

/// What a present entry points at.
#[derive(Clone, Debug, Default)]
pub enum NextLevel {
    #[default]
    Empty,
    Page(PageHandle),
    Table(Box<PageTable>),
}

/// One page table slot.
#[derive(Clone, Debug)]
pub struct PageTableEntry {
    flags: EntryFlags,
    next: NextLevel,
    page_assigned: bool,
    last_requester: Option<u32>,
    remapped_times: u32,
    vpn: Address,
}

impl Default for PageTableEntry {
    /// Every page is user-accessible and writable, cacheable write-back,
    /// 4KB and private until told otherwise.
    fn default() -> Self {
        Self {
            flags: EntryFlags::READ_WRITE | EntryFlags::USER,
            next: NextLevel::Empty,
            page_assigned: false,
            last_requester: None,
            remapped_times: 0,
            vpn: 0,
        }
    }
}

impl PageTableEntry {
    /// Binds a physical page to this entry and marks it present.
    pub fn validate_page(&mut self, page: PageHandle) {
        self.flags.insert(EntryFlags::PRESENT);
        self.flags.remove(EntryFlags::SHARED);
        self.next = NextLevel::Page(page);
        self.page_assigned = true;
    }

    /// Binds a child table to this entry and marks it present.
    pub fn validate_table(&mut self, table: Box<PageTable>) {
        self.flags.insert(EntryFlags::PRESENT);
        self.next = NextLevel::Table(table);
        self.page_assigned = true;
    }

    /// Releases the owned leaf page back to `allocator` and clears the entry.
    ///
    /// # Panics
    ///
    /// Panics if the entry is not a present leaf.
    pub fn invalidate_page(&mut self, allocator: &dyn PageAllocator) {
        assert!(self.is_present(), "invalidating a non-present entry");
        let NextLevel::Page(page) = std::mem::take(&mut self.next) else {
            panic!("invalidating a directory entry as a leaf");
        };
        allocator.reclaim(page);
        *self = Self {
            remapped_times: self.remapped_times,
            ..Self::default()
        };
    }

    /// Detaches the owned child table and clears the entry.
    ///
    /// The caller is responsible for releasing the table's contents.
    ///
    /// # Panics
    ///
    /// Panics if the entry is not a present directory entry.
    pub fn invalidate_table(&mut self) -> Box<PageTable> {
        assert!(self.is_present(), "invalidating a non-present entry");
        let NextLevel::Table(table) = std::mem::take(&mut self.next) else {
            panic!("invalidating a leaf entry as a directory");
        };
        *self = Self::default();
        table
    }

    /// Records `req_id` as the latest requester.
    ///
    /// A different requester than the previous one marks the page shared.
    /// Returns `true` if this call turned a private page shared.
    pub fn set_last_requester(&mut self, req_id: u32) -> bool {
        let mut changed_to_shared = false;
        if let Some(last) = self.last_requester {
            if last != req_id {
                changed_to_shared = !self.is_shared();
                self.flags.insert(EntryFlags::SHARED);
            }
        }
        self.last_requester = Some(req_id);
        changed_to_shared
    }

    /// Updates access state for `req` and copies dirty/shared onto it.
    ///
    /// Returns `true` if the access turned the page shared.
    pub fn record_access(&mut self, req: &mut MemReq) -> bool {
        let became_shared = self.set_last_requester(req.src_id);
        if became_shared {
            req.trigger_page_shared = true;
        }
        self.set_accessed();
        if req.is_write() {
            if !self.is_dirty() {
                req.trigger_page_dirty = true;
            }
            self.set_dirty();
        }
        req.page_dirty = self.is_dirty();
        req.page_shared = self.is_shared();
        became_shared
    }

    pub fn flags(&self) -> EntryFlags {
        self.flags
    }

    pub fn is_present(&self) -> bool {
        self.flags.contains(EntryFlags::PRESENT)
    }

    pub fn read_only(&self) -> bool {
        !self.flags.contains(EntryFlags::READ_WRITE)
    }

    pub fn user_can_access(&self) -> bool {
        self.flags.contains(EntryFlags::USER)
    }

    pub fn is_accessed(&self) -> bool {
        self.flags.contains(EntryFlags::ACCESSED)
    }

    pub fn is_dirty(&self) -> bool {
        self.flags.contains(EntryFlags::DIRTY)
    }

    pub fn is_large_page(&self) -> bool {
        self.flags.contains(EntryFlags::PAGE_SIZE)
    }

    pub fn is_global(&self) -> bool {
        self.flags.contains(EntryFlags::GLOBAL)
    }

    pub fn is_shared(&self) -> bool {
        self.flags.contains(EntryFlags::SHARED)
    }

    pub fn is_dram_cached(&self) -> bool {
        self.flags.contains(EntryFlags::DRAM_CACHED)
    }

    pub fn set_read_only(&mut self) {
        self.flags.remove(EntryFlags::READ_WRITE);
    }

    pub fn set_supervisor(&mut self) {
        self.flags.remove(EntryFlags::USER);
    }

    pub fn set_write_through(&mut self, enable: bool) {
        self.flags.set(EntryFlags::WRITE_THROUGH, enable);
    }

    pub fn set_cache_disable(&mut self, disable: bool) {
        self.flags.set(EntryFlags::CACHE_DISABLE, disable);
    }

    pub fn set_accessed(&mut self) {
        self.flags.insert(EntryFlags::ACCESSED);
    }

    pub fn set_dirty(&mut self) {
        self.flags.insert(EntryFlags::DIRTY);
    }

    pub fn clear_dirty(&mut self) {
        self.flags.remove(EntryFlags::DIRTY);
    }

    pub fn enable_large_page(&mut self) {
        self.flags.insert(EntryFlags::PAGE_SIZE);
    }

    pub fn set_global(&mut self, global: bool) {
        self.flags.set(EntryFlags::GLOBAL, global);
    }

    pub fn set_dram_cached(&mut self) {
        self.flags.insert(EntryFlags::DRAM_CACHED);
    }

    /// Returns `true` once the slot has held a mapping.
    ///
    /// Open addressing stops probing at slots that were never assigned.
    pub fn is_page_assigned(&self) -> bool {
        self.page_assigned
    }

    pub fn last_requester(&self) -> Option<u32> {
        self.last_requester
    }

    pub fn remapped_times(&self) -> u32 {
        self.remapped_times
    }

    pub fn bump_remapped(&mut self) {
        self.remapped_times += 1;
    }

    /// Virtual page number stored by hash-style tables.
    pub fn vpn(&self) -> Address {
        self.vpn
    }

    pub fn set_vpn(&mut self, vpn: Address) {
        self.vpn = vpn;
    }

    /// Returns the owned leaf page, if this is a present leaf.
    pub fn page(&self) -> Option<PageHandle> {
        match self.next {
            NextLevel::Page(page) => Some(page),
            _ => None,
        }
    }

    /// Returns the owned child table, if this is a present directory entry.
    pub fn table(&self) -> Option<&PageTable> {
        match &self.next {
            NextLevel::Table(table) => Some(table),
            _ => None,
        }
    }

    /// Mutable access to the owned child table.
    pub fn table_mut(&mut self) -> Option<&mut PageTable> {
        match &mut self.next {
            NextLevel::Table(table) => Some(table),
            _ => None,
        }
    }
}
