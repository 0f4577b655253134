//! Integration tests for page table entries and table containers.

use vmem_sim::common::{AccessType, MemReq};
use vmem_sim::mem::{FrameAllocator, PageAllocator, PageHandle};
use vmem_sim::paging::table::table_order;
use vmem_sim::paging::{pgt_addr, EntryFlags, PageTable, PageTableEntry};

/// Helper to create a write request from `core`.
fn write_req(core: u32) -> MemReq {
    MemReq::new(0x1000, 6, AccessType::Write, core, 0)
}

/// Tests the default entry state.
#[test]
fn test_default_entry() {
    let entry = PageTableEntry::default();
    assert!(!entry.is_present());
    assert!(!entry.read_only());
    assert!(entry.user_can_access());
    assert!(!entry.is_page_assigned());
    assert_eq!(entry.flags(), EntryFlags::READ_WRITE | EntryFlags::USER);
}

/// Tests that a second distinct requester marks the page shared once.
#[test]
fn test_last_requester_sharing() {
    let mut entry = PageTableEntry::default();
    assert!(!entry.set_last_requester(0));
    assert!(!entry.set_last_requester(0));
    assert!(!entry.is_shared());

    assert!(entry.set_last_requester(1));
    assert!(entry.is_shared());
    assert!(!entry.set_last_requester(2));
    assert_eq!(entry.last_requester(), Some(2));
}

/// Tests the dirty trigger on the first write only.
#[test]
fn test_record_access_dirty_trigger() {
    let mut entry = PageTableEntry::default();
    entry.validate_page(PageHandle::new(0x300, 0));

    let mut first = write_req(0);
    entry.record_access(&mut first);
    assert!(first.trigger_page_dirty);
    assert!(first.page_dirty);
    assert!(entry.is_accessed());

    let mut second = write_req(0);
    entry.record_access(&mut second);
    assert!(!second.trigger_page_dirty);
    assert!(second.page_dirty);

    let mut other = write_req(1);
    assert!(entry.record_access(&mut other));
    assert!(other.trigger_page_shared);
    assert!(other.page_shared);
}

/// Tests that invalidating a leaf reclaims its page and keeps the remap count.
#[test]
fn test_invalidate_page_reclaims() {
    let alloc = FrameAllocator::new(0x100, 16);
    let mut entry = PageTableEntry::default();
    entry.validate_page(alloc.allocate_pages(0).unwrap());
    entry.set_dirty();
    entry.bump_remapped();
    assert_eq!(alloc.in_use(), 1);

    entry.invalidate_page(&alloc);
    assert_eq!(alloc.in_use(), 0);
    assert!(!entry.is_present());
    assert!(!entry.is_dirty());
    assert_eq!(entry.remapped_times(), 1);
    assert!(entry.page().is_none());
}

/// Tests that a directory entry hands back its child table.
#[test]
fn test_invalidate_table() {
    let mut entry = PageTableEntry::default();
    entry.validate_table(Box::new(PageTable::new(4, None)));
    assert!(entry.table().is_some());
    assert!(entry.page().is_none());

    let child = entry.invalidate_table();
    assert_eq!(child.len(), 4);
    assert!(!entry.is_present());
}

/// Tests the backing block order of tables.
#[test]
fn test_table_order() {
    assert_eq!(table_order(512, 12), 0);
    assert_eq!(table_order(4, 12), 0);
    assert_eq!(table_order(1024, 12), 1);
    assert_eq!(table_order(4096, 12), 3);
    assert_eq!(table_order(1 << 30, 12), 18);
}

/// Tests the physical address of table entries.
#[test]
fn test_entry_addr() {
    let table = PageTable::new(512, Some(PageHandle::new(0x200, 0)));
    assert_eq!(table.entry_addr(0, 12), Some(0x20_0000));
    assert_eq!(table.entry_addr(3, 12), Some(0x20_0018));
    assert_eq!(table.page_no(), Some(0x200));
    assert_eq!(PageTable::new(8, None).entry_addr(1, 12), None);
}

/// Tests draining present entries out of a table.
#[test]
fn test_drain_present() {
    let mut table = PageTable::new(8, None);
    table[2].validate_page(PageHandle::new(0x10, 0));
    table[2].set_vpn(0x42);
    table[5].validate_page(PageHandle::new(0x11, 0));
    assert_eq!(table.present_count(), 2);
    assert!(table.is_present(5));
    assert!(!table.is_present(100));

    let drained = table.drain_present();
    assert_eq!(drained.len(), 2);
    assert_eq!(drained[0].vpn(), 0x42);
    assert_eq!(table.present_count(), 0);
}

/// Tests the entry address of a single-page table.
#[test]
fn test_pgt_addr() {
    assert_eq!(pgt_addr(0x100, 0, 12), 0x10_0000);
    assert_eq!(pgt_addr(0x100, 3, 12), 0x10_0018);
    assert_eq!(pgt_addr(0x100, 511, 12), 0x10_0ff8);
}
