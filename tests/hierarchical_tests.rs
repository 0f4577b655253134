//! Integration tests for the hierarchical page table.

use std::sync::Arc;
use vmem_sim::common::{AccessType, MemReq, VmError};
use vmem_sim::mem::{FrameAllocator, PageAllocator, PageHandle};
use vmem_sim::paging::{HierarchicalPaging, PageTableOps, PagingParams, PagingStyle};

/// Helper to create paging parameters with a 10-cycle memory access.
fn create_params() -> PagingParams {
    PagingParams {
        page_shift: 12,
        line_shift: 6,
        mem_access_time: 10,
    }
}

/// Helper to create a table together with its allocator.
fn create_paging(style: PagingStyle) -> (Arc<FrameAllocator>, HierarchicalPaging) {
    let alloc = Arc::new(FrameAllocator::new(0x100, 1 << 16));
    let paging = HierarchicalPaging::new(style, alloc.clone(), create_params()).unwrap();
    (alloc, paging)
}

/// Helper to allocate a leaf page.
fn page(alloc: &FrameAllocator, order: u32) -> PageHandle {
    alloc.allocate_pages(order).unwrap()
}

/// Helper to create a read request for `addr`.
fn read_req(addr: u64, core: u32) -> MemReq {
    MemReq::new(addr, 6, AccessType::Read, core, 0)
}

/// Tests that the first mapping allocates one table per level.
#[test]
fn test_long_mode_first_map() {
    let (alloc, mut paging) = create_paging(PagingStyle::LongModeNormal);
    assert_eq!(paging.tables_at(0), 1);
    assert_eq!(paging.tables_at(1), 0);

    let addr = 0x1000 << 12;
    let leaf = page(&alloc, 0);
    assert_eq!(paging.map(addr, leaf).unwrap(), 40);
    for level in 0..4 {
        assert_eq!(paging.tables_at(level), 1);
    }
    assert_eq!(paging.mapped_pages(), 1);

    // Same leaf table: no allocation.
    assert_eq!(paging.map(addr + 0x1000, page(&alloc, 0)).unwrap(), 10);
    assert_eq!(paging.tables_at(3), 1);
    assert_eq!(paging.mapped_pages(), 2);

    let mut req = read_req(addr + 0x40, 0);
    assert_eq!(paging.access(&mut req), Some(leaf.page_no()));
    assert_eq!(req.cycle, 40);
}

/// Tests that a miss only charges the entries actually read.
#[test]
fn test_access_miss_latency() {
    let (_alloc, mut paging) = create_paging(PagingStyle::LongModeNormal);
    let mut req = read_req(1 << 39, 0);
    assert_eq!(paging.access(&mut req), None);
    assert_eq!(req.cycle, 10);
}

/// Tests requester tracking through `map_for`.
#[test]
fn test_map_for_marks_entry() {
    let (alloc, mut paging) = create_paging(PagingStyle::PaeNormal);
    let addr = 0x8000_0000;
    paging.map_for(0, addr, page(&alloc, 0), true).unwrap();

    let mut req = read_req(addr, 1);
    assert!(paging.access(&mut req).is_some());
    assert!(req.page_dirty);
    assert!(req.page_shared);
    assert!(req.trigger_page_shared);
}

/// Tests remapping reclaims the previous page.
#[test]
fn test_remap_reclaims_old_page() {
    let (alloc, mut paging) = create_paging(PagingStyle::LegacyNormal);
    paging.map(0x1000, page(&alloc, 0)).unwrap();
    let in_use = alloc.in_use();

    let second = page(&alloc, 0);
    paging.map(0x1000, second).unwrap();
    assert_eq!(alloc.in_use(), in_use);
    assert_eq!(paging.mapped_pages(), 1);

    let mut req = read_req(0x1000, 0);
    assert_eq!(paging.access(&mut req), Some(second.page_no()));
}

/// Tests unmapping a single page.
#[test]
fn test_unmap() {
    let (alloc, mut paging) = create_paging(PagingStyle::LongModeNormal);
    paging.map(0x7000, page(&alloc, 0)).unwrap();
    assert!(paging.unmap(0x7000).unwrap());
    assert!(!paging.unmap(0x7000).unwrap());
    assert_eq!(paging.mapped_pages(), 0);
    assert_eq!(paging.access(&mut read_req(0x7000, 0)), None);
}

/// Tests that removing a leaf table releases it and its pages.
#[test]
fn test_remove_page_table() {
    let (alloc, mut paging) = create_paging(PagingStyle::LongModeNormal);
    let addr = 0x100_0000;
    paging.map(addr, page(&alloc, 0)).unwrap();
    paging.map(addr + 0x1000, page(&alloc, 0)).unwrap();
    assert_eq!(alloc.in_use(), 6);

    paging.remove_page_table(addr, 0x20_0000).unwrap();
    assert_eq!(alloc.in_use(), 3);
    assert_eq!(paging.tables_at(3), 0);
    assert_eq!(paging.tables_at(2), 1);
    assert_eq!(paging.mapped_pages(), 0);
    assert_eq!(paging.access(&mut read_req(addr, 0)), None);
}

/// Tests that misaligned removal is rejected.
#[test]
fn test_remove_misaligned() {
    let (alloc, mut paging) = create_paging(PagingStyle::LongModeNormal);
    paging.map(0x100_0000, page(&alloc, 0)).unwrap();

    let err = paging.remove_page_table(0x100_1000, 0x1000).unwrap_err();
    assert!(matches!(
        err,
        VmError::Misaligned {
            granularity: 0x20_0000,
            ..
        }
    ));
    assert_eq!(paging.mapped_pages(), 1);
}

/// Tests that the root directory cannot be removed.
#[test]
fn test_remove_root_unsupported() {
    let (_alloc, mut paging) = create_paging(PagingStyle::LongModeNormal);
    let err = paging.remove_directory(0, 1 << 39, 0).unwrap_err();
    assert!(matches!(err, VmError::Unsupported { .. }));
}

/// Tests removal of an upper directory cascades to everything below it.
#[test]
fn test_remove_directory_cascades() {
    let (alloc, mut paging) = create_paging(PagingStyle::LongModeNormal);
    paging.map(0x4000_0000, page(&alloc, 0)).unwrap();
    paging.map(0x4020_0000, page(&alloc, 0)).unwrap();
    assert_eq!(paging.tables_at(3), 2);

    paging.remove_directory(0x4000_0000, 0x4000_0000, 2).unwrap();
    assert_eq!(paging.tables_at(2), 0);
    assert_eq!(paging.tables_at(3), 0);
    assert_eq!(paging.tables_at(1), 1);
    assert_eq!(paging.mapped_pages(), 0);
}

/// Tests pre-allocating leaf tables for a range.
#[test]
fn test_allocate_page_table() {
    let (_alloc, mut paging) = create_paging(PagingStyle::LongModeNormal);
    paging.allocate_page_table(0, 0x40_0000).unwrap();
    assert_eq!(paging.tables_at(1), 1);
    assert_eq!(paging.tables_at(2), 1);
    assert_eq!(paging.tables_at(3), 2);
    assert_eq!(paging.mapped_pages(), 0);
}

/// Tests 4MB pages in single-level legacy paging.
#[test]
fn test_legacy_huge_pages() {
    let (alloc, mut paging) = create_paging(PagingStyle::LegacyHuge);
    let leaf = page(&alloc, 10);
    assert_eq!(paging.map(0x40_0000, leaf).unwrap(), 10);

    let mut req = read_req(0x40_5000, 0);
    assert_eq!(paging.access(&mut req), Some(leaf.page_no() + 5));
    assert_eq!(req.cycle, 10);

    assert!(paging.remove_page_table(0x40_1000, 0x40_0000).is_err());
    paging.remove_page_table(0x40_0000, 0x40_0000).unwrap();
    assert_eq!(paging.mapped_pages(), 0);
}

/// Tests 2MB pages in long mode.
#[test]
fn test_long_mode_middle_pages() {
    let (alloc, mut paging) = create_paging(PagingStyle::LongModeMiddle);
    let leaf = page(&alloc, 9);
    assert_eq!(paging.map(0x20_0000, leaf).unwrap(), 30);
    let mut req = read_req(0x21_3000, 0);
    assert_eq!(paging.access(&mut req), Some(leaf.page_no() + 0x13));
    assert_eq!(req.cycle, 30);
}

/// Tests per-level statistics.
#[test]
fn test_stats() {
    let (alloc, mut paging) = create_paging(PagingStyle::LongModeNormal);
    paging.map(0x1000, page(&alloc, 0)).unwrap();
    paging.map(0x2000, page(&alloc, 0)).unwrap();

    let stats = paging.stats();
    assert_eq!(stats.style, PagingStyle::LongModeNormal);
    assert_eq!(stats.mapped_pages, 2);
    assert_eq!(stats.tables.len(), 4);
    assert_eq!(stats.tables[0].name, "pml4");
    assert_eq!(stats.tables[3].live, 2);
    assert_eq!(stats.tables[0].live, 1);
    assert_eq!(stats.storage_bytes, 4 * 512 * 8);
}

/// Tests that dropping the table returns every page.
#[test]
fn test_drop_releases_everything() {
    let (alloc, mut paging) = create_paging(PagingStyle::PaeNormal);
    for i in 0..8u64 {
        paging.map(i << 21, page(&alloc, 0)).unwrap();
    }
    assert!(alloc.in_use() > 8);
    drop(paging);
    assert_eq!(alloc.in_use(), 0);
}

/// Tests running out of frames while allocating directories.
#[test]
fn test_out_of_frames() {
    let alloc = Arc::new(FrameAllocator::new(0x100, 2));
    let mut paging = HierarchicalPaging::new(PagingStyle::LongModeNormal, alloc, create_params()).unwrap();
    let err = paging.map(0x1000, PageHandle::new(0x9000, 0)).unwrap_err();
    assert!(matches!(err, VmError::OutOfFrames { .. }));
}

/// Tests that non-radix styles are rejected.
#[test]
fn test_rejects_hash_style() {
    let alloc = Arc::new(FrameAllocator::new(0x100, 16));
    assert!(matches!(
        HierarchicalPaging::new(PagingStyle::HashNormal, alloc, create_params()),
        Err(VmError::UnsupportedStyle(PagingStyle::HashNormal))
    ));
}
