//! Integration tests for the frame allocator.

use vmem_sim::mem::{FrameAllocator, PageAllocator};

/// Tests that blocks are aligned to their order.
#[test]
fn test_allocation_alignment() {
    let alloc = FrameAllocator::new(0x101, 4096);
    let single = alloc.allocate_pages(0).unwrap();
    assert_eq!(single.page_no(), 0x101);

    let block = alloc.allocate_pages(3).unwrap();
    assert_eq!(block.order(), 3);
    assert_eq!(block.page_no() % 8, 0);
    assert!(block.page_no() > single.page_no());
}

/// Tests that reclaimed blocks are reused first.
#[test]
fn test_reclaim_reuse() {
    let alloc = FrameAllocator::new(0x100, 16);
    let a = alloc.allocate_pages(0).unwrap();
    let _b = alloc.allocate_pages(0).unwrap();
    alloc.reclaim(a);

    let c = alloc.allocate_pages(0).unwrap();
    assert_eq!(c.page_no(), a.page_no());
    assert_eq!(alloc.allocated(), 3);
    assert_eq!(alloc.reclaimed(), 1);
    assert_eq!(alloc.in_use(), 2);
}

/// Tests exhaustion of the frame range.
#[test]
fn test_exhaustion_returns_none() {
    let alloc = FrameAllocator::new(0, 2);
    assert!(alloc.allocate_pages(0).is_some());
    assert!(alloc.allocate_pages(0).is_some());
    assert!(alloc.allocate_pages(0).is_none());
    assert!(alloc.allocate_pages(30).is_none());
}
