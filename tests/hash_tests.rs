//! Integration tests for the open-addressing hash page table.

use std::sync::Arc;
use vmem_sim::common::{AccessType, MemReq, VmError};
use vmem_sim::config::HashConfig;
use vmem_sim::mem::{FrameAllocator, PageAllocator};
use vmem_sim::paging::hash::hash_vpn;
use vmem_sim::paging::{HashFunction, HashPaging, PageTableOps, PagingParams};

/// Helper to create a hash table of `size` slots.
fn create_hash(size: usize, function: HashFunction) -> (Arc<FrameAllocator>, HashPaging) {
    let alloc = Arc::new(FrameAllocator::new(0x100, 1 << 16));
    let config = HashConfig {
        size,
        threshold: 0.8,
        scale: 2.0,
        function,
    };
    let params = PagingParams {
        page_shift: 12,
        line_shift: 6,
        mem_access_time: 10,
    };
    let paging = HashPaging::new(&config, alloc.clone(), params).unwrap();
    (alloc, paging)
}

/// Helper to map `count` consecutive pages starting at vpn 0.
fn map_pages(alloc: &FrameAllocator, paging: &mut HashPaging, range: std::ops::Range<u64>) {
    for vpn in range {
        let page = alloc.allocate_pages(0).unwrap();
        assert_eq!(paging.map(vpn << 12, page).unwrap(), 10);
    }
}

/// Tests the key extraction.
#[test]
fn test_hash_vpn() {
    assert_eq!(hash_vpn(0x1234_5678), 0x1_2345);
    assert_eq!(hash_vpn(1 << 48), 0);
}

/// Tests that the table grows exactly when the live ratio exceeds the threshold.
#[test]
fn test_rehash_on_threshold() {
    let (alloc, mut paging) = create_hash(128, HashFunction::Xxh3);
    map_pages(&alloc, &mut paging, 0..102);
    assert_eq!(paging.rehashes(), 0);
    assert_eq!(paging.capacity(), 128);

    map_pages(&alloc, &mut paging, 102..103);
    assert_eq!(paging.rehashes(), 1);
    assert_eq!(paging.capacity(), 256);
    assert_eq!(paging.live(), 103);

    map_pages(&alloc, &mut paging, 103..204);
    assert_eq!(paging.rehashes(), 1);
    map_pages(&alloc, &mut paging, 204..205);
    assert_eq!(paging.rehashes(), 2);
    assert_eq!(paging.capacity(), 512);
}

/// Tests that every mapping survives a rebuild.
#[test]
fn test_rehash_preserves_mappings() {
    let (alloc, mut paging) = create_hash(16, HashFunction::Blake3);
    let mut pages = Vec::new();
    for vpn in 0..200u64 {
        let page = alloc.allocate_pages(0).unwrap();
        paging.map((vpn * 7) << 12, page).unwrap();
        pages.push((vpn * 7, page));
    }
    assert!(paging.rehashes() >= 4);
    assert_eq!(paging.entries().count(), 200);
    for (vpn, page) in pages {
        assert_eq!(paging.translation(vpn), Some(page));
    }
}

/// Tests a lookup charges one access per probed slot.
#[test]
fn test_access_probe_latency() {
    let (alloc, mut paging) = create_hash(64, HashFunction::Xxh3);
    let mut miss = MemReq::new(0x5000, 6, AccessType::Read, 0, 0);
    assert_eq!(paging.access(&mut miss), None);
    assert_eq!(miss.cycle, 10);

    let page = alloc.allocate_pages(0).unwrap();
    paging.map(0x5000, page).unwrap();
    let mut hit = MemReq::new(0x5040, 6, AccessType::Write, 0, 0);
    assert_eq!(paging.access(&mut hit), Some(page.page_no()));
    assert!(hit.cycle >= 10);
    assert_eq!(hit.cycle % 10, 0);
    assert!(hit.trigger_page_dirty);
}

/// Tests remapping keeps a single live entry.
#[test]
fn test_remap() {
    let (alloc, mut paging) = create_hash(64, HashFunction::Xxh3);
    paging.map(0x9000, alloc.allocate_pages(0).unwrap()).unwrap();
    let second = alloc.allocate_pages(0).unwrap();
    paging.map(0x9000, second).unwrap();
    assert_eq!(paging.live(), 1);
    assert_eq!(paging.translation(9), Some(second));
    assert_eq!(paging.stats().mapped_pages, 1);
}

/// Tests the operations open addressing cannot perform.
#[test]
fn test_unsupported_operations() {
    let (alloc, mut paging) = create_hash(64, HashFunction::Xxh3);
    paging.map(0x1000, alloc.allocate_pages(0).unwrap()).unwrap();
    assert!(matches!(paging.unmap(0x1000), Err(VmError::Unsupported { .. })));
    assert!(matches!(
        paging.allocate_page_table(0, 0x1000),
        Err(VmError::Unsupported { .. })
    ));
    assert!(matches!(
        paging.remove_page_table(0, 0x1000),
        Err(VmError::Unsupported { .. })
    ));
    assert_eq!(paging.live(), 1);
}

/// Tests that dropping the table returns its block and pages.
#[test]
fn test_drop_releases_pages() {
    let (alloc, mut paging) = create_hash(16, HashFunction::Xxh3);
    map_pages(&alloc, &mut paging, 0..40);
    drop(paging);
    assert_eq!(alloc.in_use(), 0);
}

/// Tests that a mapping whose rehash runs out of frames is not kept.
#[test]
fn test_failed_rehash_drops_mapping() {
    // One frame for the table and two for leaves.
    let alloc = Arc::new(FrameAllocator::new(0x100, 3));
    let config = HashConfig {
        size: 4,
        threshold: 0.5,
        scale: 2.0,
        function: HashFunction::Xxh3,
    };
    let params = PagingParams {
        page_shift: 12,
        line_shift: 6,
        mem_access_time: 10,
    };
    let mut paging = HashPaging::new(&config, alloc.clone(), params).unwrap();
    let first = alloc.allocate_pages(0).unwrap();
    let second = alloc.allocate_pages(0).unwrap();
    paging.map(0x1000, first).unwrap();
    paging.map(0x2000, second).unwrap();

    let third = vmem_sim::mem::PageHandle::new(0x500, 0);
    let err = paging.map(0x3000, third).unwrap_err();
    assert!(matches!(err, VmError::OutOfFrames { operation: "rehash", .. }));

    assert_eq!(paging.live(), 2);
    assert_eq!(paging.capacity(), 4);
    assert_eq!(paging.entries().count(), 2);
    assert_eq!(paging.translation(3), None);
    let mut req = MemReq::new(0x3000, 6, AccessType::Read, 0, 0);
    assert_eq!(paging.access(&mut req), None);
    assert_eq!(paging.translation(1), Some(first));
    assert_eq!(paging.translation(2), Some(second));
}
