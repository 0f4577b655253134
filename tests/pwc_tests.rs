//! Integration tests for the page-walk cache.

use vmem_sim::common::{AccessType, MemReq, VmError};
use vmem_sim::paging::{PageWalkCache, PwcArray};

/// Tests geometry validation.
#[test]
fn test_geometry() {
    let array = PwcArray::new(32, 4).unwrap();
    assert_eq!(array.num_sets(), 8);
    assert_eq!(array.assoc(), 4);
    assert_eq!(array.set_id(0x13), 3);

    assert!(matches!(PwcArray::new(24, 4), Err(VmError::Config(_))));
    assert!(matches!(PwcArray::new(30, 4), Err(VmError::Config(_))));
    assert!(PwcArray::new(8, 0).is_err());
}

/// Tests that the least recently used line of a set is evicted.
#[test]
fn test_lru_eviction() {
    let mut array = PwcArray::new(2, 2).unwrap();
    assert_eq!(array.insert(1), None);
    assert_eq!(array.insert(2), None);
    assert!(array.lookup(1));

    assert_eq!(array.insert(3), Some(2));
    assert_eq!(array.set_lines(0), &[3, 1]);
    assert!(!array.lookup(2));
}

/// Tests that reinserting a resident line does not evict.
#[test]
fn test_reinsert_resident() {
    let mut array = PwcArray::new(2, 2).unwrap();
    array.insert(1);
    array.insert(2);
    assert_eq!(array.insert(1), None);
    assert_eq!(array.set_lines(0), &[1, 2]);
    assert_eq!(array.evict(0), Some(2));
}

/// Tests hit and miss latencies of a lookup.
#[test]
fn test_access_latency() {
    let pwc = PageWalkCache::new(32, 4, 2, 1).unwrap();
    let mut req = MemReq::new(0x4000, 6, AccessType::Read, 0, 0);

    assert_eq!(pwc.access(&mut req), 3);
    assert!(!req.pwc_hit);
    assert_eq!(pwc.access(&mut req), 2);
    assert!(req.pwc_hit);

    let stats = pwc.stats();
    assert_eq!(stats.accesses, 2);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
}

/// Tests the shared lookup and insert entry points.
#[test]
fn test_shared_lookup_insert() {
    let pwc = PageWalkCache::new(4, 1, 2, 1).unwrap();
    assert!(!pwc.lookup(0x10));
    pwc.insert(0x10);
    assert!(pwc.lookup(0x10));
    assert_eq!(pwc.insert(0x14), Some(0x10));
    assert!(!pwc.lookup(0x10));
}
