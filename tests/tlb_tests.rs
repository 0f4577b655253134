//! Integration tests for the common TLB.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use vmem_sim::common::{AccessType, MemReq, Result, VmError};
use vmem_sim::config::TlbLevelConfig;
use vmem_sim::tlb::{CommonTlb, TlbEntry, TlbGeometry, TlbRecord, Translator};

/// Translator standing in for the levels below: maps `vpn` to
/// `vpn + 0x1000` in 100 cycles and marks written pages dirty.
#[derive(Default)]
struct OffsetTranslator {
    calls: AtomicU64,
}

impl Translator for OffsetTranslator {
    fn name(&self) -> &str {
        "offset"
    }

    fn translate(&self, req: &mut MemReq) -> Result<u64> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        req.cycle += 100;
        req.page_dirty = req.is_write();
        Ok((req.byte_addr(6) >> 12) + 0x1000)
    }
}

/// Helper to create a TLB of `entries` entries over an offset translator.
fn create_tlb(entries: usize, timing_mode: bool) -> (Arc<OffsetTranslator>, CommonTlb) {
    let next = Arc::new(OffsetTranslator::default());
    let config = TlbLevelConfig {
        entries,
        hit_latency: 1,
        response_latency: 2,
    };
    let geometry = TlbGeometry {
        page_shift: 12,
        line_shift: 6,
        timing_mode,
    };
    let tlb = CommonTlb::new("l1", &config, geometry, next.clone()).unwrap();
    (next, tlb)
}

/// Helper to create a request for page `vpn`.
fn req(vpn: u64, access: AccessType) -> MemReq {
    MemReq::new((vpn << 12) + 0x40, 6, access, 0, 0)
}

/// Tests that a miss fills the TLB and the next access hits.
#[test]
fn test_miss_then_hit() {
    let (next, tlb) = create_tlb(4, true);

    let mut miss = req(5, AccessType::Read);
    assert_eq!(tlb.translate(&mut miss).unwrap(), 0x1005);
    assert_eq!(miss.cycle, 1 + 100 + 2);

    let mut hit = req(5, AccessType::Read);
    assert_eq!(tlb.translate(&mut hit).unwrap(), 0x1005);
    assert_eq!(hit.cycle, 3);

    let stats = tlb.stats();
    assert_eq!(stats.accesses, 2);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hit_rate(), 50.0);
    assert_eq!(next.calls.load(Ordering::Relaxed), 1);
}

/// Tests that access returns the physical line address.
#[test]
fn test_access_returns_line() {
    let (_next, tlb) = create_tlb(4, true);
    let mut r = req(5, AccessType::Read);
    assert_eq!(tlb.access(&mut r).unwrap(), ((0x1005 << 12) | 0x40) >> 6);
}

/// Tests that the first of N+1 distinct pages is evicted.
#[test]
fn test_lru_evicts_oldest() {
    let (_next, tlb) = create_tlb(4, true);
    for vpn in 0..5 {
        tlb.translate(&mut req(vpn, AccessType::Read)).unwrap();
    }
    assert_eq!(tlb.stats().evictions, 1);
    assert!(tlb.look_up(0).is_none());
    for vpn in 1..5 {
        assert_eq!(tlb.look_up(vpn).unwrap().ppn(), vpn + 0x1000);
    }
    assert!(tlb.is_full());
}

/// Tests that a lookup refreshes recency.
#[test]
fn test_look_up_refreshes_lru() {
    let (_next, tlb) = create_tlb(4, true);
    for vpn in 0..4 {
        assert!(tlb.insert(TlbEntry::new(vpn, vpn + 0x1000)).is_none());
    }
    assert!(tlb.look_up(0).is_some());
    let evicted = tlb.insert(TlbEntry::new(4, 0x1004)).unwrap();
    assert_eq!(evicted.vpn(), 1);
    assert_eq!(tlb.evict().unwrap().vpn(), 2);
    assert_eq!(tlb.len(), 3);
}

/// Tests that dirty state from the miss path is cached.
#[test]
fn test_dirty_flag_cached() {
    let (_next, tlb) = create_tlb(4, true);
    tlb.translate(&mut req(3, AccessType::Write)).unwrap();

    let mut hit = req(3, AccessType::Read);
    tlb.translate(&mut hit).unwrap();
    assert!(hit.page_dirty);
    assert!(!hit.page_shared);

    assert_eq!(tlb.update_tlb_flags(0x1003, true, false), 1);
    let mut hit = req(3, AccessType::Read);
    tlb.translate(&mut hit).unwrap();
    assert!(hit.page_shared);
    assert!(!hit.page_dirty);
}

/// Tests moving a cached translation to a new physical page.
#[test]
fn test_update_ppn() {
    let (_next, tlb) = create_tlb(4, true);
    tlb.insert(TlbEntry::new(5, 0x1005));

    assert_eq!(tlb.update_ppn(0x1005, 0x2000), 1);
    assert_eq!(tlb.look_up_pa(0x2000).unwrap().vpn(), 5);
    assert!(tlb.look_up_pa(0x1005).is_none());
    assert_eq!(tlb.look_up(5).unwrap().ppn(), 0x2000);

    tlb.update_entry(5, 0x3000);
    assert_eq!(tlb.look_up(5).unwrap().ppn(), 0x3000);
    assert!(tlb.look_up_pa(0x2000).is_none());
    assert!(tlb.is_consistent());
}

/// Tests that two pages never share a cached physical page.
#[test]
fn test_insert_replaces_alias() {
    let (_next, tlb) = create_tlb(4, true);
    tlb.insert(TlbEntry::new(1, 0x50));
    tlb.insert(TlbEntry::new(2, 0x50));
    assert!(tlb.look_up(1).is_none());
    assert_eq!(tlb.look_up_pa(0x50).unwrap().vpn(), 2);
    assert_eq!(tlb.len(), 1);
    assert!(tlb.is_consistent());
}

/// Tests shootdown and explicit deletion.
#[test]
fn test_shootdown_and_delete() {
    let (_next, tlb) = create_tlb(4, true);
    tlb.insert(TlbEntry::new(1, 0x1001));
    tlb.insert(TlbEntry::new(2, 0x1002));

    assert_eq!(tlb.shootdown(1), 1);
    assert!(tlb.look_up(1).is_none());
    assert!(tlb.delete_entry(2));
    assert!(!tlb.delete_entry(2));
    assert!(tlb.is_empty());
    assert!(tlb.is_consistent());
}

/// Tests that flushing spares global entries and frees the rest.
#[test]
fn test_flush_noglobal() {
    let (_next, tlb) = create_tlb(3, true);
    let mut global = TlbEntry::new(7, 0x1007);
    global.set_global(true);
    tlb.insert(global);
    tlb.insert(TlbEntry::new(8, 0x1008));
    tlb.insert(TlbEntry::new(9, 0x1009));
    assert!(tlb.is_full());

    tlb.flush_all_noglobal();
    assert_eq!(tlb.len(), 1);
    assert!(!tlb.is_full());
    assert!(tlb.look_up(7).unwrap().is_global());
    assert!(tlb.is_consistent());

    assert!(tlb.insert(TlbEntry::new(10, 0x100a)).is_none());
    assert!(tlb.insert(TlbEntry::new(11, 0x100b)).is_none());

    tlb.flush_all();
    assert!(tlb.is_empty());
    assert!(tlb.is_consistent());
}

/// Tests insertion only when absent.
#[test]
fn test_insert_if_absent() {
    let (_next, tlb) = create_tlb(4, true);
    assert!(tlb.insert_if_absent(TlbEntry::new(1, 0x1001)));
    assert!(!tlb.insert_if_absent(TlbEntry::new(1, 0x2001)));
    assert_eq!(tlb.look_up(1).unwrap().ppn(), 0x1001);
}

/// Tests that state-only mode charges nothing.
#[test]
fn test_timing_mode_off() {
    let (_next, tlb) = create_tlb(4, false);
    let mut miss = req(1, AccessType::Read);
    tlb.translate(&mut miss).unwrap();
    assert_eq!(miss.cycle, 100);
    let mut hit = req(1, AccessType::Read);
    tlb.translate(&mut hit).unwrap();
    assert_eq!(hit.cycle, 0);
    assert_eq!(tlb.shootdown(1), 0);
}

/// Tests the per-page access histogram.
#[test]
fn test_access_histogram() {
    let (_next, tlb) = create_tlb(4, true);
    for vpn in [1, 2, 1, 1] {
        tlb.translate(&mut req(vpn, AccessType::Read)).unwrap();
    }
    assert_eq!(tlb.access_histogram(), vec![(1, 3), (2, 1)]);
}

/// Tests that an empty TLB is rejected.
#[test]
fn test_zero_entries_rejected() {
    let next: Arc<dyn Translator> = Arc::new(OffsetTranslator::default());
    let config = TlbLevelConfig {
        entries: 0,
        hit_latency: 1,
        response_latency: 0,
    };
    let geometry = TlbGeometry {
        page_shift: 12,
        line_shift: 6,
        timing_mode: true,
    };
    assert!(matches!(
        CommonTlb::<TlbEntry>::new("l1", &config, geometry, next),
        Err(VmError::Config(_))
    ));
}
