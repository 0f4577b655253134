//! Integration tests for the page table walker.

use std::sync::Arc;
use std::thread;
use vmem_sim::common::{AccessType, MemReq, VmError};
use vmem_sim::config::Config;
use vmem_sim::mem::{FrameAllocator, MemoryPort, PageAllocator, ParentSet, RecorderSet, SimpleController};
use vmem_sim::paging::{PageTableOps, PageTableWalker, PageWalkCache, Paging, PagingParams, PagingStyle};
use vmem_sim::tlb::Translator;

const ADDR: u64 = 0x1000_0000;

/// Walker under test with the pieces its tests inspect.
struct Setup {
    alloc: Arc<FrameAllocator>,
    recorders: Arc<RecorderSet>,
    port: Arc<MemoryPort>,
    walker: PageTableWalker,
}

/// Helper to create a walker over one 100-cycle memory port with a 4-cycle
/// round trip and a 10-cycle table access time.
fn create_walker(style: PagingStyle, pwc: bool, send_ptw: bool) -> Setup {
    create_walker_with_frames(style, pwc, send_ptw, 1 << 16)
}

/// Helper to create the same walker over an allocator of `frames` pages.
fn create_walker_with_frames(style: PagingStyle, pwc: bool, send_ptw: bool, frames: u64) -> Setup {
    let mut config = Config::default();
    config.paging.style = style;
    config.paging.mem_access_time = 10;
    config.general.cores = 4;

    let alloc = Arc::new(FrameAllocator::new(0x100, frames));
    let recorders = Arc::new(RecorderSet::new(4));
    let port = Arc::new(
        MemoryPort::new("mem0", Box::new(SimpleController::new(100)), 6).with_recorders(recorders.clone()),
    );
    let mut parents = ParentSet::new();
    parents.push(port.clone(), 4);

    let paging = Paging::new(&config, alloc.clone()).unwrap().shared();
    let mut walker = PageTableWalker::new("walker", paging, alloc.clone(), PagingParams::from_config(&config), 1000)
        .with_parents(parents, send_ptw)
        .with_recorders(recorders.clone());
    if pwc {
        walker = walker.with_pwc(Arc::new(PageWalkCache::new(32, 4, 2, 1).unwrap()));
    }
    Setup {
        alloc,
        recorders,
        port,
        walker,
    }
}

/// Helper to create a request at cycle 0.
fn req(addr: u64, access: AccessType, core: u32) -> MemReq {
    MemReq::new(addr, 6, access, core, 0)
}

/// Tests that a fault maps the page and the next walk hits it.
#[test]
fn test_fault_then_hit() {
    let setup = create_walker(PagingStyle::LongModeNormal, false, true);

    let mut first = req(ADDR, AccessType::Read, 0);
    let ppn = setup.walker.translate(&mut first).unwrap();
    // Root fetch, fault latency, then three directories and the leaf.
    assert_eq!(first.cycle, 104 + 1000 + 40);

    let mut second = req(ADDR + 0x40, AccessType::Read, 0);
    assert_eq!(setup.walker.translate(&mut second).unwrap(), ppn);
    assert_eq!(second.cycle, 4 * 104);

    let stats = setup.walker.stats();
    assert_eq!(stats.walks, 2);
    assert_eq!(stats.faults, 1);
    assert_eq!(stats.walk_cycles, first.cycle + second.cycle);
    assert_eq!(setup.port.accesses(), 5);
    assert_eq!(setup.alloc.in_use(), 5);
}

/// Tests that the fetches of one walk form a single timing chain.
#[test]
fn test_walk_records_chain() {
    let setup = create_walker(PagingStyle::LongModeNormal, false, true);
    setup.walker.translate(&mut req(ADDR, AccessType::Read, 1)).unwrap();
    setup.walker.translate(&mut req(ADDR, AccessType::Read, 1)).unwrap();

    let mut recorder = setup.recorders.get(1).unwrap().lock().unwrap();
    assert_eq!(recorder.pending(), 2);
    let record = recorder.pop_record().unwrap();
    assert!(record.is_ptw);
    assert_eq!(record.req_cycle, 0);
    assert_eq!(record.resp_cycle, 312 + 100);

    let chain = recorder.chain(record.start_event.unwrap());
    assert_eq!(chain.len(), 4);
    assert_eq!(chain.last().copied(), record.end_event);
    let starts: Vec<u64> = chain
        .iter()
        .map(|&id| recorder.event(id).unwrap().start_cycle)
        .collect();
    assert_eq!(starts, vec![0, 104, 208, 312]);
    assert_eq!(setup.recorders.get(0).unwrap().lock().unwrap().pending(), 0);
}

/// Tests that the page-walk cache short-circuits repeated walk steps.
#[test]
fn test_pwc_shortens_walks() {
    let setup = create_walker(PagingStyle::LongModeNormal, true, true);

    let mut fault = req(ADDR, AccessType::Read, 0);
    setup.walker.translate(&mut fault).unwrap();
    assert_eq!(fault.cycle, 107 + 1000 + 40);

    let mut warm = req(ADDR, AccessType::Read, 0);
    setup.walker.translate(&mut warm).unwrap();
    assert_eq!(warm.cycle, 2 + 3 * 107);

    let mut hot = req(ADDR, AccessType::Read, 0);
    setup.walker.translate(&mut hot).unwrap();
    assert_eq!(hot.cycle, 4 * 2);
    assert_eq!(setup.port.accesses(), 4);
}

/// Tests the flat step cost when walks stay off the memory network.
#[test]
fn test_no_send_ptw() {
    let setup = create_walker(PagingStyle::LongModeNormal, false, false);
    let mut fault = req(ADDR, AccessType::Read, 0);
    setup.walker.translate(&mut fault).unwrap();
    assert_eq!(fault.cycle, 10 + 1000 + 40);

    let mut hit = req(ADDR, AccessType::Read, 0);
    setup.walker.translate(&mut hit).unwrap();
    assert_eq!(hit.cycle, 40);
    assert_eq!(setup.port.accesses(), 0);
    assert_eq!(setup.recorders.get(0).unwrap().lock().unwrap().pending(), 0);
}

/// Tests that cuckoo ways are fetched in parallel.
#[test]
fn test_cuckoo_parallel_walk() {
    let setup = create_walker(PagingStyle::CuckooNormal, false, true);
    let mut fault = req(ADDR, AccessType::Read, 0);
    setup.walker.translate(&mut fault).unwrap();
    assert_eq!(fault.cycle, 104 + 1000 + 10);
    assert_eq!(setup.port.accesses(), 4);

    let mut hit = req(ADDR, AccessType::Read, 0);
    setup.walker.translate(&mut hit).unwrap();
    assert_eq!(hit.cycle, 104);
}

/// Tests the hash table walk through a fault.
#[test]
fn test_hash_walk() {
    let setup = create_walker(PagingStyle::HashNormal, false, true);
    let mut fault = req(ADDR, AccessType::Write, 0);
    setup.walker.translate(&mut fault).unwrap();
    assert_eq!(fault.cycle, 104 + 1000 + 10);
    assert!(fault.page_dirty);
    assert!(fault.trigger_page_dirty);

    let mut hit = req(ADDR, AccessType::Read, 0);
    setup.walker.translate(&mut hit).unwrap();
    assert_eq!(hit.cycle, 104);
    assert!(hit.page_dirty);
}

/// Tests that large page faults return the 4KB frame inside the page.
#[test]
fn test_large_page_fault() {
    let setup = create_walker(PagingStyle::LongModeMiddle, false, true);
    let ppn = setup.walker.translate(&mut req(0x20_3000, AccessType::Read, 0)).unwrap();
    assert_eq!(ppn % 512, 3);
    let again = setup.walker.translate(&mut req(0x20_5000, AccessType::Read, 0)).unwrap();
    assert_eq!(again, ppn + 2);
    assert_eq!(setup.walker.stats().faults, 1);
}

/// Tests that 1GB page faults get whole blocks that no table shares.
#[test]
fn test_huge_page_faults_own_their_frames() {
    let setup = create_walker_with_frames(PagingStyle::LongModeHuge, false, true, 1 << 20);
    let first = setup.walker.translate(&mut req(0x80_0000, AccessType::Read, 0)).unwrap();
    let second = setup.walker.translate(&mut req(0x4000_0000, AccessType::Read, 0)).unwrap();
    assert_eq!(setup.walker.stats().faults, 2);
    assert_eq!(setup.walker.paging().lock().unwrap().stats().mapped_pages, 2);

    // 8MB into the first page is its frame 0x800.
    let first_block = first - 0x800;
    let second_block = second;
    assert_eq!(first_block % (1 << 18), 0);
    assert_eq!(second_block % (1 << 18), 0);
    assert!(first_block.abs_diff(second_block) >= 1 << 18);

    let inner = setup.walker.translate(&mut req(0x4000_0000 + 0x1234_5000, AccessType::Read, 0)).unwrap();
    assert_eq!(inner, second_block + 0x12345);

    // The root table and later frames lie outside both pages.
    let next = setup.alloc.allocate_pages(0).unwrap().page_no();
    for block in [first_block, second_block] {
        assert!(next < block || next >= block + (1 << 18));
        assert!(0x100 < block);
    }
}

/// Tests that a large page fault beyond the allocator's capacity fails cleanly.
#[test]
fn test_huge_page_fault_out_of_frames() {
    let setup = create_walker(PagingStyle::LongModeHuge, false, true);
    let err = setup.walker.translate(&mut req(0x4000_0000, AccessType::Read, 0)).unwrap_err();
    assert!(matches!(err, VmError::OutOfFrames { .. }));
    assert_eq!(setup.walker.paging().lock().unwrap().stats().mapped_pages, 0);
}

/// Tests that cores faulting on one page map it once.
#[test]
fn test_concurrent_faults_map_once() {
    let setup = create_walker(PagingStyle::LongModeNormal, true, true);
    let walker = &setup.walker;
    let ppns: Vec<u64> = thread::scope(|s| {
        let handles: Vec<_> = (0..4u32)
            .map(|core| s.spawn(move || walker.translate(&mut req(ADDR, AccessType::Read, core)).unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert!(ppns.iter().all(|&p| p == ppns[0]));
    assert_eq!(walker.stats().faults, 1);
    assert_eq!(walker.stats().walks, 4);
    assert_eq!(walker.paging().lock().unwrap().stats().mapped_pages, 1);
}

/// Tests that running out of frames on a fault is reported.
#[test]
fn test_fault_out_of_frames() {
    let config = Config::default();
    let alloc = Arc::new(FrameAllocator::new(0x100, 1));
    let paging = Paging::new(&config, alloc.clone()).unwrap().shared();
    let walker = PageTableWalker::new("walker", paging, alloc.clone(), PagingParams::from_config(&config), 1000);

    let err = walker.translate(&mut req(ADDR, AccessType::Read, 0)).unwrap_err();
    assert!(matches!(err, VmError::OutOfFrames { .. }));
    assert_eq!(alloc.in_use(), 1);
}
