//! Page Table Walker.
//!
//! The last translation level below the TLBs. A walker looks the request
//! up in the shared page table and times the walk against the page-walk
//! cache and parent memories. A miss is a page fault: the walker takes a
//! fresh frame from the allocator and maps it for the requesting core.

use super::walk::WalkContext;
use super::{PageTableOps, PagingParams, PageWalkCache, SharedPaging};
use crate::common::constants::PAGE_SHIFT;
use crate::common::{Address, MemReq, Result, VmError};
use crate::mem::{PageAllocator, ParentSet, RecorderSet};
use crate::tlb::Translator;
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, trace};

/// Walk counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct WalkerStats {
    pub walks: u64,
    pub faults: u64,
    /// Cycles spent in walks and fault handling.
    pub walk_cycles: u64,
}

/// Resolves TLB misses against a shared page table.
pub struct PageTableWalker {
    name: String,
    paging: SharedPaging,
    allocator: Arc<dyn PageAllocator>,
    parents: ParentSet,
    pwc: Option<Arc<PageWalkCache>>,
    recorders: Option<Arc<RecorderSet>>,
    send_ptw: bool,
    params: PagingParams,
    page_fault_latency: u64,
    stats: Mutex<WalkerStats>,
}

impl PageTableWalker {
    /// Creates a walker with no parents, which charges every walk step a
    /// flat `mem_access_time`.
    ///
    /// # Arguments
    ///
    /// * `name` - Name used in diagnostics.
    /// * `paging` - The page table shared by all cores.
    /// * `allocator` - Source of frames for page faults.
    /// * `params` - Line size and access time.
    /// * `page_fault_latency` - Cycles charged per fault on top of mapping.
    pub fn new(
        name: impl Into<String>,
        paging: SharedPaging,
        allocator: Arc<dyn PageAllocator>,
        params: PagingParams,
        page_fault_latency: u64,
    ) -> Self {
        Self {
            name: name.into(),
            paging,
            allocator,
            parents: ParentSet::new(),
            pwc: None,
            recorders: None,
            send_ptw: false,
            params,
            page_fault_latency,
            stats: Mutex::new(WalkerStats::default()),
        }
    }

    /// Sends walk fetches to `parents` when `send_ptw` is set.
    pub fn with_parents(mut self, parents: ParentSet, send_ptw: bool) -> Self {
        self.parents = parents;
        self.send_ptw = send_ptw;
        self
    }

    pub fn with_pwc(mut self, pwc: Arc<PageWalkCache>) -> Self {
        self.pwc = Some(pwc);
        self
    }

    /// Chains the timing records of each walk's fetches.
    pub fn with_recorders(mut self, recorders: Arc<RecorderSet>) -> Self {
        self.recorders = Some(recorders);
        self
    }

    pub fn paging(&self) -> &SharedPaging {
        &self.paging
    }

    pub fn stats(&self) -> WalkerStats {
        *self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Translator for PageTableWalker {
    fn name(&self) -> &str {
        &self.name
    }

    /// Walks the page table for `req`, handling a fault if nothing is
    /// mapped. The table stays locked from lookup to fault mapping so two
    /// cores faulting on one page map it once.
    fn translate(&self, req: &mut MemReq) -> Result<Address> {
        let start = req.cycle;
        let mut paging = self.paging.lock().unwrap_or_else(PoisonError::into_inner);
        let ctx = WalkContext {
            parents: &self.parents,
            pwc: self.pwc.as_deref(),
            recorders: self.recorders.as_deref(),
            send_ptw: self.send_ptw,
            line_shift: self.params.line_shift,
            mem_access_time: self.params.mem_access_time,
        };
        let hit = paging.access_with_walk(req, &ctx);
        trace!(walker = %self.name, src = req.src_id, line = req.line_addr, cycles = req.cycle - start, hit = hit.is_some(), "page walk");

        let ppn = match hit {
            Some(ppn) => ppn,
            None => {
                let addr = req.byte_addr(self.params.line_shift);
                let style = paging.style();
                // A large page needs a block covering the whole page.
                let order = style.page_shift() - PAGE_SHIFT;
                let page = self.allocator.allocate_pages(order).ok_or(VmError::OutOfFrames {
                    structure: "page table walker",
                    operation: "page fault",
                    addr,
                })?;
                let latency = match paging.map_for(req.src_id, addr, page, req.is_write()) {
                    Ok(latency) => latency,
                    Err(err) => {
                        self.allocator.reclaim(page);
                        return Err(err);
                    }
                };
                req.cycle += self.page_fault_latency + latency;
                req.page_dirty = req.is_write();
                req.trigger_page_dirty = req.is_write();
                req.page_shared = false;
                debug!(walker = %self.name, src = req.src_id, addr, page = page.page_no(), "page fault");
                style.leaf_ppn(addr, page.page_no())
            }
        };
        drop(paging);

        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        stats.walks += 1;
        if hit.is_none() {
            stats.faults += 1;
        }
        stats.walk_cycles += req.cycle - start;
        Ok(ppn)
    }
}
