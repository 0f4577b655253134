//! Simulated memory request.
//!
//! A `MemReq` travels from the core through the TLB levels and the
//! page-table walker. Every layer adds its latency to `cycle`, and the
//! translation structures write the page's dirty/shared state back onto it.

use super::{AccessType, Address};

/// A simulated memory request.
#[derive(Clone, Debug, Default)]
pub struct MemReq {
    /// Cache line address (byte address shifted by the line size).
    pub line_addr: Address,
    /// Kind of access issuing the request.
    pub access: AccessType,
    /// Current simulated cycle of the request.
    pub cycle: u64,
    /// Identifier of the requesting core; indexes the event recorders.
    pub src_id: u32,
    /// Identifier of the requesting thread.
    pub thread_id: u32,

    /// Translation's page is dirty.
    pub page_dirty: bool,
    /// Translation's page is shared between requesters.
    pub page_shared: bool,
    /// This request made the page dirty for the first time.
    pub trigger_page_dirty: bool,
    /// This request made the page shared for the first time.
    pub trigger_page_shared: bool,

    /// Page-walk cache hit on this walk step.
    pub pwc_hit: bool,
    /// Request is a page-table fetch issued by a walker.
    pub is_ptw: bool,
    /// First fetch of a page-table walk.
    pub is_first_ptw: bool,
    /// Last fetch of a page-table walk.
    pub is_last_ptw: bool,
}

impl MemReq {
    /// Creates a request for a byte address at the given cycle.
    ///
    /// # Arguments
    ///
    /// * `addr` - Virtual byte address of the access.
    /// * `line_shift` - log2 of the cache line size.
    /// * `access` - Kind of access.
    /// * `src_id` - Requesting core.
    /// * `cycle` - Issue cycle.
    pub fn new(addr: Address, line_shift: u32, access: AccessType, src_id: u32, cycle: u64) -> Self {
        Self {
            line_addr: addr >> line_shift,
            access,
            cycle,
            src_id,
            thread_id: src_id,
            ..Self::default()
        }
    }

    /// Builds the read request issued for one page-table fetch of a walk.
    pub fn walk_fetch(&self, line_addr: Address, cycle: u64) -> Self {
        Self {
            line_addr,
            access: AccessType::Read,
            cycle,
            src_id: self.src_id,
            thread_id: self.thread_id,
            is_ptw: true,
            ..Self::default()
        }
    }

    /// Returns the byte address of the request.
    pub fn byte_addr(&self, line_shift: u32) -> Address {
        self.line_addr << line_shift
    }

    /// Returns `true` if the request writes memory.
    pub fn is_write(&self) -> bool {
        self.access.is_write()
    }
}
