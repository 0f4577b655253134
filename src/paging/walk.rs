//! Page-table walk timing.
//!
//! A walk turns the physical addresses of the page-table entries a lookup
//! touched into simulated memory reads. Each read consults the page-walk
//! cache first and otherwise goes to the parent memory object owning its
//! line. The timing records the parents leave with the requesting core's
//! recorder are folded into one chain: the first record becomes the root
//! and each later fetch is appended after the current tail.

use super::pw_cache::PageWalkCache;
use crate::common::constants::ENTRY_SIZE_512;
use crate::common::{Address, MemReq};
use crate::mem::{ParentSet, RecorderSet, TimingRecord};
use std::sync::PoisonError;
use tracing::trace;

/// How the fetches of one walk overlap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WalkOrder {
    /// Each fetch waits for the previous one (radix trees, linear probing).
    Sequential,
    /// All fetches issue together (cuckoo ways).
    Parallel,
}

/// Everything a walk needs besides the table itself.
#[derive(Clone, Copy)]
pub struct WalkContext<'a> {
    pub parents: &'a ParentSet,
    pub pwc: Option<&'a PageWalkCache>,
    pub recorders: Option<&'a RecorderSet>,
    /// When `false`, fetches are charged a flat `mem_access_time` and never
    /// reach the parents.
    pub send_ptw: bool,
    pub line_shift: u32,
    pub mem_access_time: u64,
}

/// Physical address of entry `entry_id` of the table on page `page_no`.
pub fn pgt_addr(page_no: Address, entry_id: usize, page_shift: u32) -> Address {
    (page_no << page_shift) | (ENTRY_SIZE_512 * entry_id as u64)
}

/// Issues one simulated read per entry address and returns the completion
/// cycle of the walk.
///
/// # Arguments
///
/// * `req` - The request being translated; its cycle is the walk start.
/// * `addrs` - Physical byte addresses of the entries, in walk order.
/// * `ctx` - Parents, page-walk cache and recorders.
/// * `order` - Whether fetches are serialized or overlapped.
pub fn load_page_tables(req: &MemReq, addrs: &[Address], ctx: &WalkContext<'_>, order: WalkOrder) -> u64 {
    let mut start = req.cycle;
    let mut longest = 0;
    let mut first = TimingRecord::default();

    for (i, &addr) in addrs.iter().enumerate() {
        let mut fetch = req.walk_fetch(addr >> ctx.line_shift, start);
        fetch.is_first_ptw = i == 0;
        fetch.is_last_ptw = i + 1 == addrs.len();

        let (latency, reached_parent) = fetch_latency(&mut fetch, ctx);
        trace!(src = req.src_id, step = i, addr, latency, pwc_hit = fetch.pwc_hit, "walk fetch");
        match order {
            WalkOrder::Sequential => start += latency,
            WalkOrder::Parallel => longest = longest.max(latency),
        }

        if !reached_parent {
            continue;
        }
        if let Some(recorder) = ctx.recorders.and_then(|r| r.get(req.src_id)) {
            let mut recorder = recorder.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(record) = recorder.pop_record() {
                if !first.is_valid() {
                    first = record;
                } else if let (Some(tail), Some(head), Some(end)) =
                    (first.end_event, record.start_event, record.end_event)
                {
                    recorder.add_child(tail, head);
                    first.end_event = Some(end);
                    first.resp_cycle = record.resp_cycle;
                }
            }
        }
    }

    if first.is_valid() {
        if let Some(recorder) = ctx.recorders.and_then(|r| r.get(req.src_id)) {
            recorder.lock().unwrap_or_else(PoisonError::into_inner).push_record(first);
        }
    }

    match order {
        WalkOrder::Sequential => start,
        WalkOrder::Parallel => start + longest,
    }
}

/// Latency of a single walk fetch, and whether a parent served it.
fn fetch_latency(fetch: &mut MemReq, ctx: &WalkContext<'_>) -> (u64, bool) {
    let mut latency = 0;
    if let Some(pwc) = ctx.pwc {
        latency += pwc.access(fetch);
        if fetch.pwc_hit {
            return (latency, false);
        }
    }
    if !ctx.send_ptw {
        return (latency + ctx.mem_access_time, false);
    }
    match ctx.parents.route(fetch.line_addr) {
        Some((parent, rtt)) => {
            let issued = fetch.cycle;
            let done = parent.access(fetch);
            (latency + done.saturating_sub(issued) + u64::from(rtt), true)
        }
        None => (latency + ctx.mem_access_time, false),
    }
}
