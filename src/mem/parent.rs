//! Parent memory objects.
//!
//! Page-table fetches leave the translation structures through a set of
//! parent memory objects (cache banks or memory channels). The parent for a
//! given line is chosen by hashing the line address over the set size.

use crate::common::{Address, MemReq};
use std::sync::Arc;

/// A memory component that can serve simulated requests.
pub trait MemObject: Send + Sync {
    /// Returns the component name.
    fn name(&self) -> &str;

    /// Serves `req`, returning the cycle at which the response is available.
    fn access(&self, req: &mut MemReq) -> u64;
}

/// Selects the parent serving `line_addr` by XOR-folding the four 16-bit
/// chunks of the address.
pub fn parent_id(line_addr: Address, parents: usize) -> usize {
    debug_assert!(parents > 0);
    let mut folded = 0u64;
    let mut tmp = line_addr;
    for _ in 0..4 {
        folded ^= tmp & 0xffff;
        tmp >>= 16;
    }
    (folded % parents as u64) as usize
}

/// An ordered collection of parents with their network round-trip times.
#[derive(Clone, Default)]
pub struct ParentSet {
    parents: Vec<Arc<dyn MemObject>>,
    rtts: Vec<u32>,
}

impl ParentSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a parent reachable in `rtt` cycles.
    pub fn push(&mut self, parent: Arc<dyn MemObject>, rtt: u32) {
        self.parents.push(parent);
        self.rtts.push(rtt);
    }

    /// Returns the number of parents.
    pub fn len(&self) -> usize {
        self.parents.len()
    }

    /// Returns `true` if no parent is attached.
    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    /// Returns the parent serving `line_addr` and its round-trip time.
    pub fn route(&self, line_addr: Address) -> Option<(&dyn MemObject, u32)> {
        if self.parents.is_empty() {
            return None;
        }
        let id = parent_id(line_addr, self.parents.len());
        Some((self.parents[id].as_ref(), self.rtts[id]))
    }
}
