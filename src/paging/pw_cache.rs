//! Page-Walk Cache.
//!
//! A set-associative presence filter over the cache-line addresses fetched
//! by page-table walks. It resolves nothing; it only predicts whether a
//! walk step would hit in a nearby cache. Each set keeps a recency stack
//! with the most recently used line at index 0 and the victim at the end.

use crate::common::{Address, MemReq, Result, VmError};
use serde::Serialize;
use std::sync::{Mutex, PoisonError};
use tracing::trace;

/// Sets and recency stacks of a page-walk cache.
#[derive(Debug)]
pub struct PwcArray {
    assoc: usize,
    set_mask: u64,
    /// One recency stack per set. Index 0 is MRU, the last index is LRU.
    usage: Vec<Vec<Address>>,
}

impl PwcArray {
    /// Creates an empty array.
    ///
    /// # Arguments
    ///
    /// * `lines` - Total number of cached line addresses.
    /// * `assoc` - Lines per set. `lines / assoc` must be a power of two.
    pub fn new(lines: usize, assoc: usize) -> Result<Self> {
        if assoc == 0 || lines == 0 || lines % assoc != 0 {
            return Err(VmError::Config(format!(
                "page-walk cache of {lines} lines cannot have associativity {assoc}"
            )));
        }
        let sets = lines / assoc;
        if !sets.is_power_of_two() {
            return Err(VmError::Config(format!(
                "page-walk cache set count {sets} is not a power of two"
            )));
        }
        Ok(Self {
            assoc,
            set_mask: sets as u64 - 1,
            usage: vec![Vec::with_capacity(assoc); sets],
        })
    }

    /// Number of sets.
    pub fn num_sets(&self) -> usize {
        self.usage.len()
    }

    pub fn assoc(&self) -> usize {
        self.assoc
    }

    /// Set index of `line_addr`.
    pub fn set_id(&self, line_addr: Address) -> usize {
        (line_addr & self.set_mask) as usize
    }

    /// Returns `true` if `line_addr` is resident, refreshing its recency.
    pub fn lookup(&mut self, line_addr: Address) -> bool {
        let set = self.set_id(line_addr);
        if self.usage[set].contains(&line_addr) {
            self.lru_update(set, line_addr);
            true
        } else {
            false
        }
    }

    /// Makes `line_addr` resident, evicting the set's LRU line if full.
    ///
    /// Returns the evicted line, if any.
    pub fn insert(&mut self, line_addr: Address) -> Option<Address> {
        let set = self.set_id(line_addr);
        let mut victim = None;
        if !self.usage[set].contains(&line_addr) && self.usage[set].len() >= self.assoc {
            victim = self.evict(set);
        }
        self.lru_update(set, line_addr);
        victim
    }

    /// Removes and returns the LRU line of `set`.
    pub fn evict(&mut self, set: usize) -> Option<Address> {
        self.usage[set].pop()
    }

    /// Moves `line_addr` to the MRU position of `set`.
    fn lru_update(&mut self, set: usize, line_addr: Address) {
        let stack = &mut self.usage[set];
        if let Some(pos) = stack.iter().position(|&x| x == line_addr) {
            stack.remove(pos);
        }
        stack.insert(0, line_addr);
    }

    /// Lines of `set`, most recently used first.
    pub fn set_lines(&self, set: usize) -> &[Address] {
        &self.usage[set]
    }
}

/// Hit and miss counters of a page-walk cache.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PwcStats {
    pub accesses: u64,
    pub hits: u64,
    pub misses: u64,
}

/// A page-walk cache shared by every walker of the simulation.
#[derive(Debug)]
pub struct PageWalkCache {
    array: Mutex<PwcArray>,
    stats: Mutex<PwcStats>,
    access_latency: u64,
    invalidate_latency: u64,
}

impl PageWalkCache {
    /// Creates a cache of `lines` lines in sets of `assoc`.
    pub fn new(lines: usize, assoc: usize, access_latency: u64, invalidate_latency: u64) -> Result<Self> {
        Ok(Self {
            array: Mutex::new(PwcArray::new(lines, assoc)?),
            stats: Mutex::new(PwcStats::default()),
            access_latency,
            invalidate_latency,
        })
    }

    /// Looks up the line of `req`, charging hit or miss latency.
    ///
    /// Sets `req.pwc_hit` and inserts the line on a miss.
    ///
    /// # Returns
    ///
    /// The latency of the lookup in cycles.
    pub fn access(&self, req: &mut MemReq) -> u64 {
        let hit = {
            let mut array = self.array.lock().unwrap_or_else(PoisonError::into_inner);
            let hit = array.lookup(req.line_addr);
            if !hit {
                array.insert(req.line_addr);
            }
            hit
        };
        req.pwc_hit = hit;

        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        stats.accesses += 1;
        if hit {
            stats.hits += 1;
            trace!(line = req.line_addr, "pwc hit");
            self.access_latency
        } else {
            stats.misses += 1;
            trace!(line = req.line_addr, "pwc miss");
            self.access_latency + self.invalidate_latency
        }
    }

    /// Returns `true` if `line_addr` is resident, refreshing its recency.
    pub fn lookup(&self, line_addr: Address) -> bool {
        self.array.lock().unwrap_or_else(PoisonError::into_inner).lookup(line_addr)
    }

    /// Makes `line_addr` resident.
    pub fn insert(&self, line_addr: Address) -> Option<Address> {
        self.array.lock().unwrap_or_else(PoisonError::into_inner).insert(line_addr)
    }

    pub fn stats(&self) -> PwcStats {
        *self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
