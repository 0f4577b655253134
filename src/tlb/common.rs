//! Common TLB.
//!
//! A fully associative TLB with strict LRU replacement. Misses go to the
//! next translator and the result is inserted on the way back; eviction
//! happens at insert time when no slot is free. All state sits behind one
//! lock, which is never held while the next level is consulted.

use super::array::TlbArray;
use super::entry::{TlbEntry, TlbRecord};
use super::{TlbGeometry, TlbStats, Translator};
use crate::common::{Address, MemReq, PhysAddr, Result, VmError};
use crate::config::TlbLevelConfig;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{trace, warn};

struct TlbState<T> {
    array: TlbArray<T>,
    stats: TlbStats,
    histogram: HashMap<Address, u64>,
}

/// A fully associative LRU TLB.
pub struct CommonTlb<T: TlbRecord = TlbEntry> {
    name: String,
    geometry: TlbGeometry,
    hit_latency: u64,
    response_latency: u64,
    next: Arc<dyn Translator>,
    state: Mutex<TlbState<T>>,
}

impl<T: TlbRecord> CommonTlb<T> {
    /// Creates an empty TLB.
    ///
    /// # Arguments
    ///
    /// * `name` - Name used in diagnostics and statistics.
    /// * `config` - Capacity and latencies.
    /// * `geometry` - Page and line sizes, timing switch.
    /// * `next` - Translator resolving misses.
    pub fn new(
        name: impl Into<String>,
        config: &TlbLevelConfig,
        geometry: TlbGeometry,
        next: Arc<dyn Translator>,
    ) -> Result<Self> {
        let name = name.into();
        if config.entries == 0 {
            return Err(VmError::Config(format!("{name}: TLB needs at least one entry")));
        }
        Ok(Self {
            name,
            geometry,
            hit_latency: config.hit_latency,
            response_latency: config.response_latency,
            next,
            state: Mutex::new(TlbState {
                array: TlbArray::new(config.entries),
                stats: TlbStats::default(),
                histogram: HashMap::new(),
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, TlbState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Latency of a maintenance operation.
    fn op_latency(&self) -> u64 {
        if self.geometry.timing_mode {
            self.hit_latency
        } else {
            0
        }
    }

    /// Translates `req` and returns the physical line address.
    pub fn access(&self, req: &mut MemReq) -> Result<Address> {
        let ppn = self.translate(req)?;
        let offset = req.byte_addr(self.geometry.line_shift);
        Ok(PhysAddr::from_parts(ppn, offset, self.geometry.page_shift).line(self.geometry.line_shift))
    }

    /// Returns the entry for `vpn`, marking it most recently used.
    pub fn look_up(&self, vpn: Address) -> Option<T> {
        let mut state = self.lock();
        let slot = state.array.slot_of_vpn(vpn)?;
        state.array.touch(slot);
        Some(state.array.get(slot).clone())
    }

    /// Returns the entry translating to `ppn`.
    pub fn look_up_pa(&self, ppn: Address) -> Option<T> {
        let state = self.lock();
        let slot = state.array.slot_of_ppn(ppn)?;
        Some(state.array.get(slot).clone())
    }

    /// Inserts `entry`, evicting the LRU entry if the TLB is full.
    ///
    /// An entry already cached for the same virtual page is replaced, as is
    /// one cached for the same physical page.
    ///
    /// # Returns
    ///
    /// The evicted entry, if any.
    pub fn insert(&self, entry: T) -> Option<T> {
        let mut state = self.lock();
        if let Some(slot) = state.array.slot_of_vpn(entry.vpn()) {
            state.array.release(slot);
        }
        if let Some(slot) = state.array.slot_of_ppn(entry.ppn()) {
            state.array.release(slot);
        }
        let mut evicted = None;
        if state.array.is_full() {
            if let Some(victim) = state.array.victim(T::lru_seq) {
                let old = state.array.release(victim);
                trace!(tlb = %self.name, vpn = old.vpn(), "evict");
                state.stats.evictions += 1;
                evicted = Some(old);
            }
        }
        state.array.place(entry);
        evicted
    }

    /// Inserts `entry` unless its virtual page is already cached.
    pub fn insert_if_absent(&self, entry: T) -> bool {
        if self.lock().array.slot_of_vpn(entry.vpn()).is_some() {
            return false;
        }
        self.insert(entry);
        true
    }

    /// Evicts and returns the least recently used entry.
    pub fn evict(&self) -> Option<T> {
        let mut state = self.lock();
        let victim = state.array.victim(T::lru_seq)?;
        state.stats.evictions += 1;
        Some(state.array.release(victim))
    }

    /// Invalidates the entry for `vpn` on behalf of a remote core.
    ///
    /// # Returns
    ///
    /// The latency of the operation.
    pub fn shootdown(&self, vpn: Address) -> u64 {
        let mut state = self.lock();
        if let Some(slot) = state.array.slot_of_vpn(vpn) {
            state.array.release(slot);
        }
        self.op_latency()
    }

    /// Updates the flags of the entry translating to `ppn`.
    pub fn update_tlb_flags(&self, ppn: Address, shared: bool, dirty: bool) -> u64 {
        let mut state = self.lock();
        if let Some(slot) = state.array.slot_of_ppn(ppn) {
            let entry = state.array.get_mut(slot);
            entry.set_shared(shared);
            entry.set_dirty(dirty);
        }
        self.op_latency()
    }

    /// Points the entry translating to `ppn` at `new_ppn`, as after a page
    /// migration.
    pub fn update_ppn(&self, ppn: Address, new_ppn: Address) -> u64 {
        let mut state = self.lock();
        if let Some(slot) = state.array.slot_of_ppn(ppn) {
            if let Some(alias) = state.array.slot_of_ppn(new_ppn) {
                if alias != slot {
                    state.array.release(alias);
                }
            }
            state.array.rekey_ppn(slot, new_ppn);
        }
        self.op_latency()
    }

    /// Points the entry for `vpn` at `ppn`.
    pub fn update_entry(&self, vpn: Address, ppn: Address) -> u64 {
        let mut state = self.lock();
        if let Some(slot) = state.array.slot_of_vpn(vpn) {
            if let Some(alias) = state.array.slot_of_ppn(ppn) {
                if alias != slot {
                    state.array.release(alias);
                }
            }
            state.array.rekey_ppn(slot, ppn);
        }
        self.op_latency()
    }

    /// Removes the entry for `vpn`; returns `false` if none was cached.
    pub fn delete_entry(&self, vpn: Address) -> bool {
        let mut state = self.lock();
        match state.array.slot_of_vpn(vpn) {
            Some(slot) => {
                state.array.release(slot);
                true
            }
            None => {
                warn!(tlb = %self.name, vpn, "deleting an entry that is not cached");
                false
            }
        }
    }

    /// Frees every slot.
    pub fn flush_all(&self) {
        self.lock().array.release_where(|_| true);
    }

    /// Frees every slot not marked global.
    pub fn flush_all_noglobal(&self) {
        self.lock().array.release_where(|e| !e.is_global());
    }

    pub fn is_full(&self) -> bool {
        self.lock().array.is_full()
    }

    /// Number of valid entries.
    pub fn len(&self) -> usize {
        self.lock().array.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().array.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.lock().array.capacity()
    }

    pub fn stats(&self) -> TlbStats {
        self.lock().stats
    }

    /// Accesses per virtual page, most accessed first.
    pub fn access_histogram(&self) -> Vec<(Address, u64)> {
        let mut pages: Vec<(Address, u64)> = self.lock().histogram.iter().map(|(&v, &n)| (v, n)).collect();
        pages.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        pages
    }

    /// Checks the free-list/map invariant.
    pub fn is_consistent(&self) -> bool {
        self.lock().array.is_consistent()
    }
}

impl<T: TlbRecord> Translator for CommonTlb<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn translate(&self, req: &mut MemReq) -> Result<Address> {
        let vpn = req.byte_addr(self.geometry.line_shift) >> self.geometry.page_shift;
        {
            let mut state = self.lock();
            state.stats.accesses += 1;
            *state.histogram.entry(vpn).or_insert(0) += 1;
            if let Some(slot) = state.array.slot_of_vpn(vpn) {
                state.array.touch(slot);
                state.stats.hits += 1;
                let entry = state.array.get(slot);
                let ppn = entry.ppn();
                req.page_shared = entry.is_shared();
                req.page_dirty = entry.is_dirty();
                drop(state);
                if self.geometry.timing_mode {
                    req.cycle += self.hit_latency + self.response_latency;
                }
                trace!(tlb = %self.name, src = req.src_id, vpn, ppn, "hit");
                return Ok(ppn);
            }
            state.stats.misses += 1;
        }

        trace!(tlb = %self.name, src = req.src_id, vpn, "miss");
        if self.geometry.timing_mode {
            req.cycle += self.hit_latency;
        }
        let ppn = self.next.translate(req)?;
        let mut entry = T::new(vpn, ppn);
        entry.set_shared(req.page_shared);
        entry.set_dirty(req.page_dirty);
        self.insert(entry);
        if self.geometry.timing_mode {
            req.cycle += self.response_latency;
        }
        Ok(ppn)
    }
}
