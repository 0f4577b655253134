//! Clustered TLB.
//!
//! Each slot caches a block of translations whose virtual pages share a
//! base (`vpn >> cluster_bits`) and whose physical pages share a base too.
//! Only the low bits of each member are stored. A mapping whose physical
//! page falls outside the block already cached for its virtual base cannot
//! join it and goes to the regular TLB instead.
//!
//! Replacement evicts the block with the lowest priority, where
//! `priority = recency + weight * members`, so sparse stale blocks go first.

use super::array::TlbArray;
use super::common::CommonTlb;
use super::entry::{ClusterTlbEntry, TlbEntry, TlbFlags, TlbRecord};
use super::{TlbGeometry, TlbStats, Translator};
use crate::common::{Address, MemReq, PhysAddr, Result, VmError};
use crate::config::ClusterTlbConfig;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::trace;

/// Outcome of a clustered insert.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClusterInsert {
    /// A new block was created for the mapping.
    NewBlock,
    /// The mapping joined the block cached for its virtual base.
    Appended,
    /// The mapping could not be clustered and went to the regular TLB.
    Bypassed,
}

struct ClusterState {
    array: TlbArray<ClusterTlbEntry>,
    stats: TlbStats,
}

/// A TLB of clustered blocks backed by a regular TLB.
pub struct ClusterTlb {
    name: String,
    geometry: TlbGeometry,
    cluster_bits: u32,
    weight: u64,
    hit_latency: u64,
    response_latency: u64,
    regular: Arc<CommonTlb>,
    state: Mutex<ClusterState>,
}

impl ClusterTlb {
    /// Creates an empty clustered TLB.
    ///
    /// # Arguments
    ///
    /// * `name` - Name used in diagnostics and statistics.
    /// * `config` - Capacity, cluster size, priority weight and latencies.
    /// * `geometry` - Page and line sizes, timing switch.
    /// * `regular` - TLB resolving misses and holding unclusterable mappings.
    pub fn new(
        name: impl Into<String>,
        config: &ClusterTlbConfig,
        geometry: TlbGeometry,
        regular: Arc<CommonTlb>,
    ) -> Result<Self> {
        let name = name.into();
        if config.entries == 0 {
            return Err(VmError::Config(format!("{name}: TLB needs at least one entry")));
        }
        if config.cluster_bits == 0 || config.cluster_bits > 8 {
            return Err(VmError::Config(format!(
                "{name}: cluster bits must be between 1 and 8, got {}",
                config.cluster_bits
            )));
        }
        Ok(Self {
            name,
            geometry,
            cluster_bits: config.cluster_bits,
            weight: config.weight,
            hit_latency: config.hit_latency,
            response_latency: config.response_latency,
            regular,
            state: Mutex::new(ClusterState {
                array: TlbArray::new(config.entries),
                stats: TlbStats::default(),
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, ClusterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn low_mask(&self) -> Address {
        (1 << self.cluster_bits) - 1
    }

    fn split(&self, page_no: Address) -> (Address, u32) {
        (page_no >> self.cluster_bits, (page_no & self.low_mask()) as u32)
    }

    fn op_latency(&self) -> u64 {
        if self.geometry.timing_mode {
            self.hit_latency
        } else {
            0
        }
    }

    /// The TLB behind this one.
    pub fn regular(&self) -> &Arc<CommonTlb> {
        &self.regular
    }

    /// Translates `req` and returns the physical line address.
    pub fn access(&self, req: &mut MemReq) -> Result<Address> {
        let ppn = self.translate(req)?;
        let offset = req.byte_addr(self.geometry.line_shift);
        Ok(PhysAddr::from_parts(ppn, offset, self.geometry.page_shift).line(self.geometry.line_shift))
    }

    /// Returns the cached translation of `vpn`, refreshing its block.
    pub fn look_up(&self, vpn: Address) -> Option<Address> {
        let (base_vpn, v_low) = self.split(vpn);
        let mut state = self.lock();
        let slot = state.array.slot_of_vpn(base_vpn)?;
        let sub = state.array.get(slot).sub_look_up(v_low)?;
        state.array.touch(slot);
        let entry = state.array.get_mut(slot);
        entry.update_priority(self.weight);
        Some((entry.base_ppn << self.cluster_bits) | Address::from(sub.p_low))
    }

    /// Caches `vpn -> ppn` with the given sharing state.
    ///
    /// A bypassed mapping is inserted into the regular TLB.
    pub fn insert(&self, vpn: Address, ppn: Address, flags: TlbFlags) -> ClusterInsert {
        let (base_vpn, v_low) = self.split(vpn);
        let (base_ppn, p_low) = self.split(ppn);
        let outcome = {
            let mut state = self.lock();
            match state.array.slot_of_vpn(base_vpn) {
                Some(slot) if state.array.get(slot).base_ppn == base_ppn => {
                    state.array.touch(slot);
                    let entry = state.array.get_mut(slot);
                    entry.insert(v_low, p_low, flags);
                    entry.update_priority(self.weight);
                    ClusterInsert::Appended
                }
                Some(_) => ClusterInsert::Bypassed,
                None if state.array.slot_of_ppn(base_ppn).is_some() => ClusterInsert::Bypassed,
                None => {
                    if state.array.is_full() {
                        if let Some(victim) = state.array.victim(|e| e.priority) {
                            let old = state.array.release(victim);
                            trace!(tlb = %self.name, base_vpn = old.base_vpn, members = old.len(), "evict block");
                            state.stats.evictions += 1;
                        }
                    }
                    let mut entry = ClusterTlbEntry::new(base_vpn, base_ppn);
                    entry.insert(v_low, p_low, flags);
                    if let Some(slot) = state.array.place(entry) {
                        state.array.get_mut(slot).update_priority(self.weight);
                    }
                    ClusterInsert::NewBlock
                }
            }
        };

        if outcome == ClusterInsert::Bypassed {
            self.lock().stats.bypasses += 1;
            let mut entry = TlbEntry::new(vpn, ppn);
            entry.set_shared(flags.contains(TlbFlags::SHARED));
            entry.set_dirty(flags.contains(TlbFlags::DIRTY));
            self.regular.insert(entry);
        }
        trace!(tlb = %self.name, vpn, ppn, ?outcome, "insert");
        outcome
    }

    /// Drops the member for `vpn` here and in the regular TLB.
    pub fn shootdown(&self, vpn: Address) -> u64 {
        let (base_vpn, v_low) = self.split(vpn);
        {
            let mut state = self.lock();
            if let Some(slot) = state.array.slot_of_vpn(base_vpn) {
                let entry = state.array.get_mut(slot);
                if entry.remove(v_low) && entry.is_empty() {
                    state.array.release(slot);
                }
            }
        }
        self.regular.shootdown(vpn);
        self.op_latency()
    }

    /// Updates sharing state of the member translating to `ppn` and of the
    /// regular TLB's entry. Other members of the block keep theirs.
    pub fn update_tlb_flags(&self, ppn: Address, shared: bool, dirty: bool) -> u64 {
        let (base_ppn, p_low) = self.split(ppn);
        {
            let mut state = self.lock();
            if let Some(slot) = state.array.slot_of_ppn(base_ppn) {
                if let Some(sub) = state.array.get_mut(slot).sub_look_up_pa(p_low) {
                    sub.set_shared(shared);
                    sub.set_dirty(dirty);
                }
            }
        }
        self.regular.update_tlb_flags(ppn, shared, dirty);
        self.op_latency()
    }

    /// Moves the member translating to `ppn` to `new_ppn`.
    ///
    /// A new page inside the same physical block keeps its membership; one
    /// outside the block is dropped from the cluster.
    pub fn update_ppn(&self, ppn: Address, new_ppn: Address) -> u64 {
        let (base_ppn, p_low) = self.split(ppn);
        let (new_base, new_low) = self.split(new_ppn);
        {
            let mut state = self.lock();
            if let Some(slot) = state.array.slot_of_ppn(base_ppn) {
                let entry = state.array.get_mut(slot);
                if let Some(sub) = entry.sub_look_up_pa(p_low) {
                    if new_base == base_ppn {
                        sub.p_low = new_low;
                    } else {
                        let v_low = sub.v_low;
                        if entry.remove(v_low) && entry.is_empty() {
                            state.array.release(slot);
                        }
                    }
                }
            }
        }
        self.regular.update_ppn(ppn, new_ppn);
        self.op_latency()
    }

    /// Frees every block here and every entry of the regular TLB.
    pub fn flush_all(&self) {
        self.lock().array.release_where(|_| true);
        self.regular.flush_all();
    }

    /// Frees every non-global block and regular entry.
    pub fn flush_all_noglobal(&self) {
        self.lock().array.release_where(|e| !e.is_global());
        self.regular.flush_all_noglobal();
    }

    pub fn is_full(&self) -> bool {
        self.lock().array.is_full()
    }

    /// Number of cached blocks.
    pub fn len(&self) -> usize {
        self.lock().array.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().array.is_empty()
    }

    /// Members cached in the block for `base_vpn`.
    pub fn block_len(&self, base_vpn: Address) -> usize {
        let state = self.lock();
        state
            .array
            .slot_of_vpn(base_vpn)
            .map_or(0, |slot| state.array.get(slot).len())
    }

    pub fn stats(&self) -> TlbStats {
        self.lock().stats
    }

    pub fn is_consistent(&self) -> bool {
        self.lock().array.is_consistent()
    }
}

impl Translator for ClusterTlb {
    fn name(&self) -> &str {
        &self.name
    }

    fn translate(&self, req: &mut MemReq) -> Result<Address> {
        let vpn = req.byte_addr(self.geometry.line_shift) >> self.geometry.page_shift;
        let (base_vpn, v_low) = self.split(vpn);
        {
            let mut state = self.lock();
            state.stats.accesses += 1;
            let hit = state
                .array
                .slot_of_vpn(base_vpn)
                .and_then(|slot| state.array.get(slot).sub_look_up(v_low).map(|sub| (slot, sub)));
            if let Some((slot, sub)) = hit {
                state.stats.hits += 1;
                state.array.touch(slot);
                let entry = state.array.get_mut(slot);
                entry.update_priority(self.weight);
                let ppn = (entry.base_ppn << self.cluster_bits) | Address::from(sub.p_low);
                req.page_shared = sub.is_shared();
                req.page_dirty = sub.is_dirty();
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
        let ppn = self.regular.translate(req)?;
        let mut flags = TlbFlags::empty();
        flags.set(TlbFlags::SHARED, req.page_shared);
        flags.set(TlbFlags::DIRTY, req.page_dirty);
        self.insert(vpn, ppn, flags);
        if self.geometry.timing_mode {
            req.cycle += self.response_latency;
        }
        Ok(ppn)
    }
}
