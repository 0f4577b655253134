//! TLB entries.
//!
//! `TlbEntry` caches one page translation. `ClusterTlbEntry` caches a block
//! of up to `2^cluster_bits` translations that share a virtual base and a
//! physical base, storing only the low page-number bits of each member.

use crate::common::Address;
use bitflags::bitflags;

bitflags! {
    /// Status bits of a TLB entry.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct TlbFlags: u16 {
        const VALID = 0x01;
        const GLOBAL = 0x02;
        const UNCACHEABLE = 0x04;
        const PAT = 0x08;
        const NOEXEC = 0x10;
        const SHARED = 0x20;
        const DIRTY = 0x40;
    }
}

/// Behaviour shared by every kind of TLB entry.
pub trait TlbRecord: Clone + Default + Send {
    /// Creates a valid entry translating `vpn` to `ppn`.
    fn new(vpn: Address, ppn: Address) -> Self;

    /// Key in the virtual lookup map.
    fn vpn(&self) -> Address;

    /// Key in the physical lookup map.
    fn ppn(&self) -> Address;

    fn set_ppn(&mut self, ppn: Address);

    fn flags(&self) -> TlbFlags;

    fn flags_mut(&mut self) -> &mut TlbFlags;

    /// Sequence number of the last use; larger is more recent.
    fn lru_seq(&self) -> u64;

    fn set_lru_seq(&mut self, seq: u64);

    fn is_valid(&self) -> bool {
        self.flags().contains(TlbFlags::VALID)
    }

    fn set_valid(&mut self) {
        self.flags_mut().insert(TlbFlags::VALID);
    }

    /// Clears every flag; the slot becomes free.
    fn set_invalid(&mut self) {
        *self.flags_mut() = TlbFlags::empty();
    }

    fn is_global(&self) -> bool {
        self.flags().contains(TlbFlags::GLOBAL)
    }

    fn set_global(&mut self, global: bool) {
        self.flags_mut().set(TlbFlags::GLOBAL, global);
    }

    fn is_shared(&self) -> bool {
        self.flags().contains(TlbFlags::SHARED)
    }

    fn set_shared(&mut self, shared: bool) {
        self.flags_mut().set(TlbFlags::SHARED, shared);
    }

    fn is_dirty(&self) -> bool {
        self.flags().contains(TlbFlags::DIRTY)
    }

    fn set_dirty(&mut self, dirty: bool) {
        self.flags_mut().set(TlbFlags::DIRTY, dirty);
    }

    fn is_cacheable(&self) -> bool {
        !self.flags().contains(TlbFlags::UNCACHEABLE)
    }

    fn set_cacheable(&mut self, cacheable: bool) {
        self.flags_mut().set(TlbFlags::UNCACHEABLE, !cacheable);
    }

    fn pat_enabled(&self) -> bool {
        self.flags().contains(TlbFlags::PAT)
    }

    fn enable_pat(&mut self) {
        self.flags_mut().insert(TlbFlags::PAT);
    }

    fn is_executable(&self) -> bool {
        !self.flags().contains(TlbFlags::NOEXEC)
    }

    fn set_noexec(&mut self) {
        self.flags_mut().insert(TlbFlags::NOEXEC);
    }
}

/// A single-page translation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TlbEntry {
    pub v_page_no: Address,
    pub p_page_no: Address,
    pub flags: TlbFlags,
    pub lru_seq: u64,
}

impl TlbRecord for TlbEntry {
    fn new(vpn: Address, ppn: Address) -> Self {
        Self {
            v_page_no: vpn,
            p_page_no: ppn,
            flags: TlbFlags::VALID,
            lru_seq: 0,
        }
    }

    fn vpn(&self) -> Address {
        self.v_page_no
    }

    fn ppn(&self) -> Address {
        self.p_page_no
    }

    fn set_ppn(&mut self, ppn: Address) {
        self.p_page_no = ppn;
    }

    fn flags(&self) -> TlbFlags {
        self.flags
    }

    fn flags_mut(&mut self) -> &mut TlbFlags {
        &mut self.flags
    }

    fn lru_seq(&self) -> u64 {
        self.lru_seq
    }

    fn set_lru_seq(&mut self, seq: u64) {
        self.lru_seq = seq;
    }
}

/// One member of a cluster: low page-number bits on both sides and the
/// member's own sharing state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubPage {
    pub v_low: u32,
    pub p_low: u32,
    /// Only `SHARED` and `DIRTY` are kept per member.
    pub flags: TlbFlags,
}

impl SubPage {
    pub fn is_shared(&self) -> bool {
        self.flags.contains(TlbFlags::SHARED)
    }

    pub fn is_dirty(&self) -> bool {
        self.flags.contains(TlbFlags::DIRTY)
    }

    pub fn set_shared(&mut self, shared: bool) {
        self.flags.set(TlbFlags::SHARED, shared);
    }

    pub fn set_dirty(&mut self, dirty: bool) {
        self.flags.set(TlbFlags::DIRTY, dirty);
    }
}

/// A block of translations sharing virtual and physical bases.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClusterTlbEntry {
    /// Virtual page number shifted right by the cluster bits.
    pub base_vpn: Address,
    /// Physical page number shifted right by the cluster bits.
    pub base_ppn: Address,
    pub flags: TlbFlags,
    pub lru_seq: u64,
    /// Eviction priority; the lowest is evicted first.
    pub priority: u64,
    sub_pages: Vec<SubPage>,
}

impl ClusterTlbEntry {
    /// Adds the member `v_low -> p_low` with the sharing bits of `flags`,
    /// replacing an existing mapping of `v_low`.
    pub fn insert(&mut self, v_low: u32, p_low: u32, flags: TlbFlags) {
        let sub = SubPage {
            v_low,
            p_low,
            flags: flags & (TlbFlags::SHARED | TlbFlags::DIRTY),
        };
        match self.sub_pages.iter_mut().find(|s| s.v_low == v_low) {
            Some(existing) => *existing = sub,
            None => self.sub_pages.push(sub),
        }
    }

    /// Returns the member cached for `v_low`.
    pub fn sub_look_up(&self, v_low: u32) -> Option<SubPage> {
        self.sub_pages.iter().find(|s| s.v_low == v_low).copied()
    }

    /// Returns the member mapped to `p_low`.
    pub fn sub_look_up_pa(&mut self, p_low: u32) -> Option<&mut SubPage> {
        self.sub_pages.iter_mut().find(|s| s.p_low == p_low)
    }

    /// Removes the member `v_low`; returns `false` if it was not cached.
    pub fn remove(&mut self, v_low: u32) -> bool {
        let before = self.sub_pages.len();
        self.sub_pages.retain(|s| s.v_low != v_low);
        self.sub_pages.len() != before
    }

    /// Number of cached members.
    pub fn len(&self) -> usize {
        self.sub_pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sub_pages.is_empty()
    }

    pub fn sub_pages(&self) -> &[SubPage] {
        &self.sub_pages
    }

    /// Recomputes the priority from recency and population.
    pub fn update_priority(&mut self, weight: u64) {
        self.priority = self.lru_seq + weight * self.sub_pages.len() as u64;
    }
}

impl TlbRecord for ClusterTlbEntry {
    /// Creates an empty block for the bases `vpn` and `ppn`.
    fn new(vpn: Address, ppn: Address) -> Self {
        Self {
            base_vpn: vpn,
            base_ppn: ppn,
            flags: TlbFlags::VALID,
            ..Self::default()
        }
    }

    fn vpn(&self) -> Address {
        self.base_vpn
    }

    fn ppn(&self) -> Address {
        self.base_ppn
    }

    fn set_ppn(&mut self, ppn: Address) {
        self.base_ppn = ppn;
    }

    fn flags(&self) -> TlbFlags {
        self.flags
    }

    fn flags_mut(&mut self) -> &mut TlbFlags {
        &mut self.flags
    }

    fn lru_seq(&self) -> u64 {
        self.lru_seq
    }

    fn set_lru_seq(&mut self, seq: u64) {
        self.lru_seq = seq;
    }

    fn set_invalid(&mut self) {
        self.flags = TlbFlags::empty();
        self.sub_pages.clear();
        self.priority = 0;
    }
}
