//! TLB slot array.
//!
//! Slots are either free (on the free list, in neither map) or valid (in
//! both the virtual and the physical map). Every mutation keeps that
//! invariant; [`TlbArray::is_consistent`] checks it.

use super::entry::TlbRecord;
use crate::common::Address;
use std::collections::{HashMap, VecDeque};

/// Fixed-capacity storage for TLB entries.
#[derive(Debug)]
pub struct TlbArray<T> {
    slots: Vec<T>,
    free: VecDeque<usize>,
    by_vpn: HashMap<Address, usize>,
    by_ppn: HashMap<Address, usize>,
    seq: u64,
}

impl<T: TlbRecord> TlbArray<T> {
    /// Creates `entries` free slots.
    pub fn new(entries: usize) -> Self {
        Self {
            slots: vec![T::default(); entries],
            free: (0..entries).collect(),
            by_vpn: HashMap::with_capacity(entries),
            by_ppn: HashMap::with_capacity(entries),
            seq: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of valid slots.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.free.len() == self.slots.len()
    }

    pub fn is_full(&self) -> bool {
        self.free.is_empty()
    }

    pub fn slot_of_vpn(&self, vpn: Address) -> Option<usize> {
        self.by_vpn.get(&vpn).copied()
    }

    pub fn slot_of_ppn(&self, ppn: Address) -> Option<usize> {
        self.by_ppn.get(&ppn).copied()
    }

    pub fn get(&self, slot: usize) -> &T {
        &self.slots[slot]
    }

    /// Mutable access to a slot. Keys must be changed through
    /// [`TlbArray::rekey_ppn`].
    pub fn get_mut(&mut self, slot: usize) -> &mut T {
        &mut self.slots[slot]
    }

    /// Marks `slot` as most recently used.
    pub fn touch(&mut self, slot: usize) {
        self.seq += 1;
        let seq = self.seq;
        self.slots[slot].set_lru_seq(seq);
    }

    /// Returns the valid slot with the smallest `key`.
    pub fn victim(&self, key: impl Fn(&T) -> u64) -> Option<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_valid())
            .min_by_key(|(_, e)| key(e))
            .map(|(slot, _)| slot)
    }

    /// Stores `entry` in a free slot, marked valid and most recent.
    ///
    /// Returns `None` if no slot is free.
    pub fn place(&mut self, mut entry: T) -> Option<usize> {
        let slot = self.free.pop_front()?;
        entry.set_valid();
        self.by_vpn.insert(entry.vpn(), slot);
        self.by_ppn.insert(entry.ppn(), slot);
        self.slots[slot] = entry;
        self.touch(slot);
        Some(slot)
    }

    /// Frees `slot`, returning the entry it held.
    pub fn release(&mut self, slot: usize) -> T {
        let old = std::mem::take(&mut self.slots[slot]);
        if self.by_vpn.get(&old.vpn()) == Some(&slot) {
            self.by_vpn.remove(&old.vpn());
        }
        if self.by_ppn.get(&old.ppn()) == Some(&slot) {
            self.by_ppn.remove(&old.ppn());
        }
        self.slots[slot].set_invalid();
        self.free.push_back(slot);
        old
    }

    /// Changes the physical key of `slot`.
    pub fn rekey_ppn(&mut self, slot: usize, ppn: Address) {
        let old = self.slots[slot].ppn();
        if self.by_ppn.get(&old) == Some(&slot) {
            self.by_ppn.remove(&old);
        }
        self.slots[slot].set_ppn(ppn);
        self.by_ppn.insert(ppn, slot);
    }

    /// Frees every valid slot for which `doomed_if` returns `true`.
    ///
    /// Returns the number of slots freed.
    pub fn release_where(&mut self, doomed_if: impl Fn(&T) -> bool) -> usize {
        let doomed: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_valid() && doomed_if(e))
            .map(|(slot, _)| slot)
            .collect();
        for &slot in &doomed {
            self.release(slot);
        }
        doomed.len()
    }

    /// Valid entries in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.slots.iter().filter(|e| e.is_valid())
    }

    /// Checks that every slot is either free or reachable from both maps,
    /// never both.
    pub fn is_consistent(&self) -> bool {
        let mut seen = vec![false; self.slots.len()];
        for &slot in &self.free {
            if seen[slot] || self.slots[slot].is_valid() {
                return false;
            }
            seen[slot] = true;
        }
        if self.by_vpn.len() != self.len() || self.by_ppn.len() != self.len() {
            return false;
        }
        self.slots.iter().enumerate().all(|(slot, e)| {
            seen[slot] != e.is_valid()
                && (!e.is_valid()
                    || (self.by_vpn.get(&e.vpn()) == Some(&slot) && self.by_ppn.get(&e.ppn()) == Some(&slot)))
        })
    }
}
