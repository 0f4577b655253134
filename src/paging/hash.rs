//! Hash Page Table.
//!
//! A single open-addressing table keyed by virtual page number. Lookups
//! probe linearly from the hashed slot, wrapping at the end of the table,
//! and stop at the first slot that has never held a mapping. When the live
//! ratio exceeds the threshold the table is rebuilt at `size * scale`
//! before the mapping call returns.

use super::entry::PageTableEntry;
use super::hasher::HashFunction;
use super::mode::PagingStyle;
use super::table::{table_order, PageTable};
use super::walk::{load_page_tables, WalkContext, WalkOrder};
use super::{PageTableOps, PagingParams, PagingStats, TableStats};
use crate::common::constants::{ENTRY_SIZE_512, PAGE_SHIFT, VA_TOP_BIT};
use crate::common::{bits, Address, MemReq, Result, VmError};
use crate::config::HashConfig;
use crate::mem::{PageAllocator, PageHandle};
use std::sync::Arc;
use tracing::{info, trace, warn};

const STRUCTURE: &str = "hash page table";

/// Virtual page number used as the hash key.
pub fn hash_vpn(addr: Address) -> Address {
    bits(addr, PAGE_SHIFT, VA_TOP_BIT)
}

/// Open-addressing page table with linear probing.
pub struct HashPaging {
    table: PageTable,
    live: u64,
    threshold: f64,
    scale: f64,
    function: HashFunction,
    rehashes: u64,
    error_migrated_pages: u64,
    allocator: Arc<dyn PageAllocator>,
    params: PagingParams,
}

impl HashPaging {
    /// Creates an empty table of `config.size` slots.
    ///
    /// # Errors
    ///
    /// `OutOfFrames` if the table's backing block cannot be allocated.
    pub fn new(config: &HashConfig, allocator: Arc<dyn PageAllocator>, params: PagingParams) -> Result<Self> {
        let table = new_table(config.size, allocator.as_ref(), params.page_shift, "table allocation")?;
        Ok(Self {
            table,
            live: 0,
            threshold: config.threshold,
            scale: config.scale,
            function: config.function,
            rehashes: 0,
            error_migrated_pages: 0,
            allocator,
            params,
        })
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.table.len()
    }

    /// Number of present entries.
    pub fn live(&self) -> u64 {
        self.live
    }

    pub fn rehashes(&self) -> u64 {
        self.rehashes
    }

    /// Present entries in slot order.
    pub fn entries(&self) -> impl Iterator<Item = &PageTableEntry> {
        self.table.iter().filter(|e| e.is_present())
    }

    /// Returns the slot holding `vpn`, if present.
    pub fn find(&self, vpn: Address) -> Option<usize> {
        self.probe(vpn, &mut Vec::new())
    }

    /// Returns the page mapped for `vpn`, if any.
    pub fn translation(&self, vpn: Address) -> Option<PageHandle> {
        self.find(vpn).and_then(|slot| self.table[slot].page())
    }

    fn start_slot(&self, vpn: Address, len: usize) -> usize {
        (self.function.hash(vpn, 0) % len as u64) as usize
    }

    /// Probes for `vpn`, recording every slot read.
    fn probe(&self, vpn: Address, probed: &mut Vec<usize>) -> Option<usize> {
        let len = self.table.len();
        let start = self.start_slot(vpn, len);
        for i in 0..len {
            let slot = (start + i) % len;
            probed.push(slot);
            let entry = &self.table[slot];
            if !entry.is_page_assigned() {
                return None;
            }
            if entry.is_present() && entry.vpn() == vpn {
                return Some(slot);
            }
        }
        None
    }

    /// Rebuilds the table at `capacity * scale` slots.
    ///
    /// Every destination is computed and the new block allocated before any
    /// entry moves, so a failure leaves the table untouched.
    fn rehash(&mut self) -> Result<()> {
        let old_len = self.table.len();
        let new_len = ((old_len as f64 * self.scale).ceil() as usize).max(old_len + 1);

        let mut occupied = vec![false; new_len];
        let mut moves = Vec::with_capacity(self.live as usize);
        for (src, entry) in self.table.iter().enumerate().filter(|(_, e)| e.is_present()) {
            let start = self.start_slot(entry.vpn(), new_len);
            let dst = (0..new_len)
                .map(|i| (start + i) % new_len)
                .find(|&slot| !occupied[slot])
                .ok_or(VmError::TableFull {
                    structure: STRUCTURE,
                    vpn: entry.vpn(),
                })?;
            occupied[dst] = true;
            moves.push((src, dst));
        }

        let mut table = new_table(new_len, self.allocator.as_ref(), self.params.page_shift, "rehash")?;
        for (src, dst) in moves {
            table[dst] = std::mem::take(&mut self.table[src]);
        }
        let old = std::mem::replace(&mut self.table, table);
        if let Some(page) = old.page() {
            self.allocator.reclaim(page);
        }
        self.rehashes += 1;
        info!(from = old_len, to = new_len, live = self.live, "rehashed hash page table");
        Ok(())
    }

    fn needs_rehash(&self) -> bool {
        self.live as f64 / self.table.len() as f64 > self.threshold
    }

    fn resolve(&mut self, req: &mut MemReq, probed: &mut Vec<usize>) -> Option<Address> {
        let vpn = hash_vpn(req.byte_addr(self.params.line_shift));
        let slot = self.probe(vpn, probed)?;
        let entry = &mut self.table[slot];
        if entry.record_access(req) && entry.remapped_times() > 0 {
            self.error_migrated_pages += 1;
        }
        self.table[slot].page().map(|p| p.page_no())
    }
}

fn new_table(
    size: usize,
    allocator: &dyn PageAllocator,
    page_shift: u32,
    operation: &'static str,
) -> Result<PageTable> {
    let page = allocator
        .allocate_pages(table_order(size, page_shift))
        .ok_or(VmError::OutOfFrames {
            structure: STRUCTURE,
            operation,
            addr: 0,
        })?;
    Ok(PageTable::new(size, Some(page)))
}

impl PageTableOps for HashPaging {
    fn style(&self) -> PagingStyle {
        PagingStyle::HashNormal
    }

    /// Maps the page containing `addr` and rehashes if the table became
    /// too full. If the rehash fails the mapping is not kept.
    ///
    /// # Returns
    ///
    /// A single memory access; rehash work is not charged to the mapping.
    fn map(&mut self, addr: Address, page: PageHandle) -> Result<u64> {
        let vpn = hash_vpn(addr);
        if let Some(slot) = self.find(vpn) {
            warn!(vpn, slot, "remapping a present hash page table entry");
            let entry = &mut self.table[slot];
            entry.invalidate_page(self.allocator.as_ref());
            entry.bump_remapped();
            entry.validate_page(page);
            entry.set_vpn(vpn);
            return Ok(self.params.mem_access_time);
        }

        let len = self.table.len();
        let start = self.start_slot(vpn, len);
        let slot = (0..len)
            .map(|i| (start + i) % len)
            .find(|&slot| !self.table[slot].is_present())
            .ok_or(VmError::TableFull { structure: STRUCTURE, vpn })?;
        let mut entry = PageTableEntry::default();
        entry.validate_page(page);
        entry.set_vpn(vpn);
        let previous = std::mem::replace(&mut self.table[slot], entry);
        self.live += 1;
        trace!(vpn, slot, "hash page table insert");

        if self.needs_rehash() {
            // A failed rehash leaves the table as it was; take the mapping back out.
            if let Err(err) = self.rehash() {
                self.table[slot] = previous;
                self.live -= 1;
                return Err(err);
            }
        }
        Ok(self.params.mem_access_time)
    }

    fn map_for(&mut self, req_id: u32, addr: Address, page: PageHandle, is_write: bool) -> Result<u64> {
        let latency = self.map(addr, page)?;
        let vpn = hash_vpn(addr);
        let slot = self
            .find(vpn)
            .ok_or(VmError::Inconsistent { structure: STRUCTURE, addr })?;
        let entry = &mut self.table[slot];
        entry.set_last_requester(req_id);
        entry.set_accessed();
        if is_write {
            entry.set_dirty();
        }
        Ok(latency)
    }

    fn unmap(&mut self, _addr: Address) -> Result<bool> {
        Err(VmError::Unsupported {
            structure: STRUCTURE,
            operation: "unmap",
        })
    }

    fn access(&mut self, req: &mut MemReq) -> Option<Address> {
        let mut probed = Vec::new();
        let ppn = self.resolve(req, &mut probed);
        req.cycle += self.params.mem_access_time * probed.len() as u64;
        trace!(src = req.src_id, line = req.line_addr, probes = probed.len(), hit = ppn.is_some(), "hash page table access");
        ppn
    }

    fn access_with_walk(&mut self, req: &mut MemReq, ctx: &WalkContext<'_>) -> Option<Address> {
        let mut probed = Vec::new();
        let ppn = self.resolve(req, &mut probed);
        let addrs: Vec<Address> = probed
            .iter()
            .filter_map(|&slot| self.table.entry_addr(slot, self.params.page_shift))
            .collect();
        req.cycle = load_page_tables(req, &addrs, ctx, WalkOrder::Sequential);
        ppn
    }

    fn allocate_page_table(&mut self, _addr: Address, _size: u64) -> Result<()> {
        Err(VmError::Unsupported {
            structure: STRUCTURE,
            operation: "allocate_page_table",
        })
    }

    fn remove_page_table(&mut self, _addr: Address, _size: u64) -> Result<()> {
        Err(VmError::Unsupported {
            structure: STRUCTURE,
            operation: "remove_page_table",
        })
    }

    fn stats(&self) -> PagingStats {
        let capacity = self.table.len() as u64;
        PagingStats {
            style: PagingStyle::HashNormal,
            mapped_pages: self.live,
            tables: vec![TableStats {
                name: "hash".to_string(),
                tables: 1,
                capacity,
                live: self.live,
                rehashes: self.rehashes,
            }],
            error_migrated_pages: self.error_migrated_pages,
            storage_bytes: capacity * ENTRY_SIZE_512,
        }
    }
}

impl Drop for HashPaging {
    fn drop(&mut self) {
        self.table.release_pages(self.allocator.as_ref());
    }
}
