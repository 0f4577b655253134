//! Cuckoo Page Table.
//!
//! `d` hash tables ("ways"), each indexed with its own random salt. A new
//! mapping goes to its slot in the first way; an occupant found there is
//! displaced into the next way, and so on, visiting each way at most once.
//! Each way grows and re-salts on its own when its live ratio crosses the
//! threshold.

use super::entry::PageTableEntry;
use super::hash::hash_vpn;
use super::hasher::HashFunction;
use super::mode::PagingStyle;
use super::table::{table_order, PageTable};
use super::walk::{load_page_tables, WalkContext, WalkOrder};
use super::{PageTableOps, PagingParams, PagingStats, TableStats};
use crate::common::constants::ENTRY_SIZE_512;
use crate::common::{Address, MemReq, Result, VmError};
use crate::config::CuckooConfig;
use crate::mem::{PageAllocator, PageHandle};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

const STRUCTURE: &str = "cuckoo page table";

/// Salts tried per rehash before giving up.
pub const MAX_REHASH_ATTEMPTS: usize = 32;

/// d-ary cuckoo page table.
pub struct CuckooPaging {
    style: PagingStyle,
    tables: Vec<PageTable>,
    salts: Vec<u64>,
    live: Vec<u64>,
    rehashes: Vec<u64>,
    threshold: f64,
    scale: f64,
    function: HashFunction,
    rng: StdRng,
    max_kicks: usize,
    error_migrated_pages: u64,
    allocator: Arc<dyn PageAllocator>,
    params: PagingParams,
}

impl CuckooPaging {
    /// Creates `config.ways` empty tables of `config.size` slots.
    ///
    /// # Arguments
    ///
    /// * `style` - `CuckooNormal` or `CuckooElastic`.
    /// * `config` - Way count, sizing and hash function.
    /// * `seed` - Seed for the salt generator.
    /// * `allocator` - Source of the tables' backing blocks.
    /// * `params` - Shared paging timing and geometry.
    pub fn new(
        style: PagingStyle,
        config: &CuckooConfig,
        seed: u64,
        allocator: Arc<dyn PageAllocator>,
        params: PagingParams,
    ) -> Result<Self> {
        if config.ways == 0 {
            return Err(VmError::Config("cuckoo page table needs at least one way".to_string()));
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let salts = (0..config.ways).map(|_| rng.gen()).collect();
        let tables = (0..config.ways)
            .map(|_| new_table(config.size, allocator.as_ref(), params.page_shift, "table allocation"))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            style,
            tables,
            salts,
            live: vec![0; config.ways],
            rehashes: vec![0; config.ways],
            threshold: config.threshold,
            scale: config.scale,
            function: config.function,
            rng,
            max_kicks: 0,
            error_migrated_pages: 0,
            allocator,
            params,
        })
    }

    /// Number of ways.
    pub fn ways(&self) -> usize {
        self.tables.len()
    }

    pub fn capacity(&self, way: usize) -> usize {
        self.tables[way].len()
    }

    pub fn live(&self, way: usize) -> u64 {
        self.live[way]
    }

    pub fn rehashes(&self, way: usize) -> u64 {
        self.rehashes[way]
    }

    pub fn salt(&self, way: usize) -> u64 {
        self.salts[way]
    }

    /// Longest displacement chain seen so far.
    pub fn max_kicks(&self) -> usize {
        self.max_kicks
    }

    /// Returns the page mapped for `vpn`, if any.
    pub fn translation(&self, vpn: Address) -> Option<PageHandle> {
        let (way, slot) = self.find(vpn, &mut Vec::new())?;
        self.tables[way][slot].page()
    }

    /// Present entries of every way.
    pub fn entries(&self) -> impl Iterator<Item = &PageTableEntry> {
        self.tables.iter().flat_map(|t| t.iter()).filter(|e| e.is_present())
    }

    /// Places a new mapping of `vpn` starting at `way`, displacing
    /// occupants into the following ways, then rehashes any way that became
    /// too full.
    ///
    /// # Returns
    ///
    /// The number of occupants displaced.
    ///
    /// # Errors
    ///
    /// `CuckooExhausted` if every way along the displacement chain is
    /// occupied. The tables are left unchanged in that case.
    pub fn insert(&mut self, vpn: Address, page: PageHandle, way: usize) -> Result<usize> {
        self.place(vpn, page, way, false)
    }

    /// Inserts a mapping starting at `way`. With `grow` set, an exhausted
    /// chain grows that way and retries, up to `MAX_REHASH_ATTEMPTS` times.
    /// On error the mapping is not in the tables.
    fn place(&mut self, vpn: Address, page: PageHandle, way: usize, grow: bool) -> Result<usize> {
        let mut entry = PageTableEntry::default();
        entry.validate_page(page);
        entry.set_vpn(vpn);
        let mut grown = 0;
        let kicks = loop {
            match self.insert_entry(entry.clone(), way) {
                Ok((_, kicks)) => break kicks,
                Err(VmError::CuckooExhausted { .. }) if grow && grown < MAX_REHASH_ATTEMPTS && way < self.ways() => {
                    grown += 1;
                    warn!(vpn, way, grown, "cuckoo chain exhausted, growing way");
                    self.rehash(way)?;
                }
                Err(err) => return Err(err),
            }
        };
        self.max_kicks = self.max_kicks.max(kicks);
        if let Err(err) = self.rebalance() {
            // A failed rehash restores its way, so the new mapping is still
            // somewhere in the tables; the caller keeps the page.
            if let Some((way, slot)) = self.find(vpn, &mut Vec::new()) {
                self.tables[way][slot] = PageTableEntry::default();
                self.live[way] -= 1;
            }
            return Err(err);
        }
        Ok(kicks)
    }

    fn slot(&self, way: usize, vpn: Address) -> usize {
        (self.function.hash(vpn, self.salts[way]) % self.tables[way].len() as u64) as usize
    }

    /// Probes every way in order until `vpn` is found.
    fn find(&self, vpn: Address, probed: &mut Vec<(usize, usize)>) -> Option<(usize, usize)> {
        for way in 0..self.tables.len() {
            let slot = self.slot(way, vpn);
            probed.push((way, slot));
            let entry = &self.tables[way][slot];
            if entry.is_present() && entry.vpn() == vpn {
                return Some((way, slot));
            }
        }
        None
    }

    /// Places `entry` starting at way `start`.
    ///
    /// The displacement chain is planned before anything moves. Each way is
    /// visited once, so every occupant on the plan is still in place when
    /// the entries shift along it.
    fn insert_entry(&mut self, entry: PageTableEntry, start: usize) -> Result<(usize, usize)> {
        let ways = self.tables.len();
        if start >= ways {
            return Err(VmError::CuckooExhausted { vpn: entry.vpn(), ways });
        }

        let mut plan = Vec::with_capacity(ways);
        let mut vpn = entry.vpn();
        let mut free_at = None;
        for k in 0..ways {
            let way = (start + k) % ways;
            let slot = self.slot(way, vpn);
            plan.push((way, slot));
            let occupant = &self.tables[way][slot];
            if !occupant.is_present() {
                free_at = Some(k);
                break;
            }
            vpn = occupant.vpn();
        }
        let Some(kicks) = free_at else {
            return Err(VmError::CuckooExhausted { vpn: entry.vpn(), ways });
        };

        let mut carried = entry;
        for &(way, slot) in &plan {
            carried = std::mem::replace(&mut self.tables[way][slot], carried);
            if carried.is_present() {
                debug!(way, slot, displaced = carried.vpn(), "cuckoo kick");
            }
        }
        let (way, _) = plan[kicks];
        self.live[way] += 1;
        Ok((way, kicks))
    }

    fn over_threshold(&self, way: usize) -> bool {
        self.live[way] as f64 / self.tables[way].len() as f64 > self.threshold
    }

    /// Rehashes ways until none is above the threshold.
    ///
    /// Each rehash can push entries into later ways, so the number of
    /// rounds is bounded. Ways still over the threshold after the last
    /// round stay that way until the next insertion.
    fn rebalance(&mut self) -> Result<()> {
        for _ in 0..self.tables.len() * 4 {
            match (0..self.tables.len()).find(|&way| self.over_threshold(way)) {
                Some(way) => self.rehash(way)?,
                None => return Ok(()),
            }
        }
        let over: Vec<usize> = (0..self.tables.len()).filter(|&way| self.over_threshold(way)).collect();
        if !over.is_empty() {
            warn!(?over, live = ?self.live, "cuckoo rebalance stopped with ways over the threshold");
        }
        Ok(())
    }

    /// Grows way `way` by the scale factor under a fresh salt and reinserts
    /// its entries from that way onwards.
    ///
    /// A reinsertion that exhausts the chain restores every table and
    /// retries with another salt, up to `MAX_REHASH_ATTEMPTS` times.
    fn rehash(&mut self, way: usize) -> Result<()> {
        let old_len = self.tables[way].len();
        let new_len = ((old_len as f64 * self.scale).ceil() as usize).max(old_len + 1);
        let page = self
            .allocator
            .allocate_pages(table_order(new_len, self.params.page_shift))
            .ok_or(VmError::OutOfFrames {
                structure: STRUCTURE,
                operation: "rehash",
                addr: 0,
            })?;
        let old_page = self.tables[way].page();
        let saved_tables = self.tables.clone();
        let saved_live = self.live.clone();
        let saved_salt = self.salts[way];

        let mut last_err = VmError::CuckooExhausted {
            vpn: 0,
            ways: self.tables.len(),
        };
        for attempt in 0..MAX_REHASH_ATTEMPTS {
            let mut old = std::mem::replace(&mut self.tables[way], PageTable::new(new_len, Some(page)));
            self.salts[way] = self.rng.gen();
            self.live[way] = 0;
            let reinserted = old
                .drain_present()
                .into_iter()
                .try_for_each(|entry| self.insert_entry(entry, way).map(|_| ()));
            match reinserted {
                Ok(()) => {
                    if let Some(page) = old_page {
                        self.allocator.reclaim(page);
                    }
                    self.rehashes[way] += 1;
                    info!(way, from = old_len, to = new_len, attempt, "rehashed cuckoo way");
                    return Ok(());
                }
                Err(err) => {
                    debug!(way, attempt, "cuckoo rehash exhausted a chain, retrying");
                    last_err = err;
                    self.tables.clone_from(&saved_tables);
                    self.live.clone_from(&saved_live);
                    self.salts[way] = saved_salt;
                }
            }
        }
        self.allocator.reclaim(page);
        Err(last_err)
    }

    fn resolve(&mut self, req: &mut MemReq, probed: &mut Vec<(usize, usize)>) -> Option<Address> {
        let vpn = hash_vpn(req.byte_addr(self.params.line_shift));
        let (way, slot) = self.find(vpn, probed)?;
        let entry = &mut self.tables[way][slot];
        if entry.record_access(req) && entry.remapped_times() > 0 {
            self.error_migrated_pages += 1;
        }
        self.tables[way][slot].page().map(|p| p.page_no())
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

impl PageTableOps for CuckooPaging {
    fn style(&self) -> PagingStyle {
        self.style
    }

    /// A chain that runs out of ways grows the first way and retries
    /// before the insertion fails.
    ///
    /// # Returns
    ///
    /// One memory access per way visited by the displacement chain.
    fn map(&mut self, addr: Address, page: PageHandle) -> Result<u64> {
        let vpn = hash_vpn(addr);
        if let Some((way, slot)) = self.find(vpn, &mut Vec::new()) {
            warn!(vpn, way, slot, "remapping a present cuckoo page table entry");
            let entry = &mut self.tables[way][slot];
            entry.invalidate_page(self.allocator.as_ref());
            entry.bump_remapped();
            entry.validate_page(page);
            entry.set_vpn(vpn);
            return Ok(self.params.mem_access_time);
        }
        let kicks = self.place(vpn, page, 0, true)?;
        Ok(self.params.mem_access_time * (1 + kicks as u64))
    }

    fn map_for(&mut self, req_id: u32, addr: Address, page: PageHandle, is_write: bool) -> Result<u64> {
        let latency = self.map(addr, page)?;
        let (way, slot) = self
            .find(hash_vpn(addr), &mut Vec::new())
            .ok_or(VmError::Inconsistent { structure: STRUCTURE, addr })?;
        let entry = &mut self.tables[way][slot];
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
        let mut probed = Vec::with_capacity(self.tables.len());
        let ppn = self.resolve(req, &mut probed);
        req.cycle += self.params.mem_access_time * probed.len() as u64;
        trace!(src = req.src_id, line = req.line_addr, probes = probed.len(), hit = ppn.is_some(), "cuckoo page table access");
        ppn
    }

    fn access_with_walk(&mut self, req: &mut MemReq, ctx: &WalkContext<'_>) -> Option<Address> {
        let mut probed = Vec::with_capacity(self.tables.len());
        let ppn = self.resolve(req, &mut probed);
        let addrs: Vec<Address> = probed
            .iter()
            .filter_map(|&(way, slot)| self.tables[way].entry_addr(slot, self.params.page_shift))
            .collect();
        req.cycle = load_page_tables(req, &addrs, ctx, WalkOrder::Parallel);
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
        let tables: Vec<TableStats> = self
            .tables
            .iter()
            .enumerate()
            .map(|(way, table)| TableStats {
                name: format!("way{way}"),
                tables: 1,
                capacity: table.len() as u64,
                live: self.live[way],
                rehashes: self.rehashes[way],
            })
            .collect();
        let storage_bytes = tables.iter().map(|t| t.capacity * ENTRY_SIZE_512).sum();
        PagingStats {
            style: self.style,
            mapped_pages: self.live.iter().sum(),
            tables,
            error_migrated_pages: self.error_migrated_pages,
            storage_bytes,
        }
    }
}

impl Drop for CuckooPaging {
    fn drop(&mut self) {
        for table in &mut self.tables {
            table.release_pages(self.allocator.as_ref());
        }
    }
}
