//! Hierarchical Page Table.
//!
//! A radix tree of page tables in one of the x86 paging styles. Directories
//! are allocated lazily on the first mapping that passes through them and
//! are backed by simulated physical pages, so a walk knows the physical
//! address of every entry it reads.

use super::entry::PageTableEntry;
use super::mode::{LevelSpec, PagingStyle};
use super::table::{table_order, PageTable};
use super::walk::{load_page_tables, WalkContext, WalkOrder};
use super::{PageTableOps, PagingParams, PagingStats, TableStats};
use crate::common::constants::ENTRY_SIZE_512;
use crate::common::{Address, MemReq, Result, VmError};
use crate::mem::{PageAllocator, PageHandle};
use std::sync::Arc;
use tracing::{debug, trace, warn};

const STRUCTURE: &str = "hierarchical page table";

/// Multi-level page table.
pub struct HierarchicalPaging {
    style: PagingStyle,
    levels: &'static [LevelSpec],
    root: PageTable,
    /// Tables allocated per level; the root counts as the single level-0 table.
    tables: Vec<u64>,
    mapped: u64,
    error_migrated_pages: u64,
    allocator: Arc<dyn PageAllocator>,
    params: PagingParams,
}

impl HierarchicalPaging {
    /// Creates an empty tree with only its root directory.
    ///
    /// # Arguments
    ///
    /// * `style` - One of the legacy, PAE or long-mode styles.
    /// * `allocator` - Source of pages for directories.
    /// * `params` - Shared paging timing and geometry.
    ///
    /// # Errors
    ///
    /// `UnsupportedStyle` for non-hierarchical styles, `OutOfFrames` if the
    /// root directory cannot be allocated.
    pub fn new(style: PagingStyle, allocator: Arc<dyn PageAllocator>, params: PagingParams) -> Result<Self> {
        let levels = style.levels();
        let Some(root_level) = levels.first() else {
            return Err(VmError::UnsupportedStyle(style));
        };
        let page = allocator
            .allocate_pages(table_order(root_level.entries, params.page_shift))
            .ok_or(VmError::OutOfFrames {
                structure: STRUCTURE,
                operation: "root directory",
                addr: 0,
            })?;
        let mut tables = vec![0; levels.len()];
        tables[0] = 1;
        Ok(Self {
            style,
            levels,
            root: PageTable::new(root_level.entries, Some(page)),
            tables,
            mapped: 0,
            error_migrated_pages: 0,
            allocator,
            params,
        })
    }

    /// Levels of this tree, root first.
    pub fn levels(&self) -> &'static [LevelSpec] {
        self.levels
    }

    /// Number of tables currently allocated at `level` (0 is the root).
    pub fn tables_at(&self, level: usize) -> u64 {
        self.tables.get(level).copied().unwrap_or(0)
    }

    /// Number of present leaf entries.
    pub fn mapped_pages(&self) -> u64 {
        self.mapped
    }

    pub fn root(&self) -> &PageTable {
        &self.root
    }

    /// Releases the tables at `level` covering `[addr, addr + size)`,
    /// together with every table and page below them.
    ///
    /// # Errors
    ///
    /// `Misaligned` if `addr` is not aligned to the span of one table at
    /// `level`; `Unsupported` for the root level.
    pub fn remove_directory(&mut self, addr: Address, size: u64, level: usize) -> Result<()> {
        if level == 0 || level >= self.levels.len() {
            return Err(VmError::Unsupported {
                structure: STRUCTURE,
                operation: "removal of the root directory",
            });
        }
        let span = self.levels[level - 1].entry_span();
        if addr % span != 0 {
            return Err(VmError::Misaligned { addr, granularity: span });
        }
        for i in 0..size.div_ceil(span) {
            self.remove_one(addr + i * span, level);
        }
        Ok(())
    }

    fn remove_one(&mut self, addr: Address, level: usize) {
        let levels = self.levels;
        let allocator = Arc::clone(&self.allocator);
        let mut table = &mut self.root;
        for spec in &levels[..level - 1] {
            match table[spec.index(addr)].table_mut() {
                Some(next) => table = next,
                None => return,
            }
        }
        let idx = levels[level - 1].index(addr);
        if !table[idx].is_present() {
            return;
        }
        let mut child = table[idx].invalidate_table();
        release(&mut child, level, levels.len() - 1, allocator.as_ref(), &mut self.tables, &mut self.mapped);
        if let Some(page) = child.page() {
            allocator.reclaim(page);
        }
        self.tables[level] -= 1;
        debug!(level = levels[level].name, addr, "released page table");
    }

    /// Descends to the leaf entry for `addr`, allocating missing tables.
    ///
    /// Returns the entry and the number of tables allocated on the way.
    fn leaf_entry_alloc(&mut self, addr: Address) -> Result<(&mut PageTableEntry, u64)> {
        let levels = self.levels;
        let last = levels.len() - 1;
        let page_shift = self.params.page_shift;
        let mut allocated = 0;
        let mut table = &mut self.root;
        for depth in 0..last {
            let idx = levels[depth].index(addr);
            if !table[idx].is_present() {
                let child = &levels[depth + 1];
                let page = self
                    .allocator
                    .allocate_pages(table_order(child.entries, page_shift))
                    .ok_or(VmError::OutOfFrames {
                        structure: STRUCTURE,
                        operation: "directory",
                        addr,
                    })?;
                table[idx].validate_table(Box::new(PageTable::new(child.entries, Some(page))));
                self.tables[depth + 1] += 1;
                allocated += 1;
                debug!(level = child.name, addr, page = page.page_no(), "allocated page table");
            }
            table = table[idx]
                .table_mut()
                .ok_or(VmError::Inconsistent { structure: STRUCTURE, addr })?;
        }
        Ok((&mut table[levels[last].index(addr)], allocated))
    }

    /// Descends present entries to the leaf for `addr`, collecting the
    /// physical address of every entry read.
    fn lookup_leaf(&mut self, addr: Address, nodes: &mut Vec<Address>) -> Option<&mut PageTableEntry> {
        let levels = self.levels;
        let last = levels.len() - 1;
        let page_shift = self.params.page_shift;
        let mut table = &mut self.root;
        for (depth, level) in levels.iter().enumerate() {
            let idx = level.index(addr);
            if let Some(node) = table.entry_addr(idx, page_shift) {
                nodes.push(node);
            }
            if depth == last {
                let entry = &mut table[idx];
                return entry.is_present().then_some(entry);
            }
            table = table[idx].table_mut()?;
        }
        None
    }

    /// Resolves the translation of `req` and updates the leaf's state.
    fn resolve(&mut self, req: &mut MemReq, nodes: &mut Vec<Address>) -> Option<Address> {
        let addr = req.byte_addr(self.params.line_shift);
        let style = self.style;
        let (ppn, migrated) = match self.lookup_leaf(addr, nodes) {
            Some(entry) => {
                let became_shared = entry.record_access(req);
                let ppn = entry.page().map(|page| style.leaf_ppn(addr, page.page_no()));
                (ppn, became_shared && entry.remapped_times() > 0)
            }
            None => (None, false),
        };
        if migrated {
            self.error_migrated_pages += 1;
        }
        ppn
    }

    fn live_per_level(&self) -> Vec<u64> {
        let mut live = vec![0; self.levels.len()];
        count_live(&self.root, 0, &mut live);
        live
    }
}

/// Invalidates every present entry of `table`, which sits at `depth`,
/// recursing into child tables and returning their pages to `allocator`.
fn release(
    table: &mut PageTable,
    depth: usize,
    last: usize,
    allocator: &dyn PageAllocator,
    tables: &mut [u64],
    mapped: &mut u64,
) {
    for entry in table.iter_mut().filter(|e| e.is_present()) {
        if depth == last {
            entry.invalidate_page(allocator);
            *mapped -= 1;
        } else {
            let mut child = entry.invalidate_table();
            release(&mut child, depth + 1, last, allocator, tables, mapped);
            if let Some(page) = child.page() {
                allocator.reclaim(page);
            }
            tables[depth + 1] -= 1;
        }
    }
}

fn count_live(table: &PageTable, depth: usize, live: &mut [u64]) {
    for entry in table.iter().filter(|e| e.is_present()) {
        live[depth] += 1;
        if let Some(child) = entry.table() {
            count_live(child, depth + 1, live);
        }
    }
}

impl PageTableOps for HierarchicalPaging {
    fn style(&self) -> PagingStyle {
        self.style
    }

    /// Maps the page containing `addr`, allocating missing directories.
    ///
    /// A present leaf is remapped: its old page is reclaimed first.
    ///
    /// # Returns
    ///
    /// One memory access plus one per directory allocated.
    fn map(&mut self, addr: Address, page: PageHandle) -> Result<u64> {
        let allocator = Arc::clone(&self.allocator);
        let large = self.style.is_large_page();
        let (entry, allocated) = self.leaf_entry_alloc(addr)?;
        let remapped = entry.is_present();
        if remapped {
            warn!(addr, "remapping a present page table entry");
            entry.invalidate_page(allocator.as_ref());
            entry.bump_remapped();
        }
        entry.validate_page(page);
        if large {
            entry.enable_large_page();
        }
        if !remapped {
            self.mapped += 1;
        }
        Ok(self.params.mem_access_time * (1 + allocated))
    }

    fn map_for(&mut self, req_id: u32, addr: Address, page: PageHandle, is_write: bool) -> Result<u64> {
        let latency = self.map(addr, page)?;
        let mut nodes = Vec::with_capacity(self.levels.len());
        let entry = self
            .lookup_leaf(addr, &mut nodes)
            .ok_or(VmError::Inconsistent { structure: STRUCTURE, addr })?;
        entry.set_last_requester(req_id);
        entry.set_accessed();
        if is_write {
            entry.set_dirty();
        }
        Ok(latency)
    }

    fn unmap(&mut self, addr: Address) -> Result<bool> {
        let allocator = Arc::clone(&self.allocator);
        let mut nodes = Vec::with_capacity(self.levels.len());
        let Some(entry) = self.lookup_leaf(addr, &mut nodes) else {
            return Ok(false);
        };
        entry.invalidate_page(allocator.as_ref());
        self.mapped -= 1;
        Ok(true)
    }

    fn access(&mut self, req: &mut MemReq) -> Option<Address> {
        let mut nodes = Vec::with_capacity(self.levels.len());
        let ppn = self.resolve(req, &mut nodes);
        req.cycle += self.params.mem_access_time * nodes.len() as u64;
        trace!(src = req.src_id, line = req.line_addr, hit = ppn.is_some(), "page table access");
        ppn
    }

    fn access_with_walk(&mut self, req: &mut MemReq, ctx: &WalkContext<'_>) -> Option<Address> {
        let mut nodes = Vec::with_capacity(self.levels.len());
        let ppn = self.resolve(req, &mut nodes);
        req.cycle = load_page_tables(req, &nodes, ctx, WalkOrder::Sequential);
        ppn
    }

    /// Allocates every directory down to the leaf tables covering the range.
    fn allocate_page_table(&mut self, addr: Address, size: u64) -> Result<()> {
        if self.levels.len() < 2 {
            return Ok(());
        }
        let span = self.levels[self.levels.len() - 2].entry_span();
        let end = addr.saturating_add(size);
        let mut cur = addr & !(span - 1);
        while cur < end {
            self.leaf_entry_alloc(cur)?;
            match cur.checked_add(span) {
                Some(next) => cur = next,
                None => break,
            }
        }
        Ok(())
    }

    /// Releases the leaf tables covering the range; in single-level styles
    /// the leaf pages themselves.
    fn remove_page_table(&mut self, addr: Address, size: u64) -> Result<()> {
        let last = self.levels.len() - 1;
        if last > 0 {
            return self.remove_directory(addr, size, last);
        }
        let span = self.levels[0].entry_span();
        if addr % span != 0 {
            return Err(VmError::Misaligned { addr, granularity: span });
        }
        for i in 0..size.div_ceil(span) {
            self.unmap(addr + i * span)?;
        }
        Ok(())
    }

    fn stats(&self) -> PagingStats {
        let live = self.live_per_level();
        let tables: Vec<TableStats> = self
            .levels
            .iter()
            .enumerate()
            .map(|(i, level)| TableStats {
                name: level.name.to_string(),
                tables: self.tables[i],
                capacity: self.tables[i] * level.entries as u64,
                live: live[i],
                rehashes: 0,
            })
            .collect();
        let storage_bytes = tables.iter().map(|t| t.capacity * ENTRY_SIZE_512).sum();
        PagingStats {
            style: self.style,
            mapped_pages: self.mapped,
            tables,
            error_migrated_pages: self.error_migrated_pages,
            storage_bytes,
        }
    }
}

impl Drop for HierarchicalPaging {
    fn drop(&mut self) {
        let allocator = Arc::clone(&self.allocator);
        let last = self.levels.len() - 1;
        release(&mut self.root, 0, last, allocator.as_ref(), &mut self.tables, &mut self.mapped);
        if let Some(page) = self.root.page() {
            allocator.reclaim(page);
        }
    }
}
