//! Paging styles and address decomposition.
//!
//! Each hierarchical style splits a virtual address into per-level table
//! indices, root level first. The final level's entries point at physical
//! pages; every other level's entries point at the next table.

use crate::common::constants::{
    ENTRY_1024, ENTRY_4, ENTRY_512, PAGE_1GB_SHIFT, PAGE_2MB_SHIFT, PAGE_4MB_SHIFT, PAGE_SHIFT,
};
use crate::common::{bits, Address};
use serde::{Deserialize, Serialize};

/// The translation structure organisation simulated by a page table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PagingStyle {
    /// Two-level 32-bit paging with 4KB pages.
    #[serde(alias = "Legacy_Normal")]
    LegacyNormal,
    /// One-level 32-bit paging with 4MB pages.
    #[serde(alias = "Legacy_Huge")]
    LegacyHuge,
    /// Three-level PAE paging with 4KB pages.
    #[serde(alias = "PAE_Normal")]
    PaeNormal,
    /// Two-level PAE paging with 2MB pages.
    #[serde(alias = "PAE_Huge")]
    PaeHuge,
    /// Four-level long-mode paging with 4KB pages.
    #[serde(alias = "LongMode_Normal")]
    LongModeNormal,
    /// Three-level long-mode paging with 2MB pages.
    #[serde(alias = "LongMode_Middle")]
    LongModeMiddle,
    /// Two-level long-mode paging with 1GB pages.
    #[serde(alias = "LongMode_Huge")]
    LongModeHuge,
    /// Flat open-addressing hash table.
    #[serde(alias = "Hash_Normal")]
    HashNormal,
    /// Chained hash table.
    #[serde(alias = "Hash_Chain")]
    HashChain,
    /// d-ary cuckoo hash tables.
    #[serde(alias = "Cuckoo_Normal")]
    CuckooNormal,
    /// Elastic cuckoo hash tables.
    #[serde(alias = "Cuckoo_Elastic")]
    CuckooElastic,
}

/// One level of a hierarchical page table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LevelSpec {
    /// Short level name used in statistics.
    pub name: &'static str,
    /// Lowest address bit of this level's index.
    pub lo: u32,
    /// Highest address bit of this level's index.
    pub hi: u32,
    /// Number of entries in a table of this level.
    pub entries: usize,
}

impl LevelSpec {
    /// Returns this level's table index for `addr`.
    pub fn index(&self, addr: Address) -> usize {
        bits(addr, self.lo, self.hi) as usize
    }

    /// Returns the bytes of address space covered by one entry.
    pub fn entry_span(&self) -> u64 {
        1 << self.lo
    }
}

const PML4: LevelSpec = LevelSpec { name: "pml4", lo: 39, hi: 47, entries: ENTRY_512 };
const PDP: LevelSpec = LevelSpec { name: "pdp", lo: 30, hi: 38, entries: ENTRY_512 };
const PD: LevelSpec = LevelSpec { name: "pd", lo: 21, hi: 29, entries: ENTRY_512 };
const PT: LevelSpec = LevelSpec { name: "pt", lo: 12, hi: 20, entries: ENTRY_512 };

const PAE_PDP: LevelSpec = LevelSpec { name: "pdp", lo: 30, hi: 31, entries: ENTRY_4 };

const LEGACY_PD: LevelSpec = LevelSpec { name: "pd", lo: 22, hi: 31, entries: ENTRY_1024 };
const LEGACY_PT: LevelSpec = LevelSpec { name: "pt", lo: 12, hi: 21, entries: ENTRY_1024 };

impl PagingStyle {
    /// Returns the table levels of a hierarchical style, root first.
    ///
    /// Hash and cuckoo styles have no levels.
    pub fn levels(&self) -> &'static [LevelSpec] {
        match self {
            PagingStyle::LegacyNormal => &[LEGACY_PD, LEGACY_PT],
            PagingStyle::LegacyHuge => &[LEGACY_PD],
            PagingStyle::PaeNormal => &[PAE_PDP, PD, PT],
            PagingStyle::PaeHuge => &[PAE_PDP, PD],
            PagingStyle::LongModeNormal => &[PML4, PDP, PD, PT],
            PagingStyle::LongModeMiddle => &[PML4, PDP, PD],
            PagingStyle::LongModeHuge => &[PML4, PDP],
            PagingStyle::HashNormal
            | PagingStyle::HashChain
            | PagingStyle::CuckooNormal
            | PagingStyle::CuckooElastic => &[],
        }
    }

    /// Returns the shift of the pages this style maps.
    pub fn page_shift(&self) -> u32 {
        match self {
            PagingStyle::LegacyHuge => PAGE_4MB_SHIFT,
            PagingStyle::PaeHuge | PagingStyle::LongModeMiddle => PAGE_2MB_SHIFT,
            PagingStyle::LongModeHuge => PAGE_1GB_SHIFT,
            _ => PAGE_SHIFT,
        }
    }

    /// Returns `true` for radix-tree styles.
    pub fn is_hierarchical(&self) -> bool {
        !self.levels().is_empty()
    }

    /// 4KB page number of `addr` inside the leaf page starting at `page_no`.
    pub fn leaf_ppn(&self, addr: Address, page_no: Address) -> Address {
        if self.is_large_page() {
            page_no + bits(addr, PAGE_SHIFT, self.page_shift() - 1)
        } else {
            page_no
        }
    }

    /// Returns `true` if leaf entries map pages larger than 4KB.
    pub fn is_large_page(&self) -> bool {
        self.page_shift() > PAGE_SHIFT
    }
}
