//! Simulator-wide constants.
//!
//! Page geometry follows x86 paging: 4KB base pages, 2MB/4MB/1GB large
//! pages, 512-entry tables of 8-byte entries (1024 four-byte entries for
//! legacy two-level paging).

use super::Address;

/// Reserved translation value signalling a page fault.
pub const PAGE_FAULT_SIG: Address = Address::MAX;

/// Default base page shift (4KB pages).
pub const PAGE_SHIFT: u32 = 12;

/// Shift of a 2MB large page.
pub const PAGE_2MB_SHIFT: u32 = 21;

/// Shift of a 4MB legacy large page.
pub const PAGE_4MB_SHIFT: u32 = 22;

/// Shift of a 1GB huge page.
pub const PAGE_1GB_SHIFT: u32 = 30;

/// Entries in a PAE / long-mode table.
pub const ENTRY_512: usize = 512;

/// Entries in a legacy 32-bit table.
pub const ENTRY_1024: usize = 1024;

/// Entries in the PAE page-directory-pointer table.
pub const ENTRY_4: usize = 4;

/// Size in bytes of one PAE / long-mode table entry.
pub const ENTRY_SIZE_512: u64 = 8;

/// Highest virtual-address bit translated by long mode and the hash tables.
pub const VA_TOP_BIT: u32 = 47;

/// Default cache line size in bytes.
pub const CACHE_LINE_BYTES: u64 = 64;
