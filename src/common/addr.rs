//! Address types and bit manipulation.
//!
//! Addresses are plain 64-bit integers. `VirtAddr` and `PhysAddr` wrap them
//! where the distinction helps readability, and `bits` extracts the
//! inclusive bit ranges that paging modes use to index their tables.

use super::constants::PAGE_SHIFT;

/// Raw 64-bit simulated address or page number.
pub type Address = u64;

/// Extracts bits `lo..=hi` of `value`, shifted down to bit 0.
///
/// # Arguments
///
/// * `value` - The value to extract from.
/// * `lo` - Lowest bit position (inclusive).
/// * `hi` - Highest bit position (inclusive), clamped to 63.
pub fn bits(value: u64, lo: u32, hi: u32) -> u64 {
    let hi = hi.min(63);
    debug_assert!(lo <= hi);
    let width = hi - lo + 1;
    let shifted = value >> lo;
    if width >= 64 {
        shifted
    } else {
        shifted & ((1u64 << width) - 1)
    }
}

/// A simulated virtual address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VirtAddr(Address);

impl VirtAddr {
    /// Creates a new virtual address.
    pub fn new(addr: Address) -> Self {
        Self(addr)
    }

    /// Returns the raw address value.
    pub fn val(&self) -> Address {
        self.0
    }

    /// Returns the offset within a base (4KB) page.
    pub fn page_offset(&self) -> u64 {
        self.0 & ((1 << PAGE_SHIFT) - 1)
    }

    /// Returns the virtual page number for the given page shift.
    pub fn vpn(&self, page_shift: u32) -> Address {
        self.0 >> page_shift
    }

    /// Returns the cache line address for the given line shift.
    pub fn line(&self, line_shift: u32) -> Address {
        self.0 >> line_shift
    }
}

/// A simulated physical address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PhysAddr(Address);

impl PhysAddr {
    /// Creates a new physical address.
    pub fn new(addr: Address) -> Self {
        Self(addr)
    }

    /// Builds a physical address from a page number and in-page offset.
    pub fn from_parts(ppn: Address, offset: u64, page_shift: u32) -> Self {
        Self((ppn << page_shift) | (offset & ((1 << page_shift) - 1)))
    }

    /// Returns the raw address value.
    pub fn val(&self) -> Address {
        self.0
    }

    /// Returns the cache line address for the given line shift.
    pub fn line(&self, line_shift: u32) -> Address {
        self.0 >> line_shift
    }
}
