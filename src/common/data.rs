//! Memory Access Types.
//!
//! This module defines the classification of memory accesses used throughout
//! the simulator. Writes mark translations dirty; fetches and reads do not.

/// Type of memory access operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum AccessType {
    /// Instruction fetch access.
    Fetch,

    /// Data read access (a GETS request in the coherence protocol).
    #[default]
    Read,

    /// Data write access (a PUTS request); sets the dirty bit on the
    /// translation it resolves through.
    Write,
}

impl AccessType {
    /// Returns `true` if the access modifies the page.
    pub fn is_write(&self) -> bool {
        matches!(self, AccessType::Write)
    }
}
