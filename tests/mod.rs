//! Test module organization.
//!
//! This module organizes all integration tests for the virtual memory
//! simulator.

/// Frame allocator tests.
mod allocator_tests;





/// Page table entry and table container tests.
mod entry_tests;

/// Open-addressing hash page table tests.
mod hash_tests;

/// Hierarchical page table tests.
mod hierarchical_tests;


/// Page-walk cache tests.
mod pwc_tests;



/// Common TLB tests.
mod tlb_tests;

/// Page table walker tests.
mod walker_tests;
