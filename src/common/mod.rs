//! Common utilities and types used throughout the translation simulator.
//!
//! This module provides fundamental types for addresses, memory access,
//! simulated requests, and error handling that are shared across the
//! page-table, TLB, and memory-collaborator components.

/// Address type definitions and bit-range helpers.
pub mod addr;

/// Common constants used throughout the simulator.
pub mod constants;

/// Memory access type definitions.
pub mod data;

/// Error types for fatal and unsupported conditions.
pub mod error;

/// Simulated memory request carried through TLBs and walkers.
pub mod request;

pub use addr::{bits, Address, PhysAddr, VirtAddr};
pub use data::AccessType;
pub use error::{Result, VmError};
pub use request::MemReq;

pub use constants::{PAGE_FAULT_SIG, PAGE_SHIFT};
