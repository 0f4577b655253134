//! Simulation harness.
//!
//! Loads or generates memory access traces and replays them through a
//! per-core TLB hierarchy over a shared page table.

/// Per-core TLB chains and the threaded replay loop.
pub mod driver;

/// Trace file parsing and synthetic workloads.
pub mod trace;

pub use driver::{CoreMmu, Simulation};
pub use trace::{load_trace, parse_trace, SyntheticWorkload, TraceAccess};
