//! Virtual Memory Subsystem Simulator Library.
//!
//! This crate models the address-translation layer of a multiprocessor
//! architectural simulator: page tables, TLB hierarchies and page-walk
//! caches as timed, stateful structures. Every operation accumulates a
//! latency in simulated cycles, and page-table walks issue simulated reads
//! to parent memories that are chained into one timing record per walk.
//!
//! # Architecture
//!
//! * **Page tables**: multi-level radix trees in the legacy, PAE and
//!   long-mode styles, an open-addressing hash table, and d-ary cuckoo
//!   tables, all behind one operations trait.
//! * **TLBs**: a fully associative LRU TLB and a clustered TLB that packs
//!   neighbouring translations behind one base mapping.
//! * **Walks**: a page-table walker with page-fault handling, a page-walk
//!   cache, and per-core event recorders.
//!
//! # Modules
//!
//! * `common`: Shared types, constants, requests and errors.
//! * `config`: Configuration loading and validation.
//! * `mem`: Frame allocation, parent memories and timing records.
//! * `paging`: Page tables, page-walk cache and walker.
//! * `sim`: Trace loading and the multi-core replay driver.
//! * `stats`: Statistics reporting.
//! * `tlb`: Translation lookaside buffers.

/// Shared types, constants, requests and error handling.
///
/// Provides the address helpers, the simulated memory request carried
/// through every translation level, and the crate-wide error type.
pub mod common;

/// Configuration system for paging, TLB, page-walk cache and memory settings.
///
/// Loads and validates TOML configuration files.
pub mod config;

/// Memory-side collaborators of the translation structures.
pub mod mem;

/// Page table organisations, the page-walk cache and the page-table walker.
pub mod paging;

/// Trace loading and the simulation driver.
///
/// Parses access traces or generates synthetic ones and replays them
/// through per-core TLB chains on one thread per core.
pub mod sim;

/// Performance statistics collection and reporting.
pub mod stats;

/// Translation lookaside buffers.
pub mod tlb;
