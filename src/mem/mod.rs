//! Memory-side collaborators of the translation structures.
//!
//! The page tables and walkers consume these interfaces: a page-frame
//! allocator handing out physical pages, parent memory objects that time the
//! page-table fetches of a walk, and per-core event recorders that capture
//! the causal structure of those fetches.

/// Physical page-frame allocation.
pub mod allocator;

/// Memory timing controllers and the parent port built on them.
pub mod controller;

/// Parent memory objects and address routing.
pub mod parent;

/// Timing records and event recorders.
pub mod timing;

pub use allocator::{FrameAllocator, PageAllocator, PageHandle};
pub use controller::{DramController, MemoryController, MemoryPort, SimpleController};
pub use parent::{parent_id, MemObject, ParentSet};
pub use timing::{EventId, EventRecorder, RecorderSet, TimingEvent, TimingRecord};
