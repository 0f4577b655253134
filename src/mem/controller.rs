//! Memory Timing Controller.
//!
//! This module defines the `MemoryController` trait and implementations for
//! simulating memory access latencies, and `MemoryPort`, the parent memory
//! object that page-table walks fetch from. A port times each fetch with its
//! controller and, when recorders are attached, logs a timing record for the
//! requesting core.

use super::parent::MemObject;
use super::timing::{RecorderSet, TimingRecord};
use crate::common::{Address, MemReq};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Trait for memory controller implementations.
pub trait MemoryController: Send {
    /// Calculates the latency for a memory access at a specific address.
    ///
    /// # Arguments
    ///
    /// * `addr` - The physical byte address being accessed.
    ///
    /// # Returns
    ///
    /// The latency in cycles.
    fn access_latency(&mut self, addr: Address) -> u64;
}

/// A simple memory controller with fixed latency.
pub struct SimpleController {
    latency: u64,
}

impl SimpleController {
    /// Creates a new SimpleController.
    ///
    /// # Arguments
    ///
    /// * `latency` - The fixed latency in cycles.
    pub fn new(latency: u64) -> Self {
        Self { latency }
    }
}

impl MemoryController for SimpleController {
    /// Returns the fixed latency regardless of the address.
    fn access_latency(&mut self, _addr: Address) -> u64 {
        self.latency
    }
}

/// A DRAM-aware memory controller.
///
/// Tracks the currently open row so that row buffer hits cost only `t_cas`.
/// Page-table pages are small and hot, so consecutive walk steps into the
/// same table frequently hit the open row.
pub struct DramController {
    last_row: Option<u64>,
    t_cas: u64,
    t_ras: u64,
    t_pre: u64,
    row_mask: u64,
}

impl DramController {
    /// Creates a new DramController with 2KB rows.
    ///
    /// # Arguments
    ///
    /// * `t_cas` - CAS latency.
    /// * `t_ras` - RAS latency.
    /// * `t_pre` - Precharge latency.
    pub fn new(t_cas: u64, t_ras: u64, t_pre: u64) -> Self {
        Self {
            last_row: None,
            t_cas,
            t_ras,
            t_pre,
            row_mask: !2047,
        }
    }
}

impl MemoryController for DramController {
    /// * **Row Hit:** `t_cas`.
    /// * **Row Miss (Open):** `t_pre + t_ras + t_cas`.
    /// * **Row Miss (Closed):** `t_ras + t_cas`.
    fn access_latency(&mut self, addr: Address) -> u64 {
        let row = addr & self.row_mask;

        match self.last_row {
            Some(open_row) if open_row == row => self.t_cas,
            Some(_) => {
                self.last_row = Some(row);
                self.t_pre + self.t_ras + self.t_cas
            }
            None => {
                self.last_row = Some(row);
                self.t_ras + self.t_cas
            }
        }
    }
}

/// A parent memory object backed by a timing controller.
pub struct MemoryPort {
    name: String,
    line_shift: u32,
    controller: Mutex<Box<dyn MemoryController>>,
    recorders: Option<Arc<RecorderSet>>,
    accesses: AtomicU64,
}

impl MemoryPort {
    /// Creates a port.
    ///
    /// # Arguments
    ///
    /// * `name` - Name used in statistics.
    /// * `controller` - Latency model for accesses through this port.
    /// * `line_shift` - log2 of the cache line size, to rebuild byte addresses.
    pub fn new(name: impl Into<String>, controller: Box<dyn MemoryController>, line_shift: u32) -> Self {
        Self {
            name: name.into(),
            line_shift,
            controller: Mutex::new(controller),
            recorders: None,
            accesses: AtomicU64::new(0),
        }
    }

    /// Attaches event recorders; every access then leaves a timing record
    /// with the requesting core's recorder.
    pub fn with_recorders(mut self, recorders: Arc<RecorderSet>) -> Self {
        self.recorders = Some(recorders);
        self
    }

    /// Returns the number of accesses served.
    pub fn accesses(&self) -> u64 {
        self.accesses.load(Ordering::Relaxed)
    }
}

impl MemObject for MemoryPort {
    fn name(&self) -> &str {
        &self.name
    }

    fn access(&self, req: &mut MemReq) -> u64 {
        self.accesses.fetch_add(1, Ordering::Relaxed);
        let latency = self
            .controller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .access_latency(req.line_addr << self.line_shift);
        let resp_cycle = req.cycle + latency;

        if let Some(recorder) = self.recorders.as_ref().and_then(|r| r.get(req.src_id)) {
            let mut recorder = recorder.lock().unwrap_or_else(PoisonError::into_inner);
            let event = recorder.new_event(req.line_addr, req.cycle, resp_cycle);
            recorder.push_record(TimingRecord {
                line_addr: req.line_addr,
                req_cycle: req.cycle,
                resp_cycle,
                start_event: Some(event),
                end_event: Some(event),
                is_ptw: req.is_ptw,
            });
        }
        resp_cycle
    }
}
