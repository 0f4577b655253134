//! Timing Records.
//!
//! Each simulated core owns an `EventRecorder`. Memory objects push a
//! `TimingRecord` for every access they serve; the page-table walker pops
//! those records after each fetch of a walk and links them into a single
//! dependency chain, so that trace replay sees one walk rather than several
//! unrelated fetches.

use crate::common::Address;
use std::sync::Mutex;

/// Index of an event in its recorder's arena.
pub type EventId = usize;

/// One timed event in the dependency graph.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimingEvent {
    pub line_addr: Address,
    pub start_cycle: u64,
    pub end_cycle: u64,
    /// Events that may only start once this one has completed.
    pub children: Vec<EventId>,
}

/// The events produced by one memory operation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TimingRecord {
    pub line_addr: Address,
    pub req_cycle: u64,
    pub resp_cycle: u64,
    pub start_event: Option<EventId>,
    pub end_event: Option<EventId>,
    pub is_ptw: bool,
}

impl TimingRecord {
    /// Returns `true` if the record references events.
    pub fn is_valid(&self) -> bool {
        self.start_event.is_some() && self.end_event.is_some()
    }

    /// Resets the record to the invalid state.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Per-core event arena and pending-record stack.
#[derive(Debug, Default)]
pub struct EventRecorder {
    events: Vec<TimingEvent>,
    records: Vec<TimingRecord>,
}

impl EventRecorder {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if a record is pending.
    pub fn has_record(&self) -> bool {
        !self.records.is_empty()
    }

    /// Takes the most recently pushed record.
    pub fn pop_record(&mut self) -> Option<TimingRecord> {
        self.records.pop()
    }

    /// Pushes a record for the next consumer.
    pub fn push_record(&mut self, record: TimingRecord) {
        self.records.push(record);
    }

    /// Returns the number of pending records.
    pub fn pending(&self) -> usize {
        self.records.len()
    }

    /// Allocates a new event.
    pub fn new_event(&mut self, line_addr: Address, start_cycle: u64, end_cycle: u64) -> EventId {
        self.events.push(TimingEvent {
            line_addr,
            start_cycle,
            end_cycle,
            children: Vec::new(),
        });
        self.events.len() - 1
    }

    /// Makes `child` depend on `parent`.
    pub fn add_child(&mut self, parent: EventId, child: EventId) {
        if let Some(event) = self.events.get_mut(parent) {
            event.children.push(child);
        }
    }

    /// Returns the number of events in the arena.
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Drops every event and pending record.
    pub fn reset(&mut self) {
        self.events.clear();
        self.records.clear();
    }

    /// Returns an event by id.
    pub fn event(&self, id: EventId) -> Option<&TimingEvent> {
        self.events.get(id)
    }

    /// Follows first children from `start`, returning the chain in order.
    pub fn chain(&self, start: EventId) -> Vec<EventId> {
        let mut chain = vec![start];
        let mut cur = start;
        while let Some(&next) = self.events.get(cur).and_then(|e| e.children.first()) {
            if chain.contains(&next) {
                break;
            }
            chain.push(next);
            cur = next;
        }
        chain
    }
}

/// Recorders for every simulated core, indexed by request source id.
#[derive(Debug)]
pub struct RecorderSet {
    recorders: Vec<Mutex<EventRecorder>>,
}

impl RecorderSet {
    /// Creates one recorder per core.
    pub fn new(cores: usize) -> Self {
        Self {
            recorders: (0..cores).map(|_| Mutex::new(EventRecorder::new())).collect(),
        }
    }

    /// Returns the recorder for `src_id`.
    pub fn get(&self, src_id: u32) -> Option<&Mutex<EventRecorder>> {
        self.recorders.get(src_id as usize)
    }
}
