//! Time-ordered event queue with a deterministic FIFO tie-break.
//!
//! Primary key: event time, ascending. Secondary key: a monotonically
//! increasing insertion sequence number assigned at enqueue, so same-time
//! events come back out in the order they went in. The sequence is unique,
//! so no further tie-break is needed and the ordering is total on every
//! platform (`f64::total_cmp`).

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::event::Event;

/// Slack used when comparing simulated times, absorbing accumulated
/// floating-point error from repeated `time += dt` advances.
pub(crate) const TIME_TOLERANCE: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Heap entry
// ---------------------------------------------------------------------------

/// An event tagged with its insertion sequence number.
#[derive(Debug, Clone)]
struct Scheduled {
    event: Event,
    seq: u64,
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; invert both keys so the earliest time,
        // and within a time the lowest sequence number, surfaces first.
        other
            .event
            .time
            .total_cmp(&self.event.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq && self.event.time == other.event.time
    }
}

impl Eq for Scheduled {}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// The pending-event queue. Owned exclusively by the kernel; processes
/// never touch it.
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    heap: BinaryHeap<Scheduled>,
    next_seq: u64,
}

impl Scheduler {
    /// Create an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue an event, assigning it the next insertion sequence number.
    pub fn enqueue(&mut self, event: Event) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Scheduled { event, seq });
    }

    /// Pop the earliest event if it is due at or before `now`.
    pub fn pop_due(&mut self, now: f64) -> Option<Event> {
        let head = self.heap.peek()?;
        if head.event.time <= now + TIME_TOLERANCE {
            self.heap.pop().map(|s| s.event)
        } else {
            None
        }
    }

    /// The time of the earliest pending event, or infinity when empty.
    pub fn peek_earliest_time(&self) -> f64 {
        self.heap
            .peek()
            .map(|s| s.event.time)
            .unwrap_or(f64::INFINITY)
    }

    /// Number of pending events.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Whether no events are pending.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Drop every pending event and reset the sequence counter, so a reset
    /// simulation replays with identical tie-breaking.
    pub fn clear(&mut self) {
        self.heap.clear();
        self.next_seq = 0;
    }

    /// Drop every pending event that references the given process, keeping
    /// the relative order of the survivors. Called when a process is
    /// removed so the queue never holds dangling ids.
    pub fn purge_process(&mut self, process_id: &str) {
        let survivors: Vec<Scheduled> = std::mem::take(&mut self.heap)
            .into_iter()
            .filter(|s| s.event.source_id != process_id && s.event.target_id != process_id)
            .collect();
        self.heap = survivors.into();
    }
}

// ===========================================================================
// Tests
// ===========================================================================
