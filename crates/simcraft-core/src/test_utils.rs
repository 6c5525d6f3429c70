//! Shared scenario builders for unit tests, integration tests, and
//! benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so the helpers
//! are available to this crate's tests and, via the `test-utils` feature,
//! to downstream test crates.

use crate::connection::Connection;
use crate::process::Process;
use crate::record::{ProcessKind, ProcessRecord};
use crate::sim::Simulation;
use crate::state::Snapshot;

// ===========================================================================
// Record builders
// ===========================================================================

pub fn source_record(id: &str) -> ProcessRecord {
    ProcessRecord::new(id, ProcessKind::Source)
}

pub fn pool_record(id: &str) -> ProcessRecord {
    ProcessRecord::new(id, ProcessKind::Pool)
}

pub fn drain_record(id: &str) -> ProcessRecord {
    ProcessRecord::new(id, ProcessKind::Drain)
}

pub fn delay_record(id: &str) -> ProcessRecord {
    ProcessRecord::new(id, ProcessKind::Delay)
}

pub fn stepper_record(id: &str) -> ProcessRecord {
    ProcessRecord::new(id, ProcessKind::Stepper)
}

/// Lower a record, panicking on invalid test input.
pub fn process(record: &ProcessRecord) -> Process {
    Process::from_record(record).expect("valid test record")
}

// ===========================================================================
// Scenario builders
// ===========================================================================

/// `source1 -> pool1` with a stepper; optional pool capacity (Block
/// policy).
pub fn source_pool_sim(flow_rate: f64, capacity: Option<f64>) -> Simulation {
    let mut pool = pool_record("pool1");
    if let Some(capacity) = capacity {
        pool = pool.with_capacity(capacity);
    }
    Simulation::new(
        vec![
            process(&source_record("source1")),
            process(&pool),
            process(&stepper_record("stepper")),
        ],
        vec![Connection::new("c1", "source1", "pool1").with_flow_rate(flow_rate)],
    )
    .expect("valid scenario")
}

/// `source1 -> pool1` with no stepper registered.
pub fn source_pool_sim_without_stepper() -> Simulation {
    Simulation::new(
        vec![
            process(&source_record("source1")),
            process(&pool_record("pool1")),
        ],
        vec![Connection::new("c1", "source1", "pool1")],
    )
    .expect("valid scenario")
}

/// A linear `source -> pool -> ... -> pool` chain of automatic pushers,
/// plus a stepper. Used by benches and property tests.
pub fn chain_sim(pool_count: usize) -> Simulation {
    let mut sim = Simulation::default();
    sim.add_process(process(&source_record("source")))
        .expect("add source");
    for i in 0..pool_count {
        sim.add_process(process(
            &pool_record(&format!("pool{i}"))
                .with_trigger_mode(crate::process::TriggerMode::Automatic)
                .with_action("PushAny"),
        ))
        .expect("add pool");
    }
    sim.add_process(process(&stepper_record("stepper")))
        .expect("add stepper");

    sim.add_connection(Connection::new("c0", "source", "pool0"))
        .expect("connect source");
    for i in 1..pool_count {
        sim.add_connection(Connection::new(
            &format!("c{i}"),
            &format!("pool{}", i - 1),
            &format!("pool{i}"),
        ))
        .expect("connect pools");
    }
    sim
}

// ===========================================================================
// Run helpers
// ===========================================================================

/// Step `n` times, collecting a snapshot after each step.
pub fn run_collecting(sim: &mut Simulation, n: usize) -> Vec<Snapshot> {
    (0..n)
        .map(|_| {
            sim.step().expect("step");
            sim.snapshot()
        })
        .collect()
}
