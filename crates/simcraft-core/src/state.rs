//! Per-variant process state and simulation snapshots.
//!
//! Snapshots are value copies: the kernel assembles one on demand and hands
//! it to the caller, so no shared mutable state ever crosses the boundary.
//! `process_states` is a `BTreeMap` so serialized snapshots are byte-stable
//! across runs and platforms.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Per-variant state records
// ---------------------------------------------------------------------------

/// Cumulative production of a source. Only amounts accepted downstream
/// count.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceState {
    pub resources_produced: f64,
}

/// Current level of a pool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolState {
    pub resources: f64,
}

/// Cumulative consumption of a drain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainState {
    pub resources_consumed: f64,
}

/// Cumulative totals of a delay. The in-flight amount is
/// `resources_received - resources_released`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelayState {
    pub resources_received: f64,
    pub resources_released: f64,
}

impl DelayState {
    /// Resources currently buffered or scheduled inside the delay.
    pub fn in_flight(&self) -> f64 {
        self.resources_received - self.resources_released
    }
}

/// Mirror of the clock's step counter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepperState {
    pub current_step: u64,
}

// ---------------------------------------------------------------------------
// Tagged state
// ---------------------------------------------------------------------------

/// Variant-tagged state record of a single process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ProcessState {
    Source(SourceState),
    Pool(PoolState),
    Drain(DrainState),
    Delay(DelayState),
    Stepper(StepperState),
}

impl ProcessState {
    pub fn as_source(&self) -> Option<&SourceState> {
        match self {
            ProcessState::Source(state) => Some(state),
            _ => None,
        }
    }

    pub fn as_pool(&self) -> Option<&PoolState> {
        match self {
            ProcessState::Pool(state) => Some(state),
            _ => None,
        }
    }

    pub fn as_drain(&self) -> Option<&DrainState> {
        match self {
            ProcessState::Drain(state) => Some(state),
            _ => None,
        }
    }

    pub fn as_delay(&self) -> Option<&DelayState> {
        match self {
            ProcessState::Delay(state) => Some(state),
            _ => None,
        }
    }

    pub fn as_stepper(&self) -> Option<&StepperState> {
        match self {
            ProcessState::Stepper(state) => Some(state),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// An immutable view of the whole simulation at a step boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub time: f64,
    pub step: u64,
    pub process_states: BTreeMap<String, ProcessState>,
}

impl Snapshot {
    /// State of a single process, if present.
    pub fn state(&self, process_id: &str) -> Option<&ProcessState> {
        self.process_states.get(process_id)
    }

    /// Shorthand for a pool's current level.
    pub fn pool_resources(&self, process_id: &str) -> Option<f64> {
        self.state(process_id)?.as_pool().map(|s| s.resources)
    }

    /// Shorthand for a source's cumulative production.
    pub fn resources_produced(&self, process_id: &str) -> Option<f64> {
        self.state(process_id)?
            .as_source()
            .map(|s| s.resources_produced)
    }

    /// Shorthand for a drain's cumulative consumption.
    pub fn resources_consumed(&self, process_id: &str) -> Option<f64> {
        self.state(process_id)?
            .as_drain()
            .map(|s| s.resources_consumed)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
