//! The simulation kernel: process registry, connection graph, scheduler,
//! clock, and the per-step event loop.
//!
//! # Event loop
//!
//! Each `step()`:
//! 1. Advances the clock: `step += 1`, `time += dt` (stepper config, else
//!    1.0).
//! 2. Invokes `on_tick` on every process in registration order and
//!    enqueues everything they emit.
//! 3. Drains the scheduler of all events due at or before the new time,
//!    delivering each to its target and enqueueing the responses. Same-time
//!    cascades run inside the same step; a per-step event budget turns a
//!    runaway cascade into a `CascadeOverflow` error.
//! 4. Returns the delivered events in delivery order.
//!
//! A failing step is rolled back wholesale, so the kernel is always at a
//! step boundary. Determinism rests on three disciplines: registration
//! order for tick broadcasts, insertion order for connection lookups, and
//! the scheduler's sequence-number tie-break. No simulation-facing path
//! iterates a hash map.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::connection::{Connection, ConnectionTable};
use crate::error::{PortDirection, RunError, SimulationError};
use crate::event::{Event, Payload};
use crate::process::{Process, ProcessContext};
use crate::record::{ConnectionRecord, ProcessRecord};
use crate::scheduler::{Scheduler, TIME_TOLERANCE};
use crate::state::Snapshot;

/// Per-step budget factor applied to the model size.
const BUDGET_PER_UNIT: usize = 10;
/// Per-step budget floor for tiny models.
const BUDGET_BASE: usize = 64;

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

/// A resource-flow simulation. Owns its processes, connections, scheduler,
/// and clock; all mutation goes through the methods here.
#[derive(Debug, Clone, Default)]
pub struct Simulation {
    /// Processes in registration order. Tick broadcasts walk this list.
    processes: Vec<Process>,
    /// Id lookup into `processes`. Never iterated.
    index: HashMap<String, usize>,
    connections: ConnectionTable,
    scheduler: Scheduler,
    time: f64,
    step: u64,
}

/// Pre-step state captured for transactional rollback. Connections are not
/// mutated inside a step and need no copy.
struct Checkpoint {
    processes: Vec<Process>,
    scheduler: Scheduler,
    time: f64,
    step: u64,
}

impl Simulation {
    /// Build a simulation from processes and connections, validating both.
    pub fn new(
        processes: Vec<Process>,
        connections: Vec<Connection>,
    ) -> Result<Self, SimulationError> {
        let mut sim = Self::default();
        for process in processes {
            sim.add_process(process)?;
        }
        for connection in connections {
            sim.add_connection(connection)?;
        }
        // Processes may arrive with prior state; a new simulation starts
        // from initial conditions.
        sim.reset();
        Ok(sim)
    }

    /// Build a simulation from wire-form records.
    pub fn from_records(
        processes: &[ProcessRecord],
        connections: &[ConnectionRecord],
    ) -> Result<Self, SimulationError> {
        let processes = processes
            .iter()
            .map(Process::from_record)
            .collect::<Result<Vec<_>, _>>()?;
        let connections = connections
            .iter()
            .map(Connection::from_record)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(processes, connections)
    }

    // -----------------------------------------------------------------------
    // Structural edits
    // -----------------------------------------------------------------------

    /// Register a process. Registration order is tick order.
    pub fn add_process(&mut self, process: Process) -> Result<(), SimulationError> {
        let id = process.id().to_string();
        if self.index.contains_key(&id) {
            return Err(SimulationError::DuplicateId(id));
        }
        self.index.insert(id, self.processes.len());
        self.processes.push(process);
        Ok(())
    }

    /// Remove a process, all connections referencing it, and every pending
    /// event that touches it.
    pub fn remove_process(&mut self, id: &str) -> Result<Process, SimulationError> {
        let position = *self
            .index
            .get(id)
            .ok_or_else(|| SimulationError::UnknownId(id.to_string()))?;
        let removed = self.processes.remove(position);
        self.reindex();
        self.connections.remove_referencing(id);
        self.scheduler.purge_process(id);
        Ok(removed)
    }

    /// Apply a configuration update to an existing process. The record must
    /// keep the process's id and kind; runtime state is preserved.
    pub fn update_process(
        &mut self,
        id: &str,
        record: &ProcessRecord,
    ) -> Result<(), SimulationError> {
        let position = *self
            .index
            .get(id)
            .ok_or_else(|| SimulationError::UnknownId(id.to_string()))?;
        self.processes[position].apply_record(record)
    }

    /// Add a connection after validating both endpoints and ports.
    pub fn add_connection(&mut self, connection: Connection) -> Result<(), SimulationError> {
        self.validate_connection(&connection)?;
        self.connections.insert(connection)
    }

    /// Remove a connection by id.
    pub fn remove_connection(&mut self, id: &str) -> Result<Connection, SimulationError> {
        self.connections.remove(id)
    }

    /// Replace a connection, revalidating endpoints. The id must not
    /// change; table position is preserved.
    pub fn update_connection(
        &mut self,
        id: &str,
        connection: Connection,
    ) -> Result<(), SimulationError> {
        self.validate_connection(&connection)?;
        self.connections.update(id, connection)
    }

    fn validate_connection(&self, connection: &Connection) -> Result<(), SimulationError> {
        if !connection.flow_rate.is_finite() || connection.flow_rate <= 0.0 {
            return Err(SimulationError::InvalidConfig(format!(
                "connection '{}' flow rate must be positive and finite, got {}",
                connection.id, connection.flow_rate
            )));
        }
        let source = self
            .process(&connection.source_id)
            .ok_or_else(|| SimulationError::UnknownId(connection.source_id.clone()))?;
        if !source
            .output_ports()
            .contains(&connection.source_port.as_str())
        {
            return Err(SimulationError::PortUnknown {
                process: connection.source_id.clone(),
                port: connection.source_port.clone(),
                direction: PortDirection::Output,
            });
        }
        let target = self
            .process(&connection.target_id)
            .ok_or_else(|| SimulationError::UnknownId(connection.target_id.clone()))?;
        if !target
            .input_ports()
            .contains(&connection.target_port.as_str())
        {
            return Err(SimulationError::PortUnknown {
                process: connection.target_id.clone(),
                port: connection.target_port.clone(),
                direction: PortDirection::Input,
            });
        }
        Ok(())
    }

    fn reindex(&mut self) {
        self.index.clear();
        for (position, process) in self.processes.iter().enumerate() {
            self.index.insert(process.id().to_string(), position);
        }
    }

    // -----------------------------------------------------------------------
    // Event injection
    // -----------------------------------------------------------------------

    /// Schedule an external event. Both endpoints must exist; events whose
    /// replies would dangle are rejected up front rather than failing a
    /// later step.
    pub fn schedule_event(&mut self, event: Event) -> Result<(), SimulationError> {
        if !event.time.is_finite() {
            return Err(SimulationError::InvalidConfig(format!(
                "event time must be finite, got {}",
                event.time
            )));
        }
        if !self.index.contains_key(&event.source_id) {
            return Err(SimulationError::UnknownId(event.source_id));
        }
        let target = self
            .process(&event.target_id)
            .ok_or_else(|| SimulationError::UnknownId(event.target_id.clone()))?;
        if let Some(port) = &event.target_port {
            if !target.input_ports().contains(&port.as_str()) {
                return Err(SimulationError::PortUnknown {
                    process: event.target_id.clone(),
                    port: port.clone(),
                    direction: PortDirection::Input,
                });
            }
        }
        self.scheduler.enqueue(event);
        Ok(())
    }

    /// Inject a trigger command for an `Interactive` process, delivered
    /// during the next step.
    pub fn trigger(&mut self, process_id: &str) -> Result<(), SimulationError> {
        if !self.index.contains_key(process_id) {
            return Err(SimulationError::UnknownId(process_id.to_string()));
        }
        // Triggers produce no replies, so a non-process sender is safe.
        self.scheduler.enqueue(Event {
            source_id: "external".to_string(),
            source_port: None,
            target_id: process_id.to_string(),
            target_port: None,
            time: self.time,
            payload: Payload::Trigger,
        });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Stepping
    // -----------------------------------------------------------------------

    /// Advance exactly one tick. Returns the delivered events in delivery
    /// order. On failure the step is rolled back and the error returned.
    pub fn step(&mut self) -> Result<Vec<Event>, SimulationError> {
        let checkpoint = self.checkpoint();
        match self.step_inner() {
            Ok(delivered) => Ok(delivered),
            Err(error) => {
                debug!("step {} failed, rolling back: {error}", self.step);
                self.restore(checkpoint);
                Err(error)
            }
        }
    }

    /// Step until the clock reaches or passes `target_time`.
    pub fn step_until(&mut self, target_time: f64) -> Result<Vec<Event>, RunError> {
        let mut delivered = Vec::new();
        while self.time + TIME_TOLERANCE < target_time {
            match self.step() {
                Ok(events) => delivered.extend(events),
                Err(error) => return Err(RunError { delivered, error }),
            }
        }
        Ok(delivered)
    }

    /// Step exactly `n` times.
    pub fn step_n(&mut self, n: usize) -> Result<Vec<Event>, RunError> {
        let mut delivered = Vec::new();
        for _ in 0..n {
            match self.step() {
                Ok(events) => delivered.extend(events),
                Err(error) => return Err(RunError { delivered, error }),
            }
        }
        Ok(delivered)
    }

    fn step_inner(&mut self) -> Result<Vec<Event>, SimulationError> {
        self.step += 1;
        self.time += self.dt();
        let (time, step) = (self.time, self.step);
        debug!("step {step} at time {time}");

        // Tick broadcast in registration order.
        for position in 0..self.processes.len() {
            let id = self.processes[position].id().to_string();
            let ctx = context_for(&self.connections, &id, time, step);
            let emitted = self.processes[position].on_tick(&ctx);
            for event in emitted {
                self.scheduler.enqueue(event);
            }
        }

        // Drain everything due at or before the new time. Cascades stay in
        // this loop because responses at the current time re-enter the
        // queue behind already-pending same-time events.
        let budget =
            BUDGET_PER_UNIT * (self.processes.len() + self.connections.len()) + BUDGET_BASE;
        let mut delivered = Vec::new();
        while let Some(event) = self.scheduler.pop_due(time) {
            if delivered.len() >= budget {
                return Err(SimulationError::CascadeOverflow { budget, time });
            }
            let emitted = self.deliver(&event, time, step)?;
            for response in emitted {
                self.scheduler.enqueue(response);
            }
            delivered.push(event);
        }

        Ok(delivered)
    }

    fn deliver(
        &mut self,
        event: &Event,
        time: f64,
        step: u64,
    ) -> Result<Vec<Event>, SimulationError> {
        let position = *self
            .index
            .get(&event.target_id)
            .ok_or_else(|| SimulationError::UnknownId(event.target_id.clone()))?;
        if let Some(port) = &event.target_port {
            if !self.processes[position]
                .input_ports()
                .contains(&port.as_str())
            {
                return Err(SimulationError::PortUnknown {
                    process: event.target_id.clone(),
                    port: port.clone(),
                    direction: PortDirection::Input,
                });
            }
        }
        trace!(
            "delivering {:?} from '{}' to '{}'",
            event.payload.kind(),
            event.source_id,
            event.target_id
        );
        let ctx = context_for(&self.connections, &event.target_id, time, step);
        Ok(self.processes[position].on_message(event, &ctx))
    }

    /// Reset to the initial state: clock zeroed, scheduler cleared, every
    /// process restored. The structure (processes, connections) stays.
    pub fn reset(&mut self) {
        self.scheduler.clear();
        self.time = 0.0;
        self.step = 0;
        for process in &mut self.processes {
            process.reset();
        }
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            processes: self.processes.clone(),
            scheduler: self.scheduler.clone(),
            time: self.time,
            step: self.step,
        }
    }

    fn restore(&mut self, checkpoint: Checkpoint) {
        self.processes = checkpoint.processes;
        self.scheduler = checkpoint.scheduler;
        self.time = checkpoint.time;
        self.step = checkpoint.step;
    }

    /// Tick length: the stepper's `dt` if one is registered, else 1.0.
    fn dt(&self) -> f64 {
        self.processes
            .iter()
            .find_map(|p| match p {
                Process::Stepper(stepper) => Some(stepper.dt()),
                _ => None,
            })
            .unwrap_or(1.0)
    }

    // -----------------------------------------------------------------------
    // Observation
    // -----------------------------------------------------------------------

    /// Assemble an immutable snapshot of the clock and every process state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            time: self.time,
            step: self.step,
            process_states: self
                .processes
                .iter()
                .map(|p| (p.id().to_string(), p.state()))
                .collect(),
        }
    }

    pub fn current_time(&self) -> f64 {
        self.time
    }

    pub fn current_step(&self) -> u64 {
        self.step
    }

    pub fn process(&self, id: &str) -> Option<&Process> {
        self.index.get(id).map(|&i| &self.processes[i])
    }

    /// Process ids in registration order.
    pub fn process_ids(&self) -> Vec<String> {
        self.processes.iter().map(|p| p.id().to_string()).collect()
    }

    pub fn process_count(&self) -> usize {
        self.processes.len()
    }

    pub fn has_process(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn connection(&self, id: &str) -> Option<&Connection> {
        self.connections.get(id)
    }

    /// Connections in table order.
    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.iter()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of events waiting in the scheduler.
    pub fn pending_events(&self) -> usize {
        self.scheduler.len()
    }
}

/// Context for one process: the clock plus its connections in table order.
fn context_for<'a>(
    connections: &'a ConnectionTable,
    process_id: &str,
    time: f64,
    step: u64,
) -> ProcessContext<'a> {
    ProcessContext::new(
        time,
        step,
        connections.incoming_of(process_id),
        connections.outgoing_of(process_id),
    )
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::PayloadKind;
    use crate::record::ProcessKind;
    use crate::test_utils::*;

    // -----------------------------------------------------------------------
    // Construction and validation
    // -----------------------------------------------------------------------

    #[test]
    fn duplicate_process_id_rejected() {
        let mut sim = Simulation::default();
        sim.add_process(process(&source_record("dup"))).unwrap();
        let err = sim.add_process(process(&pool_record("dup"))).unwrap_err();
        assert_eq!(err, SimulationError::DuplicateId("dup".to_string()));
        assert_eq!(sim.process_count(), 1);
    }

    #[test]
    fn connection_requires_existing_endpoints() {
        let mut sim = Simulation::default();
        sim.add_process(process(&source_record("s"))).unwrap();

        let err = sim
            .add_connection(Connection::new("c1", "s", "ghost"))
            .unwrap_err();
        assert_eq!(err, SimulationError::UnknownId("ghost".to_string()));
    }

    #[test]
    fn connection_requires_declared_ports() {
        let mut sim = Simulation::default();
        sim.add_process(process(&source_record("s"))).unwrap();
        sim.add_process(process(&pool_record("p"))).unwrap();

        let err = sim
            .add_connection(Connection::new("c1", "s", "p").with_ports("side", "in"))
            .unwrap_err();
        assert!(matches!(
            err,
            SimulationError::PortUnknown {
                direction: PortDirection::Output,
                ..
            }
        ));

        // A stepper declares no ports at all.
        sim.add_process(process(&stepper_record("st"))).unwrap();
        let err = sim
            .add_connection(Connection::new("c2", "s", "st"))
            .unwrap_err();
        assert!(matches!(err, SimulationError::PortUnknown { .. }));
    }

    // -----------------------------------------------------------------------
    // Event loop
    // -----------------------------------------------------------------------

    #[test]
    fn source_fills_pool_step_by_step() {
        let mut sim = source_pool_sim(1.0, None);
        for expected in 1..=5u64 {
            sim.step().unwrap();
            let snapshot = sim.snapshot();
            assert_eq!(snapshot.step, expected);
            assert_eq!(snapshot.time, expected as f64);
            assert_eq!(snapshot.pool_resources("pool1"), Some(expected as f64));
            assert_eq!(snapshot.resources_produced("source1"), Some(expected as f64));
        }
    }

    #[test]
    fn ticks_follow_registration_order() {
        let mut sim = Simulation::default();
        sim.add_process(process(&source_record("s2"))).unwrap();
        sim.add_process(process(&source_record("s1"))).unwrap();
        sim.add_process(process(&pool_record("p"))).unwrap();
        sim.add_process(process(&stepper_record("stepper"))).unwrap();
        sim.add_connection(Connection::new("c1", "s2", "p")).unwrap();
        sim.add_connection(Connection::new("c2", "s1", "p")).unwrap();

        let delivered = sim.step().unwrap();
        let transfer_sources: Vec<&str> = delivered
            .iter()
            .filter(|e| e.payload.kind() == PayloadKind::Transfer)
            .map(|e| e.source_id.as_str())
            .collect();
        // s2 was registered first, so its transfer is delivered first.
        assert_eq!(transfer_sources, vec!["s2", "s1"]);
    }

    #[test]
    fn no_stepper_defaults_to_unit_dt() {
        let mut sim = source_pool_sim_without_stepper();
        sim.step().unwrap();
        assert_eq!(sim.current_time(), 1.0);
        assert_eq!(sim.snapshot().pool_resources("pool1"), Some(1.0));
    }

    #[test]
    fn stepper_dt_drives_the_clock() {
        let mut sim = Simulation::default();
        sim.add_process(process(&source_record("s"))).unwrap();
        sim.add_process(process(&pool_record("p"))).unwrap();
        sim.add_process(process(
            &ProcessRecord::new("st", ProcessKind::Stepper).with_dt(0.5),
        ))
        .unwrap();
        sim.add_connection(Connection::new("c1", "s", "p")).unwrap();

        sim.step_until(2.5).unwrap();
        assert_eq!(sim.current_time(), 2.5);
        assert_eq!(sim.current_step(), 5);
        assert_eq!(sim.snapshot().pool_resources("p"), Some(5.0));
    }

    #[test]
    fn step_until_stops_at_or_past_target() {
        let mut sim = source_pool_sim(1.0, None);
        sim.step_until(2.5).unwrap();
        // dt = 1.0: steps at 1, 2, 3; 3 >= 2.5.
        assert_eq!(sim.current_time(), 3.0);
        assert_eq!(sim.current_step(), 3);
    }

    #[test]
    fn stepper_state_mirrors_clock() {
        let mut sim = source_pool_sim(1.0, None);
        sim.step_n(3).unwrap();
        let snapshot = sim.snapshot();
        assert_eq!(
            snapshot.state("stepper").unwrap().as_stepper().unwrap().current_step,
            3
        );
    }

    // -----------------------------------------------------------------------
    // Structural edits
    // -----------------------------------------------------------------------

    #[test]
    fn remove_process_cascades() {
        let mut sim = source_pool_sim(1.0, None);
        assert_eq!(sim.connection_count(), 1);

        sim.remove_process("pool1").unwrap();
        assert!(!sim.has_process("pool1"));
        assert_eq!(sim.connection_count(), 0);

        // The source keeps ticking into the void without error.
        sim.step().unwrap();
        assert_eq!(sim.snapshot().resources_produced("source1"), Some(0.0));
    }

    #[test]
    fn remove_process_purges_pending_events() {
        let mut sim = Simulation::default();
        sim.add_process(process(&source_record("s"))).unwrap();
        sim.add_process(process(&pool_record("p"))).unwrap();
        sim.add_connection(Connection::new("c1", "s", "p")).unwrap();

        sim.schedule_event(Event {
            source_id: "s".to_string(),
            source_port: Some("out".to_string()),
            target_id: "p".to_string(),
            target_port: Some("in".to_string()),
            time: 5.0,
            payload: Payload::Transfer { amount: 1.0 },
        })
        .unwrap();
        assert_eq!(sim.pending_events(), 1);

        sim.remove_process("p").unwrap();
        assert_eq!(sim.pending_events(), 0);
    }

    #[test]
    fn update_process_changes_config_in_place() {
        let mut sim = source_pool_sim(1.0, None);
        sim.step_n(2).unwrap();

        sim.update_process(
            "pool1",
            &pool_record("pool1")
                .with_capacity(3.0)
                .with_overflow(crate::process::OverflowPolicy::Block),
        )
        .unwrap();

        sim.step_n(5).unwrap();
        let snapshot = sim.snapshot();
        // Level survived the update and then hit the new cap.
        assert_eq!(snapshot.pool_resources("pool1"), Some(3.0));
    }

    #[test]
    fn update_process_unknown_id() {
        let mut sim = Simulation::default();
        let err = sim
            .update_process("ghost", &pool_record("ghost"))
            .unwrap_err();
        assert_eq!(err, SimulationError::UnknownId("ghost".to_string()));
    }

    #[test]
    fn update_connection_revalidates() {
        let mut sim = source_pool_sim(1.0, None);
        sim.update_connection("c1", Connection::new("c1", "source1", "pool1").with_flow_rate(2.0))
            .unwrap();
        sim.step().unwrap();
        assert_eq!(sim.snapshot().pool_resources("pool1"), Some(2.0));

        let err = sim
            .update_connection("c1", Connection::new("c1", "source1", "ghost"))
            .unwrap_err();
        assert_eq!(err, SimulationError::UnknownId("ghost".to_string()));
    }

    // -----------------------------------------------------------------------
    // Transactional stepping
    // -----------------------------------------------------------------------

    #[test]
    fn cascade_overflow_rolls_back() {
        let mut sim = source_pool_sim(1.0, None);
        let budget = BUDGET_PER_UNIT * (sim.process_count() + sim.connection_count()) + BUDGET_BASE;

        // Flood the next step far past its budget.
        for _ in 0..budget + 1 {
            sim.schedule_event(Event {
                source_id: "source1".to_string(),
                source_port: Some("out".to_string()),
                target_id: "pool1".to_string(),
                target_port: Some("in".to_string()),
                time: 1.0,
                payload: Payload::Transfer { amount: 1.0 },
            })
            .unwrap();
        }

        let before = sim.snapshot();
        let err = sim.step().unwrap_err();
        assert!(matches!(err, SimulationError::CascadeOverflow { .. }));
        // The failed step left no trace.
        assert_eq!(sim.snapshot(), before);
        assert_eq!(sim.current_step(), 0);
    }

    #[test]
    fn run_error_keeps_completed_steps() {
        let mut sim = source_pool_sim(1.0, None);
        let budget = BUDGET_PER_UNIT * (sim.process_count() + sim.connection_count()) + BUDGET_BASE;
        for _ in 0..budget + 1 {
            sim.schedule_event(Event {
                source_id: "source1".to_string(),
                source_port: Some("out".to_string()),
                target_id: "pool1".to_string(),
                target_port: Some("in".to_string()),
                time: 2.0,
                payload: Payload::Transfer { amount: 1.0 },
            })
            .unwrap();
        }

        let failure = sim.step_n(5).unwrap_err();
        assert!(matches!(
            failure.error,
            SimulationError::CascadeOverflow { .. }
        ));
        // Step 1 completed and stayed applied.
        assert!(!failure.delivered.is_empty());
        assert_eq!(sim.current_step(), 1);
        assert_eq!(sim.snapshot().pool_resources("pool1"), Some(1.0));
    }

    // -----------------------------------------------------------------------
    // Reset
    // -----------------------------------------------------------------------

    #[test]
    fn reset_restores_initial_trajectory() {
        let mut sim = source_pool_sim(1.0, None);
        let first: Vec<Snapshot> = run_collecting(&mut sim, 4);

        sim.reset();
        assert_eq!(sim.current_time(), 0.0);
        assert_eq!(sim.current_step(), 0);
        assert_eq!(sim.pending_events(), 0);
        assert_eq!(sim.snapshot().pool_resources("pool1"), Some(0.0));

        let second: Vec<Snapshot> = run_collecting(&mut sim, 4);
        assert_eq!(first, second);
    }

    // -----------------------------------------------------------------------
    // Injection
    // -----------------------------------------------------------------------

    #[test]
    fn trigger_fires_interactive_source_once() {
        let mut sim = Simulation::default();
        sim.add_process(process(
            &source_record("s").with_trigger_mode(crate::process::TriggerMode::Interactive),
        ))
        .unwrap();
        sim.add_process(process(&pool_record("p"))).unwrap();
        sim.add_process(process(&stepper_record("stepper"))).unwrap();
        sim.add_connection(Connection::new("c1", "s", "p")).unwrap();

        // Without a trigger the interactive source stays quiet.
        sim.step().unwrap();
        assert_eq!(sim.snapshot().pool_resources("p"), Some(0.0));

        sim.trigger("s").unwrap();
        sim.step().unwrap();
        assert_eq!(sim.snapshot().pool_resources("p"), Some(1.0));

        sim.step().unwrap();
        assert_eq!(sim.snapshot().pool_resources("p"), Some(1.0));
    }

    #[test]
    fn schedule_event_validates_endpoints() {
        let mut sim = source_pool_sim(1.0, None);
        let err = sim
            .schedule_event(Event {
                source_id: "ghost".to_string(),
                source_port: None,
                target_id: "pool1".to_string(),
                target_port: None,
                time: 1.0,
                payload: Payload::Transfer { amount: 1.0 },
            })
            .unwrap_err();
        assert_eq!(err, SimulationError::UnknownId("ghost".to_string()));
    }

    // -----------------------------------------------------------------------
    // Determinism
    // -----------------------------------------------------------------------

    #[test]
    fn identical_models_step_identically() {
        let mut a = source_pool_sim(2.0, Some(5.0));
        let mut b = source_pool_sim(2.0, Some(5.0));

        for _ in 0..6 {
            let ea = a.step().unwrap();
            let eb = b.step().unwrap();
            assert_eq!(ea, eb);
            assert_eq!(a.snapshot(), b.snapshot());
        }
    }
}
