//! Process variants and their resource-flow behavior.
//!
//! The five variants form a tagged sum type dispatched by enum match (no
//! trait objects). Shared capability surface on [`Process`]:
//!
//! - `on_tick` -- invoked once per stepper tick by the kernel, in
//!   registration order; returns emitted events.
//! - `on_message` -- invoked when an inbound event is delivered; returns
//!   emitted events.
//! - `state` / `record` / `reset` -- introspection and lifecycle.
//!
//! Transfers use an in-band handshake: the receiver always answers a
//! `Transfer` with a `TransferResult`, and senders only commit counters and
//! stock to the accepted amount. Pull requests are answered only by
//! processes in a passive trigger mode; an automatic process already pushes
//! on its own tick, and answering pulls as well would move resources twice.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::connection::{Connection, DEFAULT_INPUT_PORT, DEFAULT_OUTPUT_PORT};
use crate::error::SimulationError;
use crate::event::{Event, Payload};
use crate::state::{
    DelayState, DrainState, PoolState, ProcessState, SourceState, StepperState,
};

// ---------------------------------------------------------------------------
// Configuration vocabulary
// ---------------------------------------------------------------------------

/// When a process fires its flow action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerMode {
    /// Fires only when pulled or pushed at by a peer.
    Passive,
    /// Fires only on an injected [`Payload::Trigger`] command.
    Interactive,
    /// Fires on every stepper tick.
    Automatic,
    /// Reserved; behaves as `Passive` until specified.
    Enabling,
}

impl TriggerMode {
    /// Whether this mode answers inbound pull requests and supply probes.
    fn answers_pulls(self) -> bool {
        matches!(self, TriggerMode::Passive | TriggerMode::Enabling)
    }
}

/// Flow action of pools and drains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowAction {
    PullAny,
    PullAll,
    PushAny,
    PushAll,
}

impl FlowAction {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "PullAny" => Some(FlowAction::PullAny),
            "PullAll" => Some(FlowAction::PullAll),
            "PushAny" => Some(FlowAction::PushAny),
            "PushAll" => Some(FlowAction::PushAll),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FlowAction::PullAny => "PullAny",
            FlowAction::PullAll => "PullAll",
            FlowAction::PushAny => "PushAny",
            FlowAction::PushAll => "PushAll",
        }
    }
}

/// Release discipline of a delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayMode {
    /// Every accepted amount is released independently, one period later.
    Delay,
    /// Amounts accumulate in a queue drained in `release_amount` batches,
    /// one batch per period.
    Queue,
}

impl DelayMode {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Delay" => Some(DelayMode::Delay),
            "Queue" => Some(DelayMode::Queue),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DelayMode::Delay => "Delay",
            DelayMode::Queue => "Queue",
        }
    }
}

/// What a bounded pool does with inflow beyond its capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverflowPolicy {
    /// Refuse the remainder; the sender keeps it.
    Block,
    /// Accept the full amount and discard the remainder.
    Drain,
}

// ---------------------------------------------------------------------------
// Process context
// ---------------------------------------------------------------------------

/// Read-only view handed to a process while it runs: the clock plus the
/// process's inbound and outbound connections in table order.
#[derive(Debug)]
pub struct ProcessContext<'a> {
    time: f64,
    step: u64,
    inputs: Vec<&'a Connection>,
    outputs: Vec<&'a Connection>,
}

impl<'a> ProcessContext<'a> {
    pub fn new(
        time: f64,
        step: u64,
        inputs: Vec<&'a Connection>,
        outputs: Vec<&'a Connection>,
    ) -> Self {
        Self {
            time,
            step,
            inputs,
            outputs,
        }
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    /// Inbound connections on the given port, in table order.
    pub fn inputs_for_port(&self, port: &str) -> Vec<&'a Connection> {
        self.inputs
            .iter()
            .filter(|c| c.target_port == port)
            .copied()
            .collect()
    }

    /// Outbound connections on the given port, in table order.
    pub fn outputs_for_port(&self, port: &str) -> Vec<&'a Connection> {
        self.outputs
            .iter()
            .filter(|c| c.source_port == port)
            .copied()
            .collect()
    }

    /// First outbound connection whose target is the given process.
    pub fn output_to(&self, target_id: &str) -> Option<&'a Connection> {
        self.outputs
            .iter()
            .find(|c| c.target_id == target_id)
            .copied()
    }
}

// ---------------------------------------------------------------------------
// Event construction helpers
// ---------------------------------------------------------------------------

/// A transfer travelling along a connection, in its direction.
fn transfer_along(conn: &Connection, time: f64, amount: f64) -> Event {
    Event {
        source_id: conn.source_id.clone(),
        source_port: Some(conn.source_port.clone()),
        target_id: conn.target_id.clone(),
        target_port: Some(conn.target_port.clone()),
        time,
        payload: Payload::Transfer { amount },
    }
}

/// A pull request travelling against a connection's direction.
fn pull_request_along(conn: &Connection, time: f64) -> Event {
    Event {
        source_id: conn.target_id.clone(),
        source_port: None,
        target_id: conn.source_id.clone(),
        target_port: None,
        time,
        payload: Payload::PullRequest {
            amount: conn.flow_rate,
        },
    }
}

/// A portless event from `source` to `target`.
fn message(source: &str, target: &str, time: f64, payload: Payload) -> Event {
    Event {
        source_id: source.to_string(),
        source_port: None,
        target_id: target.to_string(),
        target_port: None,
        time,
        payload,
    }
}

// ---------------------------------------------------------------------------
// All-or-nothing probe
// ---------------------------------------------------------------------------

/// Transient state of an in-tick all-or-nothing probe: the flow total each
/// peer must satisfy, and the reports received so far.
#[derive(Debug, Clone, PartialEq)]
struct Probe {
    required: BTreeMap<String, f64>,
    reports: BTreeMap<String, f64>,
}

impl Probe {
    /// Build the probe for a connection set and the query events to send,
    /// one per distinct peer in table order. `by_source` selects which
    /// endpoint of each connection is the peer.
    fn start(
        own_id: &str,
        conns: &[&Connection],
        by_source: bool,
        query: Payload,
        time: f64,
    ) -> (Probe, Vec<Event>) {
        let mut required: BTreeMap<String, f64> = BTreeMap::new();
        let mut queries = Vec::new();
        for conn in conns {
            let peer = if by_source {
                &conn.source_id
            } else {
                &conn.target_id
            };
            if !required.contains_key(peer) {
                required.insert(peer.clone(), 0.0);
                queries.push(message(own_id, peer, time, query.clone()));
            }
            *required.get_mut(peer).unwrap() += conn.flow_rate;
        }
        (
            Probe {
                required,
                reports: BTreeMap::new(),
            },
            queries,
        )
    }

    /// Record a peer's report. Returns `Some(satisfied)` once every peer has
    /// reported, `None` while the probe is still collecting.
    fn record(&mut self, peer: &str, value: f64) -> Option<bool> {
        if !self.required.contains_key(peer) {
            return None;
        }
        self.reports.insert(peer.to_string(), value);
        if self.reports.len() < self.required.len() {
            return None;
        }
        Some(
            self.required
                .iter()
                .all(|(id, need)| self.reports.get(id).copied().unwrap_or(0.0) >= *need),
        )
    }
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// Produces resources: on every tick when automatic, on demand when
/// passive, on an injected trigger when interactive.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub(crate) id: String,
    pub(crate) trigger_mode: TriggerMode,
    pub(crate) state: SourceState,
}

impl Source {
    pub(crate) fn new(id: &str, trigger_mode: TriggerMode) -> Self {
        Self {
            id: id.to_string(),
            trigger_mode,
            state: SourceState::default(),
        }
    }

    /// Push one transfer per outgoing connection. Production is counted
    /// when the receiver confirms acceptance, not here.
    fn fire(&self, ctx: &ProcessContext) -> Vec<Event> {
        ctx.outputs_for_port(DEFAULT_OUTPUT_PORT)
            .iter()
            .map(|conn| transfer_along(conn, ctx.time(), conn.flow_rate))
            .collect()
    }

    fn on_tick(&mut self, ctx: &ProcessContext) -> Vec<Event> {
        match self.trigger_mode {
            TriggerMode::Automatic => self.fire(ctx),
            _ => Vec::new(),
        }
    }

    fn on_message(&mut self, event: &Event, ctx: &ProcessContext) -> Vec<Event> {
        match &event.payload {
            Payload::TransferResult { accepted, .. } => {
                self.state.resources_produced += accepted;
                Vec::new()
            }
            Payload::PullRequest { amount } => {
                if !self.trigger_mode.answers_pulls() {
                    return Vec::new();
                }
                let Some(conn) = ctx.output_to(&event.source_id) else {
                    warn!(
                        "source '{}' pulled by unconnected process '{}'",
                        self.id, event.source_id
                    );
                    return Vec::new();
                };
                vec![transfer_along(conn, ctx.time(), *amount)]
            }
            Payload::SupplyQuery => {
                let available = if self.trigger_mode.answers_pulls() {
                    f64::INFINITY
                } else {
                    0.0
                };
                vec![event.reply(Payload::SupplyReport { available }, ctx.time())]
            }
            Payload::Trigger => {
                if self.trigger_mode == TriggerMode::Interactive {
                    self.fire(ctx)
                } else {
                    Vec::new()
                }
            }
            other => {
                debug!("source '{}' ignoring {:?}", self.id, other.kind());
                Vec::new()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Pool
// ---------------------------------------------------------------------------

/// Accumulates resources, bounded above by an optional capacity.
#[derive(Debug, Clone, PartialEq)]
pub struct Pool {
    pub(crate) id: String,
    pub(crate) trigger_mode: TriggerMode,
    pub(crate) action: FlowAction,
    pub(crate) overflow: OverflowPolicy,
    pub(crate) capacity: Option<f64>,
    pub(crate) initial_resources: f64,
    pub(crate) state: PoolState,
    /// Stock reserved by in-flight outbound transfers, released when their
    /// results come back. Settles to zero at every step boundary.
    promised: f64,
    probe: Option<Probe>,
}

impl Pool {
    pub(crate) fn new(
        id: &str,
        trigger_mode: TriggerMode,
        action: FlowAction,
        overflow: OverflowPolicy,
        capacity: Option<f64>,
        initial_resources: f64,
    ) -> Self {
        Self {
            id: id.to_string(),
            trigger_mode,
            action,
            overflow,
            capacity,
            initial_resources,
            state: PoolState {
                resources: initial_resources,
            },
            promised: 0.0,
            probe: None,
        }
    }

    /// Stock not yet spoken for by an in-flight transfer.
    fn available(&self) -> f64 {
        (self.state.resources - self.promised).max(0.0)
    }

    /// How much more this pool will hold before refusing (Block) inflow.
    fn accepts(&self) -> f64 {
        match (self.capacity, self.overflow) {
            (None, _) | (_, OverflowPolicy::Drain) => f64::INFINITY,
            (Some(capacity), OverflowPolicy::Block) => {
                (capacity - self.state.resources).max(0.0)
            }
        }
    }

    /// Run the configured flow action once.
    fn fire(&mut self, ctx: &ProcessContext) -> Vec<Event> {
        match self.action {
            FlowAction::PushAny => {
                let mut events = Vec::new();
                for conn in ctx.outputs_for_port(DEFAULT_OUTPUT_PORT) {
                    let amount = conn.flow_rate.min(self.available());
                    if amount > 0.0 {
                        self.promised += amount;
                        events.push(transfer_along(conn, ctx.time(), amount));
                    }
                }
                events
            }
            FlowAction::PushAll => {
                let outs = ctx.outputs_for_port(DEFAULT_OUTPUT_PORT);
                if outs.is_empty() {
                    return Vec::new();
                }
                let total: f64 = outs.iter().map(|c| c.flow_rate).sum();
                if self.available() < total {
                    return Vec::new();
                }
                let (probe, queries) = Probe::start(
                    &self.id,
                    &outs,
                    false,
                    Payload::CapacityQuery,
                    ctx.time(),
                );
                self.probe = Some(probe);
                queries
            }
            FlowAction::PullAny => ctx
                .inputs_for_port(DEFAULT_INPUT_PORT)
                .iter()
                .map(|conn| pull_request_along(conn, ctx.time()))
                .collect(),
            FlowAction::PullAll => {
                let ins = ctx.inputs_for_port(DEFAULT_INPUT_PORT);
                if ins.is_empty() {
                    return Vec::new();
                }
                let (probe, queries) =
                    Probe::start(&self.id, &ins, true, Payload::SupplyQuery, ctx.time());
                self.probe = Some(probe);
                queries
            }
        }
    }

    /// Resolve a completed all-or-nothing probe into its transfers.
    fn handle_report(&mut self, peer: &str, value: f64, ctx: &ProcessContext) -> Vec<Event> {
        let Some(mut probe) = self.probe.take() else {
            return Vec::new();
        };
        match probe.record(peer, value) {
            None => {
                self.probe = Some(probe);
                Vec::new()
            }
            Some(false) => Vec::new(),
            Some(true) => match self.action {
                FlowAction::PushAll => {
                    let outs = ctx.outputs_for_port(DEFAULT_OUTPUT_PORT);
                    let total: f64 = outs.iter().map(|c| c.flow_rate).sum();
                    if self.available() < total {
                        return Vec::new();
                    }
                    let mut events = Vec::new();
                    for conn in outs {
                        self.promised += conn.flow_rate;
                        events.push(transfer_along(conn, ctx.time(), conn.flow_rate));
                    }
                    events
                }
                FlowAction::PullAll => ctx
                    .inputs_for_port(DEFAULT_INPUT_PORT)
                    .iter()
                    .map(|conn| pull_request_along(conn, ctx.time()))
                    .collect(),
                _ => Vec::new(),
            },
        }
    }

    /// Clip an inbound transfer by capacity and overflow policy and answer
    /// the sender.
    fn receive(&mut self, event: &Event, amount: f64, ctx: &ProcessContext) -> Vec<Event> {
        let room = match self.capacity {
            None => f64::INFINITY,
            Some(capacity) => (capacity - self.state.resources).max(0.0),
        };
        let stored = amount.min(room);
        let (accepted, rejected) = match self.overflow {
            OverflowPolicy::Block => (stored, amount - stored),
            // Drain discards the remainder but the sender sees the full
            // amount as delivered.
            OverflowPolicy::Drain => (amount, 0.0),
        };
        self.state.resources += stored;
        if rejected > 0.0 {
            // Not an error: the refusal travels back in-band, but it is
            // worth a structured log line.
            let refusal = SimulationError::CapacityExceeded {
                pool: self.id.clone(),
                capacity: self.capacity.unwrap_or(f64::INFINITY),
                refused: rejected,
            };
            warn!("{refusal}, returned to '{}'", event.source_id);
        }
        vec![event.reply(Payload::TransferResult { accepted, rejected }, ctx.time())]
    }

    fn on_tick(&mut self, ctx: &ProcessContext) -> Vec<Event> {
        self.probe = None;
        match self.trigger_mode {
            TriggerMode::Automatic => self.fire(ctx),
            _ => Vec::new(),
        }
    }

    fn on_message(&mut self, event: &Event, ctx: &ProcessContext) -> Vec<Event> {
        match &event.payload {
            Payload::Transfer { amount } => self.receive(event, *amount, ctx),
            Payload::TransferResult { accepted, rejected } => {
                self.state.resources -= accepted;
                self.promised = (self.promised - (accepted + rejected)).max(0.0);
                Vec::new()
            }
            Payload::PullRequest { amount } => {
                if !self.trigger_mode.answers_pulls() {
                    return Vec::new();
                }
                let Some(conn) = ctx.output_to(&event.source_id) else {
                    warn!(
                        "pool '{}' pulled by unconnected process '{}'",
                        self.id, event.source_id
                    );
                    return Vec::new();
                };
                let supply = amount.min(self.available());
                if supply <= 0.0 {
                    return Vec::new();
                }
                self.promised += supply;
                vec![transfer_along(conn, ctx.time(), supply)]
            }
            Payload::SupplyQuery => {
                let available = if self.trigger_mode.answers_pulls() {
                    self.available()
                } else {
                    0.0
                };
                vec![event.reply(Payload::SupplyReport { available }, ctx.time())]
            }
            Payload::SupplyReport { available } => {
                self.handle_report(&event.source_id, *available, ctx)
            }
            Payload::CapacityQuery => {
                let accepts = self.accepts();
                vec![event.reply(Payload::CapacityReport { accepts }, ctx.time())]
            }
            Payload::CapacityReport { accepts } => {
                self.handle_report(&event.source_id, *accepts, ctx)
            }
            Payload::Trigger => {
                if self.trigger_mode == TriggerMode::Interactive {
                    self.fire(ctx)
                } else {
                    Vec::new()
                }
            }
            other => {
                debug!("pool '{}' ignoring {:?}", self.id, other.kind());
                Vec::new()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Drain
// ---------------------------------------------------------------------------

/// Consumes resources arriving on its input; has no capacity and never
/// refuses.
#[derive(Debug, Clone, PartialEq)]
pub struct Drain {
    pub(crate) id: String,
    pub(crate) trigger_mode: TriggerMode,
    pub(crate) action: FlowAction,
    pub(crate) state: DrainState,
    probe: Option<Probe>,
}

impl Drain {
    pub(crate) fn new(id: &str, trigger_mode: TriggerMode, action: FlowAction) -> Self {
        Self {
            id: id.to_string(),
            trigger_mode,
            action,
            state: DrainState::default(),
            probe: None,
        }
    }

    fn fire(&mut self, ctx: &ProcessContext) -> Vec<Event> {
        match self.action {
            FlowAction::PullAny => ctx
                .inputs_for_port(DEFAULT_INPUT_PORT)
                .iter()
                .map(|conn| pull_request_along(conn, ctx.time()))
                .collect(),
            FlowAction::PullAll => {
                let ins = ctx.inputs_for_port(DEFAULT_INPUT_PORT);
                if ins.is_empty() {
                    return Vec::new();
                }
                let (probe, queries) =
                    Probe::start(&self.id, &ins, true, Payload::SupplyQuery, ctx.time());
                self.probe = Some(probe);
                queries
            }
            other => {
                debug!("drain '{}' ignoring push action {:?}", self.id, other);
                Vec::new()
            }
        }
    }

    fn on_tick(&mut self, ctx: &ProcessContext) -> Vec<Event> {
        self.probe = None;
        match self.trigger_mode {
            TriggerMode::Automatic => self.fire(ctx),
            _ => Vec::new(),
        }
    }

    fn on_message(&mut self, event: &Event, ctx: &ProcessContext) -> Vec<Event> {
        match &event.payload {
            Payload::Transfer { amount } => {
                self.state.resources_consumed += amount;
                vec![event.reply(
                    Payload::TransferResult {
                        accepted: *amount,
                        rejected: 0.0,
                    },
                    ctx.time(),
                )]
            }
            Payload::SupplyReport { available } => {
                let peer = event.source_id.clone();
                let Some(mut probe) = self.probe.take() else {
                    return Vec::new();
                };
                match probe.record(&peer, *available) {
                    None => {
                        self.probe = Some(probe);
                        Vec::new()
                    }
                    Some(false) => Vec::new(),
                    Some(true) => ctx
                        .inputs_for_port(DEFAULT_INPUT_PORT)
                        .iter()
                        .map(|conn| pull_request_along(conn, ctx.time()))
                        .collect(),
                }
            }
            Payload::SupplyQuery => {
                vec![event.reply(Payload::SupplyReport { available: 0.0 }, ctx.time())]
            }
            Payload::CapacityQuery => {
                vec![event.reply(
                    Payload::CapacityReport {
                        accepts: f64::INFINITY,
                    },
                    ctx.time(),
                )]
            }
            Payload::Trigger => {
                if self.trigger_mode == TriggerMode::Interactive {
                    self.fire(ctx)
                } else {
                    Vec::new()
                }
            }
            other => {
                debug!("drain '{}' ignoring {:?}", self.id, other.kind());
                Vec::new()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Delay
// ---------------------------------------------------------------------------

/// Buffers resources for a time before releasing them downstream. The
/// delay period is the flow rate of the single outgoing connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Delay {
    pub(crate) id: String,
    pub(crate) trigger_mode: TriggerMode,
    pub(crate) mode: DelayMode,
    pub(crate) release_amount: f64,
    pub(crate) state: DelayState,
    /// Queue-mode backlog awaiting release.
    queued: f64,
    /// Whether a queue-mode release timer is already scheduled.
    release_armed: bool,
}

impl Delay {
    pub(crate) fn new(
        id: &str,
        trigger_mode: TriggerMode,
        mode: DelayMode,
        release_amount: f64,
    ) -> Self {
        Self {
            id: id.to_string(),
            trigger_mode,
            mode,
            release_amount,
            state: DelayState::default(),
            queued: 0.0,
            release_armed: false,
        }
    }

    fn on_message(&mut self, event: &Event, ctx: &ProcessContext) -> Vec<Event> {
        match &event.payload {
            Payload::Transfer { amount } => {
                let outs = ctx.outputs_for_port(DEFAULT_OUTPUT_PORT);
                let &[conn] = outs.as_slice() else {
                    warn!(
                        "delay '{}' needs exactly one output connection, has {}; rejecting {}",
                        self.id,
                        outs.len(),
                        amount
                    );
                    return vec![event.reply(
                        Payload::TransferResult {
                            accepted: 0.0,
                            rejected: *amount,
                        },
                        ctx.time(),
                    )];
                };
                let period = conn.flow_rate;
                self.state.resources_received += amount;
                let mut events = vec![event.reply(
                    Payload::TransferResult {
                        accepted: *amount,
                        rejected: 0.0,
                    },
                    ctx.time(),
                )];
                match self.mode {
                    DelayMode::Delay => {
                        events.push(transfer_along(conn, ctx.time() + period, *amount));
                    }
                    DelayMode::Queue => {
                        self.queued += amount;
                        if !self.release_armed {
                            self.release_armed = true;
                            events.push(message(
                                &self.id,
                                &self.id,
                                ctx.time() + period,
                                Payload::Release,
                            ));
                        }
                    }
                }
                events
            }
            Payload::Release => {
                let outs = ctx.outputs_for_port(DEFAULT_OUTPUT_PORT);
                let &[conn] = outs.as_slice() else {
                    warn!(
                        "delay '{}' lost its output connection; discarding {} queued",
                        self.id, self.queued
                    );
                    self.queued = 0.0;
                    self.release_armed = false;
                    return Vec::new();
                };
                let amount = self.release_amount.min(self.queued);
                self.queued -= amount;
                let mut events = Vec::new();
                if amount > 0.0 {
                    events.push(transfer_along(conn, ctx.time(), amount));
                }
                if self.queued > 0.0 {
                    events.push(message(
                        &self.id,
                        &self.id,
                        ctx.time() + conn.flow_rate,
                        Payload::Release,
                    ));
                } else {
                    self.release_armed = false;
                }
                events
            }
            Payload::TransferResult { accepted, rejected } => {
                // A rejected release was refused downstream; it is dropped,
                // and counts as released so the in-flight total stays
                // `received - released`.
                self.state.resources_released += accepted + rejected;
                if *rejected > 0.0 {
                    warn!(
                        "delay '{}' dropped {} refused by '{}'",
                        self.id, rejected, event.source_id
                    );
                }
                Vec::new()
            }
            Payload::SupplyQuery => {
                vec![event.reply(Payload::SupplyReport { available: 0.0 }, ctx.time())]
            }
            Payload::CapacityQuery => {
                vec![event.reply(
                    Payload::CapacityReport {
                        accepts: f64::INFINITY,
                    },
                    ctx.time(),
                )]
            }
            other => {
                debug!("delay '{}' ignoring {:?}", self.id, other.kind());
                Vec::new()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Stepper
// ---------------------------------------------------------------------------

/// The singleton clock process. The kernel reads its `dt` and drives every
/// process's tick directly; the stepper itself only mirrors the step
/// counter and is never connected to anything.
#[derive(Debug, Clone, PartialEq)]
pub struct Stepper {
    pub(crate) id: String,
    pub(crate) dt: f64,
    pub(crate) state: StepperState,
}

impl Stepper {
    pub(crate) fn new(id: &str, dt: f64) -> Self {
        Self {
            id: id.to_string(),
            dt,
            state: StepperState::default(),
        }
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }
}

// ---------------------------------------------------------------------------
// Process
// ---------------------------------------------------------------------------

/// Top-level process enum. Dispatches via enum match (no trait objects).
#[derive(Debug, Clone, PartialEq)]
pub enum Process {
    Source(Source),
    Pool(Pool),
    Drain(Drain),
    Delay(Delay),
    Stepper(Stepper),
}

const NO_PORTS: &[&str] = &[];
const IN_ONLY: &[&str] = &[DEFAULT_INPUT_PORT];
const OUT_ONLY: &[&str] = &[DEFAULT_OUTPUT_PORT];

impl Process {
    pub fn id(&self) -> &str {
        match self {
            Process::Source(p) => &p.id,
            Process::Pool(p) => &p.id,
            Process::Drain(p) => &p.id,
            Process::Delay(p) => &p.id,
            Process::Stepper(p) => &p.id,
        }
    }

    /// Declared input ports, in declaration order.
    pub fn input_ports(&self) -> &'static [&'static str] {
        match self {
            Process::Source(_) => NO_PORTS,
            Process::Pool(_) => IN_ONLY,
            Process::Drain(_) => IN_ONLY,
            Process::Delay(_) => IN_ONLY,
            Process::Stepper(_) => NO_PORTS,
        }
    }

    /// Declared output ports, in declaration order.
    pub fn output_ports(&self) -> &'static [&'static str] {
        match self {
            Process::Source(_) => OUT_ONLY,
            Process::Pool(_) => OUT_ONLY,
            Process::Drain(_) => NO_PORTS,
            Process::Delay(_) => OUT_ONLY,
            Process::Stepper(_) => NO_PORTS,
        }
    }

    /// Variant-tagged copy of this process's state.
    pub fn state(&self) -> ProcessState {
        match self {
            Process::Source(p) => ProcessState::Source(p.state.clone()),
            Process::Pool(p) => ProcessState::Pool(p.state.clone()),
            Process::Drain(p) => ProcessState::Drain(p.state.clone()),
            Process::Delay(p) => ProcessState::Delay(p.state.clone()),
            Process::Stepper(p) => ProcessState::Stepper(p.state.clone()),
        }
    }

    /// Restore internal state to its initial value. The kernel clears the
    /// scheduler and clock around this call.
    pub fn reset(&mut self) {
        match self {
            Process::Source(p) => p.state = SourceState::default(),
            Process::Pool(p) => {
                p.state = PoolState {
                    resources: p.initial_resources,
                };
                p.promised = 0.0;
                p.probe = None;
            }
            Process::Drain(p) => {
                p.state = DrainState::default();
                p.probe = None;
            }
            Process::Delay(p) => {
                p.state = DelayState::default();
                p.queued = 0.0;
                p.release_armed = false;
            }
            Process::Stepper(p) => p.state = StepperState::default(),
        }
    }

    /// Invoked once per stepper tick, in registration order.
    pub fn on_tick(&mut self, ctx: &ProcessContext) -> Vec<Event> {
        match self {
            Process::Source(p) => p.on_tick(ctx),
            Process::Pool(p) => p.on_tick(ctx),
            Process::Drain(p) => p.on_tick(ctx),
            Process::Delay(_) => Vec::new(),
            Process::Stepper(p) => {
                p.state.current_step = ctx.step();
                Vec::new()
            }
        }
    }

    /// Carry runtime state from `previous` into this freshly-built
    /// process. Caller guarantees matching id and kind.
    pub(crate) fn adopt_runtime_state(&mut self, previous: &Process) {
        match (&mut *self, previous) {
            (Process::Source(new), Process::Source(old)) => new.state = old.state.clone(),
            (Process::Pool(new), Process::Pool(old)) => {
                new.state = old.state.clone();
                new.promised = old.promised;
                new.probe = old.probe.clone();
            }
            (Process::Drain(new), Process::Drain(old)) => {
                new.state = old.state.clone();
                new.probe = old.probe.clone();
            }
            (Process::Delay(new), Process::Delay(old)) => {
                new.state = old.state.clone();
                new.queued = old.queued;
                new.release_armed = old.release_armed;
            }
            (Process::Stepper(new), Process::Stepper(old)) => new.state = old.state.clone(),
            _ => {}
        }
    }

    /// Invoked when an inbound event is delivered to this process.
    pub fn on_message(&mut self, event: &Event, ctx: &ProcessContext) -> Vec<Event> {
        match self {
            Process::Source(p) => p.on_message(event, ctx),
            Process::Pool(p) => p.on_message(event, ctx),
            Process::Drain(p) => p.on_message(event, ctx),
            Process::Delay(p) => p.on_message(event, ctx),
            Process::Stepper(p) => {
                debug!("stepper '{}' ignoring {:?}", p.id, event.payload.kind());
                Vec::new()
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::PayloadKind;

    fn make_ctx<'a>(
        inputs: Vec<&'a Connection>,
        outputs: Vec<&'a Connection>,
    ) -> ProcessContext<'a> {
        ProcessContext::new(1.0, 1, inputs, outputs)
    }

    fn transfer_to(target: &str, amount: f64) -> Event {
        Event {
            source_id: "upstream".to_string(),
            source_port: Some("out".to_string()),
            target_id: target.to_string(),
            target_port: Some("in".to_string()),
            time: 1.0,
            payload: Payload::Transfer { amount },
        }
    }

    fn result_to(target: &str, accepted: f64, rejected: f64) -> Event {
        Event {
            source_id: "downstream".to_string(),
            source_port: None,
            target_id: target.to_string(),
            target_port: None,
            time: 1.0,
            payload: Payload::TransferResult { accepted, rejected },
        }
    }

    // -----------------------------------------------------------------------
    // Source tests
    // -----------------------------------------------------------------------

    #[test]
    fn automatic_source_pushes_per_connection() {
        let mut source = Source::new("s", TriggerMode::Automatic);
        let c1 = Connection::new("c1", "s", "a").with_flow_rate(1.0);
        let c2 = Connection::new("c2", "s", "b").with_flow_rate(2.0);
        let ctx = make_ctx(vec![], vec![&c1, &c2]);

        let events = source.on_tick(&ctx);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].payload, Payload::Transfer { amount: 1.0 });
        assert_eq!(events[0].target_id, "a");
        assert_eq!(events[1].payload, Payload::Transfer { amount: 2.0 });
        assert_eq!(events[1].target_id, "b");
        // Nothing is counted until downstream accepts.
        assert_eq!(source.state.resources_produced, 0.0);
    }

    #[test]
    fn source_counts_only_accepted() {
        let mut source = Source::new("s", TriggerMode::Automatic);
        let empty = make_ctx(vec![], vec![]);

        let mut process = Process::Source(source.clone());
        process.on_message(&result_to("s", 3.0, 2.0), &empty);
        assert_eq!(
            process.state().as_source().unwrap().resources_produced,
            3.0
        );

        // Rejected-only result leaves the counter untouched.
        source.on_message(&result_to("s", 0.0, 1.0), &empty);
        assert_eq!(source.state.resources_produced, 0.0);
    }

    #[test]
    fn passive_source_answers_pulls() {
        let mut source = Source::new("s", TriggerMode::Passive);
        let conn = Connection::new("c1", "s", "pool1").with_flow_rate(2.0);
        let ctx = make_ctx(vec![], vec![&conn]);

        assert!(source.on_tick(&ctx).is_empty());

        let pull = Event {
            source_id: "pool1".to_string(),
            source_port: None,
            target_id: "s".to_string(),
            target_port: None,
            time: 1.0,
            payload: Payload::PullRequest { amount: 2.0 },
        };
        let events = source.on_message(&pull, &ctx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload, Payload::Transfer { amount: 2.0 });
        assert_eq!(events[0].target_id, "pool1");
    }

    #[test]
    fn automatic_source_ignores_pulls() {
        let mut source = Source::new("s", TriggerMode::Automatic);
        let conn = Connection::new("c1", "s", "pool1");
        let ctx = make_ctx(vec![], vec![&conn]);

        let pull = Event {
            source_id: "pool1".to_string(),
            source_port: None,
            target_id: "s".to_string(),
            target_port: None,
            time: 1.0,
            payload: Payload::PullRequest { amount: 1.0 },
        };
        assert!(source.on_message(&pull, &ctx).is_empty());
    }

    #[test]
    fn interactive_source_fires_on_trigger() {
        let mut source = Source::new("s", TriggerMode::Interactive);
        let conn = Connection::new("c1", "s", "pool1");
        let ctx = make_ctx(vec![], vec![&conn]);

        assert!(source.on_tick(&ctx).is_empty());

        let trigger = Event {
            source_id: "external".to_string(),
            source_port: None,
            target_id: "s".to_string(),
            target_port: None,
            time: 1.0,
            payload: Payload::Trigger,
        };
        let events = source.on_message(&trigger, &ctx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload.kind(), PayloadKind::Transfer);
    }

    #[test]
    fn enabling_source_behaves_as_passive() {
        let mut source = Source::new("s", TriggerMode::Enabling);
        let conn = Connection::new("c1", "s", "pool1");
        let ctx = make_ctx(vec![], vec![&conn]);

        assert!(source.on_tick(&ctx).is_empty());

        let pull = Event {
            source_id: "pool1".to_string(),
            source_port: None,
            target_id: "s".to_string(),
            target_port: None,
            time: 1.0,
            payload: Payload::PullRequest { amount: 1.0 },
        };
        assert_eq!(source.on_message(&pull, &ctx).len(), 1);
    }

    // -----------------------------------------------------------------------
    // Pool tests
    // -----------------------------------------------------------------------

    fn pool(capacity: Option<f64>, overflow: OverflowPolicy, resources: f64) -> Pool {
        let mut pool = Pool::new(
            "p",
            TriggerMode::Passive,
            FlowAction::PullAny,
            overflow,
            capacity,
            resources,
        );
        pool.state.resources = resources;
        pool
    }

    #[test]
    fn unbounded_pool_accepts_everything() {
        let mut p = pool(None, OverflowPolicy::Block, 0.0);
        let empty = make_ctx(vec![], vec![]);

        let events = p.on_message(&transfer_to("p", 7.5), &empty);
        assert_eq!(p.state.resources, 7.5);
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].payload,
            Payload::TransferResult {
                accepted: 7.5,
                rejected: 0.0
            }
        );
        assert_eq!(events[0].target_id, "upstream");
    }

    #[test]
    fn block_pool_returns_remainder() {
        let mut p = pool(Some(3.0), OverflowPolicy::Block, 2.0);
        let empty = make_ctx(vec![], vec![]);

        let events = p.on_message(&transfer_to("p", 2.0), &empty);
        assert_eq!(p.state.resources, 3.0);
        assert_eq!(
            events[0].payload,
            Payload::TransferResult {
                accepted: 1.0,
                rejected: 1.0
            }
        );
    }

    #[test]
    fn drain_pool_discards_remainder_but_confirms_all() {
        let mut p = pool(Some(3.0), OverflowPolicy::Drain, 2.0);
        let empty = make_ctx(vec![], vec![]);

        let events = p.on_message(&transfer_to("p", 2.0), &empty);
        assert_eq!(p.state.resources, 3.0);
        assert_eq!(
            events[0].payload,
            Payload::TransferResult {
                accepted: 2.0,
                rejected: 0.0
            }
        );
    }

    #[test]
    fn push_any_clamps_to_stock() {
        let mut p = pool(None, OverflowPolicy::Block, 3.0);
        p.trigger_mode = TriggerMode::Automatic;
        p.action = FlowAction::PushAny;
        let c1 = Connection::new("c1", "p", "a").with_flow_rate(2.0);
        let c2 = Connection::new("c2", "p", "b").with_flow_rate(2.0);
        let ctx = make_ctx(vec![], vec![&c1, &c2]);

        let events = p.on_tick(&ctx);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].payload, Payload::Transfer { amount: 2.0 });
        // Second edge only gets what is left after the first promise.
        assert_eq!(events[1].payload, Payload::Transfer { amount: 1.0 });

        // Stock is committed when the results come back.
        assert_eq!(p.state.resources, 3.0);
        let empty_ctx = make_ctx(vec![], vec![]);
        p.on_message(&result_to("p", 2.0, 0.0), &empty_ctx);
        p.on_message(&result_to("p", 1.0, 0.0), &empty_ctx);
        assert_eq!(p.state.resources, 0.0);
        assert_eq!(p.promised, 0.0);
    }

    #[test]
    fn rejected_push_returns_to_stock() {
        let mut p = pool(None, OverflowPolicy::Block, 5.0);
        p.trigger_mode = TriggerMode::Automatic;
        p.action = FlowAction::PushAny;
        let c1 = Connection::new("c1", "p", "a").with_flow_rate(5.0);
        let ctx = make_ctx(vec![], vec![&c1]);

        p.on_tick(&ctx);
        assert_eq!(p.promised, 5.0);

        // Downstream kept 2, refused 3.
        p.on_message(&result_to("p", 2.0, 3.0), &ctx);
        assert_eq!(p.state.resources, 3.0);
        assert_eq!(p.promised, 0.0);
    }

    #[test]
    fn pull_any_requests_per_connection() {
        let mut p = pool(None, OverflowPolicy::Block, 0.0);
        p.trigger_mode = TriggerMode::Automatic;
        p.action = FlowAction::PullAny;
        let c1 = Connection::new("c1", "a", "p").with_flow_rate(1.0);
        let c2 = Connection::new("c2", "b", "p").with_flow_rate(2.0);
        let ctx = make_ctx(vec![&c1, &c2], vec![]);

        let events = p.on_tick(&ctx);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].target_id, "a");
        assert_eq!(events[0].payload, Payload::PullRequest { amount: 1.0 });
        assert_eq!(events[1].target_id, "b");
        assert_eq!(events[1].payload, Payload::PullRequest { amount: 2.0 });
    }

    #[test]
    fn pull_all_probes_then_pulls_when_satisfied() {
        let mut p = pool(None, OverflowPolicy::Block, 0.0);
        p.trigger_mode = TriggerMode::Automatic;
        p.action = FlowAction::PullAll;
        let c1 = Connection::new("c1", "a", "p").with_flow_rate(2.0);
        let c2 = Connection::new("c2", "b", "p").with_flow_rate(3.0);
        let ctx = make_ctx(vec![&c1, &c2], vec![]);

        let queries = p.on_tick(&ctx);
        assert_eq!(queries.len(), 2);
        assert!(queries
            .iter()
            .all(|e| e.payload.kind() == PayloadKind::SupplyQuery));

        let report_a = Event {
            source_id: "a".to_string(),
            source_port: None,
            target_id: "p".to_string(),
            target_port: None,
            time: 1.0,
            payload: Payload::SupplyReport { available: 5.0 },
        };
        assert!(p.on_message(&report_a, &ctx).is_empty());

        let mut report_b = report_a.clone();
        report_b.source_id = "b".to_string();
        report_b.payload = Payload::SupplyReport { available: 3.0 };
        let pulls = p.on_message(&report_b, &ctx);
        assert_eq!(pulls.len(), 2);
        assert!(pulls
            .iter()
            .all(|e| e.payload.kind() == PayloadKind::PullRequest));
    }

    #[test]
    fn pull_all_withholds_on_any_shortfall() {
        let mut p = pool(None, OverflowPolicy::Block, 0.0);
        p.trigger_mode = TriggerMode::Automatic;
        p.action = FlowAction::PullAll;
        let c1 = Connection::new("c1", "a", "p").with_flow_rate(2.0);
        let c2 = Connection::new("c2", "b", "p").with_flow_rate(3.0);
        let ctx = make_ctx(vec![&c1, &c2], vec![]);

        p.on_tick(&ctx);

        let mut report = Event {
            source_id: "a".to_string(),
            source_port: None,
            target_id: "p".to_string(),
            target_port: None,
            time: 1.0,
            payload: Payload::SupplyReport { available: 5.0 },
        };
        p.on_message(&report, &ctx);
        report.source_id = "b".to_string();
        report.payload = Payload::SupplyReport { available: 2.9 };
        assert!(p.on_message(&report, &ctx).is_empty());
    }

    #[test]
    fn push_all_waits_for_capacity_reports() {
        let mut p = pool(None, OverflowPolicy::Block, 10.0);
        p.trigger_mode = TriggerMode::Automatic;
        p.action = FlowAction::PushAll;
        let c1 = Connection::new("c1", "p", "a").with_flow_rate(2.0);
        let c2 = Connection::new("c2", "p", "b").with_flow_rate(3.0);
        let ctx = make_ctx(vec![], vec![&c1, &c2]);

        let queries = p.on_tick(&ctx);
        assert_eq!(queries.len(), 2);
        assert!(queries
            .iter()
            .all(|e| e.payload.kind() == PayloadKind::CapacityQuery));

        let mut report = Event {
            source_id: "a".to_string(),
            source_port: None,
            target_id: "p".to_string(),
            target_port: None,
            time: 1.0,
            payload: Payload::CapacityReport { accepts: 2.0 },
        };
        assert!(p.on_message(&report, &ctx).is_empty());
        report.source_id = "b".to_string();
        report.payload = Payload::CapacityReport {
            accepts: f64::INFINITY,
        };
        let transfers = p.on_message(&report, &ctx);
        assert_eq!(transfers.len(), 2);
        assert_eq!(transfers[0].payload, Payload::Transfer { amount: 2.0 });
        assert_eq!(transfers[1].payload, Payload::Transfer { amount: 3.0 });
        assert_eq!(p.promised, 5.0);
    }

    #[test]
    fn push_all_withholds_when_downstream_blocks() {
        let mut p = pool(None, OverflowPolicy::Block, 10.0);
        p.trigger_mode = TriggerMode::Automatic;
        p.action = FlowAction::PushAll;
        let c1 = Connection::new("c1", "p", "a").with_flow_rate(2.0);
        let ctx = make_ctx(vec![], vec![&c1]);

        p.on_tick(&ctx);
        let report = Event {
            source_id: "a".to_string(),
            source_port: None,
            target_id: "p".to_string(),
            target_port: None,
            time: 1.0,
            payload: Payload::CapacityReport { accepts: 1.5 },
        };
        assert!(p.on_message(&report, &ctx).is_empty());
        assert_eq!(p.promised, 0.0);
        assert_eq!(p.state.resources, 10.0);
    }

    #[test]
    fn push_all_needs_full_stock() {
        let mut p = pool(None, OverflowPolicy::Block, 4.0);
        p.trigger_mode = TriggerMode::Automatic;
        p.action = FlowAction::PushAll;
        let c1 = Connection::new("c1", "p", "a").with_flow_rate(2.0);
        let c2 = Connection::new("c2", "p", "b").with_flow_rate(3.0);
        let ctx = make_ctx(vec![], vec![&c1, &c2]);

        // 4 < 2 + 3: not even probed.
        assert!(p.on_tick(&ctx).is_empty());
    }

    #[test]
    fn passive_pool_supplies_up_to_stock() {
        let mut p = pool(None, OverflowPolicy::Block, 1.5);
        let conn = Connection::new("c1", "p", "drain1").with_flow_rate(2.0);
        let ctx = make_ctx(vec![], vec![&conn]);

        let pull = Event {
            source_id: "drain1".to_string(),
            source_port: None,
            target_id: "p".to_string(),
            target_port: None,
            time: 1.0,
            payload: Payload::PullRequest { amount: 2.0 },
        };
        let events = p.on_message(&pull, &ctx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload, Payload::Transfer { amount: 1.5 });
        assert_eq!(p.promised, 1.5);
    }

    #[test]
    fn capacity_report_reflects_policy() {
        let empty = make_ctx(vec![], vec![]);
        let query = Event {
            source_id: "pusher".to_string(),
            source_port: None,
            target_id: "p".to_string(),
            target_port: None,
            time: 1.0,
            payload: Payload::CapacityQuery,
        };

        let mut blocked = pool(Some(5.0), OverflowPolicy::Block, 3.0);
        let events = blocked.on_message(&query, &empty);
        assert_eq!(events[0].payload, Payload::CapacityReport { accepts: 2.0 });

        let mut draining = pool(Some(5.0), OverflowPolicy::Drain, 3.0);
        let events = draining.on_message(&query, &empty);
        assert_eq!(
            events[0].payload,
            Payload::CapacityReport {
                accepts: f64::INFINITY
            }
        );
    }

    // -----------------------------------------------------------------------
    // Drain tests
    // -----------------------------------------------------------------------

    #[test]
    fn drain_consumes_unconditionally() {
        let mut drain = Drain::new("d", TriggerMode::Automatic, FlowAction::PullAny);
        let empty = make_ctx(vec![], vec![]);

        let events = drain.on_message(&transfer_to("d", 4.0), &empty);
        assert_eq!(drain.state.resources_consumed, 4.0);
        assert_eq!(
            events[0].payload,
            Payload::TransferResult {
                accepted: 4.0,
                rejected: 0.0
            }
        );
    }

    #[test]
    fn automatic_drain_pulls_on_tick() {
        let mut drain = Drain::new("d", TriggerMode::Automatic, FlowAction::PullAny);
        let conn = Connection::new("c1", "pool1", "d").with_flow_rate(1.0);
        let ctx = make_ctx(vec![&conn], vec![]);

        let events = drain.on_tick(&ctx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].target_id, "pool1");
        assert_eq!(events[0].payload, Payload::PullRequest { amount: 1.0 });
    }

    #[test]
    fn drain_ignores_push_actions() {
        let mut drain = Drain::new("d", TriggerMode::Automatic, FlowAction::PushAny);
        let conn = Connection::new("c1", "pool1", "d");
        let ctx = make_ctx(vec![&conn], vec![]);
        assert!(drain.on_tick(&ctx).is_empty());
    }

    // -----------------------------------------------------------------------
    // Delay tests
    // -----------------------------------------------------------------------

    #[test]
    fn delay_schedules_release_one_period_later() {
        let mut delay = Delay::new("dl", TriggerMode::Automatic, DelayMode::Delay, 1.0);
        let out = Connection::new("c1", "dl", "drain1").with_flow_rate(2.0);
        let ctx = make_ctx(vec![], vec![&out]);

        let events = delay.on_message(&transfer_to("dl", 1.0), &ctx);
        assert_eq!(delay.state.resources_received, 1.0);
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0].payload,
            Payload::TransferResult {
                accepted: 1.0,
                rejected: 0.0
            }
        );
        assert_eq!(events[1].payload, Payload::Transfer { amount: 1.0 });
        assert_eq!(events[1].time, 3.0);
        assert_eq!(events[1].target_id, "drain1");
    }

    #[test]
    fn delay_rejects_without_single_output() {
        let mut delay = Delay::new("dl", TriggerMode::Automatic, DelayMode::Delay, 1.0);
        let none = make_ctx(vec![], vec![]);

        let events = delay.on_message(&transfer_to("dl", 2.0), &none);
        assert_eq!(delay.state.resources_received, 0.0);
        assert_eq!(
            events[0].payload,
            Payload::TransferResult {
                accepted: 0.0,
                rejected: 2.0
            }
        );

        let c1 = Connection::new("c1", "dl", "a");
        let c2 = Connection::new("c2", "dl", "b");
        let two = make_ctx(vec![], vec![&c1, &c2]);
        let events = delay.on_message(&transfer_to("dl", 2.0), &two);
        assert_eq!(
            events[0].payload,
            Payload::TransferResult {
                accepted: 0.0,
                rejected: 2.0
            }
        );
    }

    #[test]
    fn queue_arms_one_timer_and_batches() {
        let mut delay = Delay::new("dl", TriggerMode::Automatic, DelayMode::Queue, 3.0);
        let out = Connection::new("c1", "dl", "drain1").with_flow_rate(2.0);
        let ctx = make_ctx(vec![], vec![&out]);

        // First arrival arms the timer.
        let events = delay.on_message(&transfer_to("dl", 1.0), &ctx);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].payload, Payload::Release);
        assert_eq!(events[1].time, 3.0);
        assert_eq!(events[1].target_id, "dl");

        // Second arrival does not arm another.
        let events = delay.on_message(&transfer_to("dl", 1.0), &ctx);
        assert_eq!(events.len(), 1);
        assert_eq!(delay.queued, 2.0);

        // The release emits up to release_amount and disarms when drained.
        let release = Event {
            source_id: "dl".to_string(),
            source_port: None,
            target_id: "dl".to_string(),
            target_port: None,
            time: 3.0,
            payload: Payload::Release,
        };
        let events = delay.on_message(&release, &ctx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload, Payload::Transfer { amount: 2.0 });
        assert_eq!(delay.queued, 0.0);
        assert!(!delay.release_armed);
    }

    #[test]
    fn queue_reschedules_while_backlogged() {
        let mut delay = Delay::new("dl", TriggerMode::Automatic, DelayMode::Queue, 2.0);
        let out = Connection::new("c1", "dl", "drain1").with_flow_rate(1.0);
        let ctx = make_ctx(vec![], vec![&out]);

        delay.on_message(&transfer_to("dl", 5.0), &ctx);
        let release = Event {
            source_id: "dl".to_string(),
            source_port: None,
            target_id: "dl".to_string(),
            target_port: None,
            time: 2.0,
            payload: Payload::Release,
        };
        let events = delay.on_message(&release, &ctx);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].payload, Payload::Transfer { amount: 2.0 });
        assert_eq!(events[1].payload, Payload::Release);
        assert_eq!(delay.queued, 3.0);
        assert!(delay.release_armed);
    }

    #[test]
    fn delay_counts_dropped_releases_as_released() {
        let mut delay = Delay::new("dl", TriggerMode::Automatic, DelayMode::Delay, 1.0);
        let empty = make_ctx(vec![], vec![]);

        delay.on_message(&result_to("dl", 2.0, 1.0), &empty);
        assert_eq!(delay.state.resources_released, 3.0);
    }

    // -----------------------------------------------------------------------
    // Stepper and dispatch tests
    // -----------------------------------------------------------------------

    #[test]
    fn stepper_mirrors_step_counter() {
        let mut process = Process::Stepper(Stepper::new("stepper", 1.0));
        let ctx = ProcessContext::new(4.0, 4, vec![], vec![]);
        assert!(process.on_tick(&ctx).is_empty());
        assert_eq!(process.state().as_stepper().unwrap().current_step, 4);
    }

    #[test]
    fn ports_per_kind() {
        let source = Process::Source(Source::new("s", TriggerMode::Automatic));
        assert!(source.input_ports().is_empty());
        assert_eq!(source.output_ports(), ["out"]);

        let pool = Process::Pool(pool(None, OverflowPolicy::Block, 0.0));
        assert_eq!(pool.input_ports(), ["in"]);
        assert_eq!(pool.output_ports(), ["out"]);

        let drain = Process::Drain(Drain::new("d", TriggerMode::Automatic, FlowAction::PullAny));
        assert_eq!(drain.input_ports(), ["in"]);
        assert!(drain.output_ports().is_empty());

        let stepper = Process::Stepper(Stepper::new("st", 1.0));
        assert!(stepper.input_ports().is_empty());
        assert!(stepper.output_ports().is_empty());
    }

    #[test]
    fn reset_restores_initial_state() {
        let mut p = pool(Some(10.0), OverflowPolicy::Block, 2.0);
        let empty = make_ctx(vec![], vec![]);
        p.on_message(&transfer_to("p", 3.0), &empty);
        assert_eq!(p.state.resources, 5.0);

        let mut process = Process::Pool(p);
        process.reset();
        assert_eq!(process.state().as_pool().unwrap().resources, 2.0);

        let mut delay = Delay::new("dl", TriggerMode::Automatic, DelayMode::Queue, 1.0);
        let out = Connection::new("c1", "dl", "x");
        let dctx = make_ctx(vec![], vec![&out]);
        delay.on_message(&transfer_to("dl", 4.0), &dctx);
        let mut process = Process::Delay(delay);
        process.reset();
        match &process {
            Process::Delay(d) => {
                assert_eq!(d.queued, 0.0);
                assert!(!d.release_armed);
                assert_eq!(d.state.resources_received, 0.0);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn action_names_round_trip() {
        for action in [
            FlowAction::PullAny,
            FlowAction::PullAll,
            FlowAction::PushAny,
            FlowAction::PushAll,
        ] {
            assert_eq!(FlowAction::from_name(action.name()), Some(action));
        }
        for mode in [DelayMode::Delay, DelayMode::Queue] {
            assert_eq!(DelayMode::from_name(mode.name()), Some(mode));
        }
        assert!(FlowAction::from_name("PushSome").is_none());
        assert!(DelayMode::from_name("Buffer").is_none());
    }
}
