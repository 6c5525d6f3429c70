//! Wire-form process and connection records, and their lowering.
//!
//! Records are the structural inputs every surface lowers to: the kernel
//! API takes them, and the declarative loaders (inline DSL, YAML) produce
//! them. Unknown fields are rejected at deserialization; fields that do not
//! belong to a kind are rejected at lowering.

use serde::{Deserialize, Serialize};

use crate::error::SimulationError;
use crate::process::{
    Delay, DelayMode, Drain, FlowAction, OverflowPolicy, Pool, Process, Source, Stepper,
    TriggerMode,
};

// ---------------------------------------------------------------------------
// Process kind
// ---------------------------------------------------------------------------

/// The five built-in process kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessKind {
    Source,
    Pool,
    Drain,
    Delay,
    Stepper,
}

impl std::fmt::Display for ProcessKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProcessKind::Source => "Source",
            ProcessKind::Pool => "Pool",
            ProcessKind::Drain => "Drain",
            ProcessKind::Delay => "Delay",
            ProcessKind::Stepper => "Stepper",
        };
        write!(f, "{name}")
    }
}

// ---------------------------------------------------------------------------
// Wire records
// ---------------------------------------------------------------------------

/// Wire form of a process. Optional fields default per kind; fields that do
/// not apply to the kind are rejected when lowering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ProcessRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ProcessKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_mode: Option<TriggerMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overflow: Option<OverflowPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dt: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_resources: Option<f64>,
}

impl ProcessRecord {
    /// A record with every optional field unset.
    pub fn new(id: &str, kind: ProcessKind) -> Self {
        Self {
            id: id.to_string(),
            kind,
            trigger_mode: None,
            action: None,
            capacity: None,
            overflow: None,
            release_amount: None,
            dt: None,
            initial_resources: None,
        }
    }

    pub fn with_trigger_mode(mut self, trigger_mode: TriggerMode) -> Self {
        self.trigger_mode = Some(trigger_mode);
        self
    }

    pub fn with_action(mut self, action: &str) -> Self {
        self.action = Some(action.to_string());
        self
    }

    pub fn with_capacity(mut self, capacity: f64) -> Self {
        self.capacity = Some(capacity);
        self
    }

    pub fn with_overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = Some(overflow);
        self
    }

    pub fn with_release_amount(mut self, release_amount: f64) -> Self {
        self.release_amount = Some(release_amount);
        self
    }

    pub fn with_dt(mut self, dt: f64) -> Self {
        self.dt = Some(dt);
        self
    }

    pub fn with_initial_resources(mut self, initial_resources: f64) -> Self {
        self.initial_resources = Some(initial_resources);
        self
    }
}

/// Wire form of a connection. Ports default to `out`/`in`, flow rate to
/// 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ConnectionRecord {
    pub id: String,
    #[serde(rename = "sourceID")]
    pub source_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_port: Option<String>,
    #[serde(rename = "targetID")]
    pub target_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_port: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_rate: Option<f64>,
}

impl ConnectionRecord {
    pub fn new(id: &str, source_id: &str, target_id: &str) -> Self {
        Self {
            id: id.to_string(),
            source_id: source_id.to_string(),
            source_port: None,
            target_id: target_id.to_string(),
            target_port: None,
            flow_rate: None,
        }
    }

    pub fn with_ports(mut self, source_port: &str, target_port: &str) -> Self {
        self.source_port = Some(source_port.to_string());
        self.target_port = Some(target_port.to_string());
        self
    }

    pub fn with_flow_rate(mut self, flow_rate: f64) -> Self {
        self.flow_rate = Some(flow_rate);
        self
    }
}

// ---------------------------------------------------------------------------
// Lowering
// ---------------------------------------------------------------------------

fn reject_field(
    record: &ProcessRecord,
    field: &str,
    present: bool,
) -> Result<(), SimulationError> {
    if present {
        Err(SimulationError::InvalidConfig(format!(
            "'{}': {field} is not a {} field",
            record.id, record.kind
        )))
    } else {
        Ok(())
    }
}

fn positive(record: &ProcessRecord, field: &str, value: f64) -> Result<f64, SimulationError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(SimulationError::InvalidConfig(format!(
            "'{}': {field} must be positive and finite, got {value}",
            record.id
        )))
    }
}

fn parse_flow_action(record: &ProcessRecord) -> Result<Option<FlowAction>, SimulationError> {
    match &record.action {
        None => Ok(None),
        Some(name) => FlowAction::from_name(name).map(Some).ok_or_else(|| {
            SimulationError::InvalidConfig(format!(
                "'{}': action '{name}' is not valid for {}",
                record.id, record.kind
            ))
        }),
    }
}

impl Process {
    /// Lower a wire record into a process, validating every field against
    /// the kind.
    pub fn from_record(record: &ProcessRecord) -> Result<Process, SimulationError> {
        if record.id.is_empty() {
            return Err(SimulationError::InvalidConfig(
                "process id must not be empty".to_string(),
            ));
        }
        match record.kind {
            ProcessKind::Source => {
                reject_field(record, "capacity", record.capacity.is_some())?;
                reject_field(record, "overflow", record.overflow.is_some())?;
                reject_field(record, "releaseAmount", record.release_amount.is_some())?;
                reject_field(record, "dt", record.dt.is_some())?;
                reject_field(
                    record,
                    "initialResources",
                    record.initial_resources.is_some(),
                )?;
                match record.action.as_deref() {
                    None | Some("PushAny") => {}
                    Some(other) => {
                        return Err(SimulationError::InvalidConfig(format!(
                            "'{}': action '{other}' is not valid for Source",
                            record.id
                        )))
                    }
                }
                let trigger_mode = record.trigger_mode.unwrap_or(TriggerMode::Automatic);
                Ok(Process::Source(Source::new(&record.id, trigger_mode)))
            }
            ProcessKind::Pool => {
                reject_field(record, "releaseAmount", record.release_amount.is_some())?;
                reject_field(record, "dt", record.dt.is_some())?;
                let trigger_mode = record.trigger_mode.unwrap_or(TriggerMode::Passive);
                let action = parse_flow_action(record)?.unwrap_or(FlowAction::PullAny);
                let overflow = record.overflow.unwrap_or(OverflowPolicy::Block);
                let capacity = match record.capacity {
                    None => None,
                    Some(value) => Some(positive(record, "capacity", value)?),
                };
                let initial_resources = record.initial_resources.unwrap_or(0.0);
                if !initial_resources.is_finite() || initial_resources < 0.0 {
                    return Err(SimulationError::InvalidConfig(format!(
                        "'{}': initialResources must be non-negative, got {initial_resources}",
                        record.id
                    )));
                }
                if let Some(capacity) = capacity {
                    if initial_resources > capacity {
                        return Err(SimulationError::InvalidConfig(format!(
                            "'{}': initialResources {initial_resources} exceeds capacity {capacity}",
                            record.id
                        )));
                    }
                }
                Ok(Process::Pool(Pool::new(
                    &record.id,
                    trigger_mode,
                    action,
                    overflow,
                    capacity,
                    initial_resources,
                )))
            }
            ProcessKind::Drain => {
                reject_field(record, "capacity", record.capacity.is_some())?;
                reject_field(record, "overflow", record.overflow.is_some())?;
                reject_field(record, "releaseAmount", record.release_amount.is_some())?;
                reject_field(record, "dt", record.dt.is_some())?;
                reject_field(
                    record,
                    "initialResources",
                    record.initial_resources.is_some(),
                )?;
                let trigger_mode = record.trigger_mode.unwrap_or(TriggerMode::Automatic);
                // Push actions are accepted by name but ignored at runtime.
                let action = parse_flow_action(record)?.unwrap_or(FlowAction::PullAny);
                Ok(Process::Drain(Drain::new(&record.id, trigger_mode, action)))
            }
            ProcessKind::Delay => {
                reject_field(record, "capacity", record.capacity.is_some())?;
                reject_field(record, "overflow", record.overflow.is_some())?;
                reject_field(record, "dt", record.dt.is_some())?;
                reject_field(
                    record,
                    "initialResources",
                    record.initial_resources.is_some(),
                )?;
                let trigger_mode = record.trigger_mode.unwrap_or(TriggerMode::Automatic);
                let mode = match &record.action {
                    None => DelayMode::Delay,
                    Some(name) => DelayMode::from_name(name).ok_or_else(|| {
                        SimulationError::InvalidConfig(format!(
                            "'{}': action '{name}' is not valid for Delay",
                            record.id
                        ))
                    })?,
                };
                let release_amount = match record.release_amount {
                    None => 1.0,
                    Some(value) => positive(record, "releaseAmount", value)?,
                };
                Ok(Process::Delay(Delay::new(
                    &record.id,
                    trigger_mode,
                    mode,
                    release_amount,
                )))
            }
            ProcessKind::Stepper => {
                reject_field(record, "action", record.action.is_some())?;
                reject_field(record, "capacity", record.capacity.is_some())?;
                reject_field(record, "overflow", record.overflow.is_some())?;
                reject_field(record, "releaseAmount", record.release_amount.is_some())?;
                reject_field(
                    record,
                    "initialResources",
                    record.initial_resources.is_some(),
                )?;
                match record.trigger_mode {
                    None | Some(TriggerMode::Automatic) => {}
                    Some(other) => {
                        return Err(SimulationError::InvalidConfig(format!(
                            "'{}': stepper trigger mode is fixed to Automatic, got {other:?}",
                            record.id
                        )))
                    }
                }
                let dt = match record.dt {
                    None => 1.0,
                    Some(value) => positive(record, "dt", value)?,
                };
                Ok(Process::Stepper(Stepper::new(&record.id, dt)))
            }
        }
    }

    /// The kind tag of this process.
    pub fn kind(&self) -> ProcessKind {
        match self {
            Process::Source(_) => ProcessKind::Source,
            Process::Pool(_) => ProcessKind::Pool,
            Process::Drain(_) => ProcessKind::Drain,
            Process::Delay(_) => ProcessKind::Delay,
            Process::Stepper(_) => ProcessKind::Stepper,
        }
    }

    /// Cloneable configuration: the wire record this process would lower
    /// from.
    pub fn record(&self) -> ProcessRecord {
        match self {
            Process::Source(p) => ProcessRecord::new(&p.id, ProcessKind::Source)
                .with_trigger_mode(p.trigger_mode)
                .with_action("PushAny"),
            Process::Pool(p) => {
                let mut record = ProcessRecord::new(&p.id, ProcessKind::Pool)
                    .with_trigger_mode(p.trigger_mode)
                    .with_action(p.action.name())
                    .with_overflow(p.overflow)
                    .with_initial_resources(p.initial_resources);
                record.capacity = p.capacity;
                record
            }
            Process::Drain(p) => ProcessRecord::new(&p.id, ProcessKind::Drain)
                .with_trigger_mode(p.trigger_mode)
                .with_action(p.action.name()),
            Process::Delay(p) => ProcessRecord::new(&p.id, ProcessKind::Delay)
                .with_trigger_mode(p.trigger_mode)
                .with_action(p.mode.name())
                .with_release_amount(p.release_amount),
            Process::Stepper(p) => {
                ProcessRecord::new(&p.id, ProcessKind::Stepper).with_dt(p.dt)
            }
        }
    }

    /// Apply a configuration update in place, preserving runtime state.
    ///
    /// The record must keep this process's id and kind; a pool refuses a
    /// capacity below its current level rather than clipping.
    pub fn apply_record(&mut self, record: &ProcessRecord) -> Result<(), SimulationError> {
        if record.id != self.id() {
            return Err(SimulationError::InvalidTransition {
                process: self.id().to_string(),
                reason: format!("update must keep id, got '{}'", record.id),
            });
        }
        if record.kind != self.kind() {
            return Err(SimulationError::InvalidTransition {
                process: self.id().to_string(),
                reason: format!(
                    "update must keep kind {}, got {}",
                    self.kind(),
                    record.kind
                ),
            });
        }
        let mut fresh = Process::from_record(record)?;
        if let (Process::Pool(current), Process::Pool(new)) = (&*self, &fresh) {
            if let Some(capacity) = new.capacity {
                if capacity < current.state.resources {
                    return Err(SimulationError::InvalidTransition {
                        process: current.id.clone(),
                        reason: format!(
                            "capacity {capacity} is below current level {}",
                            current.state.resources
                        ),
                    });
                }
            }
        }
        fresh.adopt_runtime_state(self);
        *self = fresh;
        Ok(())
    }
}

// ===========================================================================
// Tests
// ===========================================================================
