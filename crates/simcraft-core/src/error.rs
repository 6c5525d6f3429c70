use crate::event::Event;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Which side of a process a port belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    Input,
    Output,
}

impl std::fmt::Display for PortDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortDirection::Input => write!(f, "input"),
            PortDirection::Output => write!(f, "output"),
        }
    }
}

/// Errors surfaced by the simulation kernel.
///
/// Structural-edit errors are returned without mutating kernel state. A
/// failing `step()` is rolled back before the error is returned, so the
/// simulation is always left at a step boundary.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimulationError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("duplicate id '{0}'")]
    DuplicateId(String),

    #[error("unknown id '{0}'")]
    UnknownId(String),

    #[error("process '{process}' has no {direction} port '{port}'")]
    PortUnknown {
        process: String,
        port: String,
        direction: PortDirection,
    },

    #[error("pool '{pool}' at capacity {capacity} refused {refused} resources")]
    CapacityExceeded {
        pool: String,
        capacity: f64,
        refused: f64,
    },

    #[error("process '{process}' rejected configuration update: {reason}")]
    InvalidTransition { process: String, reason: String },

    #[error("per-step event budget of {budget} exhausted at time {time}")]
    CascadeOverflow { budget: usize, time: f64 },
}

// ---------------------------------------------------------------------------
// Multi-step failure
// ---------------------------------------------------------------------------

/// Failure of a `step_n` / `step_until` run.
///
/// The steps that completed stayed applied and their delivered events are
/// returned here; the failing step itself was rolled back, so the run can be
/// resumed after the cause is fixed.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct RunError {
    /// Events delivered by the steps that completed before the failure.
    pub delivered: Vec<Event>,
    #[source]
    pub error: SimulationError,
}
