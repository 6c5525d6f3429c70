pub mod connection;
pub mod error;
pub mod event;
pub mod process;
pub mod record;
pub mod scheduler;
pub mod sim;
pub mod state;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use connection::Connection;
pub use error::{RunError, SimulationError};
pub use event::{Event, Payload};
pub use process::{
    DelayMode, FlowAction, OverflowPolicy, Process, ProcessContext, TriggerMode,
};
pub use record::{ConnectionRecord, ProcessKind, ProcessRecord};
pub use sim::Simulation;
pub use state::{ProcessState, Snapshot};
