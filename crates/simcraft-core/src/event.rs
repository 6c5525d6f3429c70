//! Event records exchanged between processes.
//!
//! An [`Event`] is a value: the kernel moves them between processes but
//! never interprets the payload beyond routing. Resource flow is a
//! two-message handshake — a [`Payload::Transfer`] downstream answered by a
//! [`Payload::TransferResult`] upstream — so that senders only commit their
//! cumulative counters to amounts the receiver actually kept.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// What a message means to its receiver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Payload {
    /// A resource transfer along a connection.
    Transfer { amount: f64 },

    /// In-band outcome of a transfer: what the receiver kept and what it
    /// refused. Refusals are not errors; the sender treats the rejected
    /// remainder as never having left.
    TransferResult { accepted: f64, rejected: f64 },

    /// Receiver-initiated request for up to `amount` resources. Answered
    /// only by processes in a passive trigger mode.
    PullRequest { amount: f64 },

    /// Probe preceding an all-or-nothing pull: how much could the receiver
    /// of this query supply this tick?
    SupplyQuery,

    /// Answer to a [`Payload::SupplyQuery`].
    SupplyReport { available: f64 },

    /// Probe preceding an all-or-nothing push: how much more could the
    /// receiver of this query accept this tick?
    CapacityQuery,

    /// Answer to a [`Payload::CapacityQuery`].
    CapacityReport { accepts: f64 },

    /// Self-addressed timer driving the batched releases of a queueing
    /// delay.
    Release,

    /// External command firing an `Interactive` process once.
    Trigger,
}

/// Discriminant tag for payloads, used for filtering and assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    Transfer,
    TransferResult,
    PullRequest,
    SupplyQuery,
    SupplyReport,
    CapacityQuery,
    CapacityReport,
    Release,
    Trigger,
}

impl Payload {
    /// Get the discriminant kind for this payload.
    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::Transfer { .. } => PayloadKind::Transfer,
            Payload::TransferResult { .. } => PayloadKind::TransferResult,
            Payload::PullRequest { .. } => PayloadKind::PullRequest,
            Payload::SupplyQuery => PayloadKind::SupplyQuery,
            Payload::SupplyReport { .. } => PayloadKind::SupplyReport,
            Payload::CapacityQuery => PayloadKind::CapacityQuery,
            Payload::CapacityReport { .. } => PayloadKind::CapacityReport,
            Payload::Release => PayloadKind::Release,
            Payload::Trigger => PayloadKind::Trigger,
        }
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A message between two processes at a simulated time.
///
/// Ports are `None` for replies and kernel-injected events; the kernel only
/// validates a target port when one is named.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub source_id: String,
    pub source_port: Option<String>,
    pub target_id: String,
    pub target_port: Option<String>,
    pub time: f64,
    pub payload: Payload,
}

impl Event {
    /// A portless reply to this event's sender, at the given time.
    pub fn reply(&self, payload: Payload, time: f64) -> Event {
        Event {
            source_id: self.target_id.clone(),
            source_port: None,
            target_id: self.source_id.clone(),
            target_port: None,
            time,
            payload,
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
