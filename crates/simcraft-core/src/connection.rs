//! Weighted directed connections and the kernel's connection table.
//!
//! Connections are a lookup structure, not stateful entities: they name two
//! process ports and carry a flow rate whose meaning depends on the
//! endpoints (an amount per tick for most edges, a delay duration for the
//! output of a delay). The table keeps insertion order everywhere the
//! simulation can observe it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::SimulationError;
use crate::record::ConnectionRecord;

/// Default output port name.
pub const DEFAULT_OUTPUT_PORT: &str = "out";
/// Default input port name.
pub const DEFAULT_INPUT_PORT: &str = "in";

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// A directed, weighted edge between two process ports.
///
/// Normalized form: ports are concrete strings (wire-form omissions default
/// to `out`/`in`) and `flow_rate` is positive and finite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: String,
    pub source_id: String,
    pub source_port: String,
    pub target_id: String,
    pub target_port: String,
    pub flow_rate: f64,
}

impl Connection {
    /// A connection on the default ports with flow rate 1.0.
    pub fn new(id: &str, source_id: &str, target_id: &str) -> Self {
        Self {
            id: id.to_string(),
            source_id: source_id.to_string(),
            source_port: DEFAULT_OUTPUT_PORT.to_string(),
            target_id: target_id.to_string(),
            target_port: DEFAULT_INPUT_PORT.to_string(),
            flow_rate: 1.0,
        }
    }

    pub fn with_flow_rate(mut self, flow_rate: f64) -> Self {
        self.flow_rate = flow_rate;
        self
    }

    pub fn with_ports(mut self, source_port: &str, target_port: &str) -> Self {
        self.source_port = source_port.to_string();
        self.target_port = target_port.to_string();
        self
    }

    /// Normalize a wire-form record, validating the flow rate.
    pub fn from_record(record: &ConnectionRecord) -> Result<Self, SimulationError> {
        let flow_rate = record.flow_rate.unwrap_or(1.0);
        if !flow_rate.is_finite() || flow_rate <= 0.0 {
            return Err(SimulationError::InvalidConfig(format!(
                "connection '{}' flow rate must be positive and finite, got {flow_rate}",
                record.id
            )));
        }
        Ok(Self {
            id: record.id.clone(),
            source_id: record.source_id.clone(),
            source_port: record
                .source_port
                .clone()
                .unwrap_or_else(|| DEFAULT_OUTPUT_PORT.to_string()),
            target_id: record.target_id.clone(),
            target_port: record
                .target_port
                .clone()
                .unwrap_or_else(|| DEFAULT_INPUT_PORT.to_string()),
            flow_rate,
        })
    }

    /// The wire-form record for this connection.
    pub fn record(&self) -> ConnectionRecord {
        ConnectionRecord {
            id: self.id.clone(),
            source_id: self.source_id.clone(),
            source_port: Some(self.source_port.clone()),
            target_id: self.target_id.clone(),
            target_port: Some(self.target_port.clone()),
            flow_rate: Some(self.flow_rate),
        }
    }
}

// ---------------------------------------------------------------------------
// ConnectionTable
// ---------------------------------------------------------------------------

/// Insertion-ordered connection store with adjacency indices.
///
/// Every iteration surface walks the underlying `Vec`; the hash maps are
/// lookup indices only, so no simulation-facing order ever depends on hash
/// iteration.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTable {
    connections: Vec<Connection>,
    index: HashMap<String, usize>,
    outgoing: HashMap<String, Vec<usize>>,
    incoming: HashMap<String, Vec<usize>>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a connection. Fails on a duplicate id without mutating.
    pub fn insert(&mut self, connection: Connection) -> Result<(), SimulationError> {
        if self.index.contains_key(&connection.id) {
            return Err(SimulationError::DuplicateId(connection.id));
        }
        self.connections.push(connection);
        self.rebuild();
        Ok(())
    }

    /// Remove a connection by id, returning it.
    pub fn remove(&mut self, id: &str) -> Result<Connection, SimulationError> {
        let position = *self
            .index
            .get(id)
            .ok_or_else(|| SimulationError::UnknownId(id.to_string()))?;
        let removed = self.connections.remove(position);
        self.rebuild();
        Ok(removed)
    }

    /// Replace a connection in place, keeping its position in table order.
    pub fn update(&mut self, id: &str, connection: Connection) -> Result<(), SimulationError> {
        if connection.id != id {
            return Err(SimulationError::InvalidConfig(format!(
                "connection update must keep id '{id}', got '{}'",
                connection.id
            )));
        }
        let position = *self
            .index
            .get(id)
            .ok_or_else(|| SimulationError::UnknownId(id.to_string()))?;
        self.connections[position] = connection;
        self.rebuild();
        Ok(())
    }

    /// Drop every connection referencing the given process id, returning the
    /// removed connections in table order.
    pub fn remove_referencing(&mut self, process_id: &str) -> Vec<Connection> {
        let mut removed = Vec::new();
        self.connections.retain(|c| {
            if c.source_id == process_id || c.target_id == process_id {
                removed.push(c.clone());
                false
            } else {
                true
            }
        });
        if !removed.is_empty() {
            self.rebuild();
        }
        removed
    }

    pub fn get(&self, id: &str) -> Option<&Connection> {
        self.index.get(id).map(|&i| &self.connections[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// All connections in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.connections.iter()
    }

    /// Connections whose source is the given process, in table order.
    pub fn outgoing_of(&self, process_id: &str) -> Vec<&Connection> {
        self.outgoing
            .get(process_id)
            .map(|positions| positions.iter().map(|&i| &self.connections[i]).collect())
            .unwrap_or_default()
    }

    /// Connections whose target is the given process, in table order.
    pub fn incoming_of(&self, process_id: &str) -> Vec<&Connection> {
        self.incoming
            .get(process_id)
            .map(|positions| positions.iter().map(|&i| &self.connections[i]).collect())
            .unwrap_or_default()
    }

    /// Recompute the id and adjacency indices from the connection list.
    fn rebuild(&mut self) {
        self.index.clear();
        self.outgoing.clear();
        self.incoming.clear();
        for (position, connection) in self.connections.iter().enumerate() {
            self.index.insert(connection.id.clone(), position);
            self.outgoing
                .entry(connection.source_id.clone())
                .or_default()
                .push(position);
            self.incoming
                .entry(connection.target_id.clone())
                .or_default()
                .push(position);
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
