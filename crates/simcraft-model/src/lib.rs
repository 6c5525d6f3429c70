//! Declarative model surfaces.
//!
//! Two surfaces, one lowering: the inline block DSL ([`dsl`]) and the YAML
//! document form ([`yaml`]) both produce a [`ModelDocument`] of wire-form
//! records, which is exactly what the kernel accepts. Equivalent models
//! produce identical records through either surface.

pub mod dsl;
pub mod yaml;

use serde::{Deserialize, Serialize};

use simcraft_core::{ConnectionRecord, ProcessRecord, Simulation, SimulationError};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors from the declarative surfaces.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// The inline DSL was rejected.
    #[error("parse error at line {line}, column {column}: {message}")]
    Parse {
        line: usize,
        column: usize,
        message: String,
    },

    /// The YAML document was rejected.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The records were structurally valid but the kernel refused them.
    #[error(transparent)]
    Simulation(#[from] SimulationError),
}

// ---------------------------------------------------------------------------
// Model document
// ---------------------------------------------------------------------------

/// A parsed model: wire-form records plus optional metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ModelDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub processes: Vec<ProcessRecord>,
    #[serde(default)]
    pub connections: Vec<ConnectionRecord>,
}

impl ModelDocument {
    /// Lower the document into a ready simulation.
    pub fn build(&self) -> Result<Simulation, ModelError> {
        Ok(Simulation::from_records(
            &self.processes,
            &self.connections,
        )?)
    }
}
