//! The YAML model surface.
//!
//! Top-level keys `name`, `description`, `processes`, `connections`;
//! processes and connections are the wire-form records, so a YAML document
//! and an equivalent inline DSL model lower to identical kernel inputs.

use crate::{ModelDocument, ModelError};

/// Parse a YAML document into a model.
pub fn from_str(input: &str) -> Result<ModelDocument, ModelError> {
    Ok(serde_yaml::from_str(input)?)
}

/// Serialize a model back to YAML. Round-trips through [`from_str`].
pub fn to_string(document: &ModelDocument) -> Result<String, ModelError> {
    Ok(serde_yaml::to_string(document)?)
}

// ===========================================================================
// Tests
// ===========================================================================
