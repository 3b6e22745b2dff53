use thiserror::Error;

use crate::registry::RegistryError;

/// One error class per compile stage. Stages short-circuit, so a single
/// compilation reports exactly one class, carrying every issue found within
/// that stage.
#[derive(Debug, Error)]
pub enum CompileError {
  /// The tree violates a structural invariant.
  #[error("invalid workflow structure: {detail}")]
  BadStructure { detail: String },

  /// One or more tool identifiers are not registered.
  #[error("unknown tools: {}", missing_tools.join(", "))]
  ToolsMissing { missing_tools: Vec<String> },

  /// One or more tool-to-tool edges have incompatible schemas.
  #[error("incompatible schemas: {}", errors.join("; "))]
  SchemaMismatch {
    errors: Vec<String>,
    suggestions: Vec<String>,
  },

  /// The registry itself failed.
  #[error(transparent)]
  Registry(#[from] RegistryError),
}
