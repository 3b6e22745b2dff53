//! Error types for workflow execution.

use thiserror::Error;
use trellis_host::HostError;
use trellis_template::TemplateError;

/// Errors that abort a workflow run. There is no retry; the first failure
/// ends the run, and state already written stays written.
#[derive(Debug, Error)]
pub enum ExecutionError {
  /// The trigger has no child to execute.
  #[error("workflow trigger has no child node")]
  EmptyWorkflow,

  /// Execution reached a node id that is not in the tree.
  #[error("node not found in workflow: {node_id}")]
  MissingNode { node_id: String },

  /// A tool invocation failed.
  #[error("tool call failed for node '{node_id}'")]
  ToolFailure {
    node_id: String,
    #[source]
    source: HostError,
  },

  /// A converter's code failed or produced malformed output.
  #[error("converter failed for node '{node_id}'")]
  ConverterFailure {
    node_id: String,
    #[source]
    source: HostError,
  },

  /// A condition or boolean node failed to produce a usable branch.
  #[error("condition failed for node '{node_id}': {message}")]
  ConditionFailure { node_id: String, message: String },

  /// A state store operation failed.
  #[error("state operation failed for node '{node_id}'")]
  StateFailure {
    node_id: String,
    #[source]
    source: HostError,
  },

  /// A fixed-input template referenced a missing path. Surfaced unwrapped.
  #[error(transparent)]
  Template(#[from] TemplateError),

  /// The run was cancelled by the caller.
  #[error("workflow execution cancelled")]
  Cancelled,
}
