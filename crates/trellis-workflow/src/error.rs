use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
  /// A structural invariant of the tree was violated.
  #[error("invalid workflow structure: {detail}")]
  BadStructure { detail: String },

  /// An operation referenced a node id that is not in the tree.
  #[error("node not found: {node_id}")]
  NodeNotFound { node_id: String },

  /// The trigger's cron expression did not parse as a 5-field schedule.
  #[error("invalid cron expression '{expression}': {message}")]
  InvalidCron { expression: String, message: String },
}

impl WorkflowError {
  pub(crate) fn bad_structure(detail: impl Into<String>) -> Self {
    Self::BadStructure {
      detail: detail.into(),
    }
  }

  pub(crate) fn not_found(node_id: impl Into<String>) -> Self {
    Self::NodeNotFound {
      node_id: node_id.into(),
    }
  }
}
