use thiserror::Error;

/// Failures raised by tool, code, and state collaborators.
#[derive(Debug, Error)]
pub enum HostError {
  /// No tool is registered under the identifier.
  #[error("unknown tool: {0}")]
  UnknownTool(String),

  /// The tool ran and reported a failure.
  #[error("tool call failed: {0}")]
  Tool(String),

  /// The sandboxed code raised or returned malformed output.
  #[error("code execution failed: {0}")]
  Code(String),

  /// A state store operation failed.
  #[error("state operation failed: {0}")]
  State(String),

  /// The host cannot perform the requested operation at all.
  #[error("unsupported operation: {0}")]
  Unsupported(String),
}
