//! Execution events and notifiers for observability.
//!
//! Events are emitted during workflow execution so consumers can observe
//! progress, persist history, or stream to UIs. The engine itself only
//! calls [`ExecutionNotifier::notify`]; what happens next is up to the
//! implementation.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Events emitted during a workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExecutionEvent {
  /// A run has started.
  WorkflowStarted {
    execution_id: String,
    title: String,
  },

  /// A node has started executing.
  NodeStarted {
    execution_id: String,
    node_id: String,
  },

  /// A node has completed successfully.
  NodeCompleted {
    execution_id: String,
    node_id: String,
    output: serde_json::Value,
  },

  /// A node has failed, aborting the run.
  NodeFailed {
    execution_id: String,
    node_id: String,
    error: String,
  },

  /// The run completed; `output` is the last node's output.
  WorkflowCompleted {
    execution_id: String,
    output: serde_json::Value,
  },

  /// The run failed.
  WorkflowFailed { execution_id: String, error: String },
}

/// Trait for receiving execution events.
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, event: ExecutionEvent);
}

/// A no-op notifier that discards all events.
///
/// Useful for tests or when event observation is not needed.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ExecutionEvent) {
    // Intentionally empty
  }
}

/// A notifier that sends events to an unbounded channel.
///
/// The channel is unbounded so a slow consumer never blocks the engine; the
/// event volume is one per node start/completion, so growth stays small.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
    Self { sender }
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: ExecutionEvent) {
    // Ignore send errors, the receiver may have been dropped
    let _ = self.sender.send(event);
  }
}
