//! Workflow runner with channel-based triggering.
//!
//! The `WorkflowRunner` owns an mpsc channel of user-context payloads and
//! executes its workflow once per payload. External dispatchers (a cron
//! scheduler, an on-demand API) only need the sender handle.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use trellis_workflow::Workflow;

use crate::engine::Engine;
use crate::error::ExecutionError;
use crate::events::{ExecutionNotifier, NoopNotifier};

/// Runs a workflow in response to trigger payloads.
pub struct WorkflowRunner<N: ExecutionNotifier = NoopNotifier> {
  sender: mpsc::Sender<serde_json::Value>,
  receiver: mpsc::Receiver<serde_json::Value>,
  workflow: Workflow,
  engine: Arc<Engine<N>>,
}

impl WorkflowRunner<NoopNotifier> {
  /// Create a runner with no-op notifications and the default buffer.
  pub fn new(workflow: Workflow, engine: Arc<Engine<NoopNotifier>>) -> Self {
    Self::with_buffer_size(workflow, engine, 100)
  }
}

impl<N: ExecutionNotifier> WorkflowRunner<N> {
  /// Create a runner with a custom trigger buffer size.
  pub fn with_buffer_size(
    workflow: Workflow,
    engine: Arc<Engine<N>>,
    buffer_size: usize,
  ) -> Self {
    let (sender, receiver) = mpsc::channel(buffer_size);
    Self {
      sender,
      receiver,
      workflow,
      engine,
    }
  }

  /// A sender handle for dispatching runs.
  pub fn sender(&self) -> mpsc::Sender<serde_json::Value> {
    self.sender.clone()
  }

  /// Queue a run with the given user context.
  pub async fn dispatch(&self, user_context: serde_json::Value) -> Result<(), ExecutionError> {
    self
      .sender
      .send(user_context)
      .await
      .map_err(|_| ExecutionError::Cancelled)
  }

  /// Run the dispatch loop until cancellation or channel closure.
  ///
  /// Each received payload executes the workflow once; a failed run is
  /// logged and the loop keeps serving later dispatches.
  pub async fn start(mut self, cancel: CancellationToken) -> Result<(), ExecutionError> {
    info!(title = %self.workflow.title, "starting workflow runner");

    loop {
      tokio::select! {
        _ = cancel.cancelled() => {
          info!(title = %self.workflow.title, "workflow runner cancelled");
          break;
        }
        payload = self.receiver.recv() => {
          match payload {
            Some(user_context) => {
              let exec_cancel = cancel.child_token();
              match self.engine.execute(&self.workflow, user_context, exec_cancel).await {
                Ok(output) => {
                  info!(title = %self.workflow.title, %output, "workflow run completed");
                }
                Err(ExecutionError::Cancelled) => {
                  info!(title = %self.workflow.title, "workflow run cancelled");
                }
                Err(e) => {
                  error!(title = %self.workflow.title, error = %e, "workflow run failed");
                }
              }
            }
            None => {
              info!(title = %self.workflow.title, "workflow runner channel closed");
              break;
            }
          }
        }
      }
    }

    Ok(())
  }

  /// Execute a single run without the loop. Useful for tests and one-shot
  /// invocations.
  pub async fn execute_once(
    &self,
    user_context: serde_json::Value,
    cancel: CancellationToken,
  ) -> Result<serde_json::Value, ExecutionError> {
    self.engine.execute(&self.workflow, user_context, cancel).await
  }

  pub fn workflow(&self) -> &Workflow {
    &self.workflow
  }

  pub fn engine(&self) -> &Engine<N> {
    &self.engine
  }
}
