//! Workflow execution engine.
//!
//! The engine interprets a workflow tree breadth-first, threading each
//! node's output into its successors. Branching nodes ask the code executor
//! which way to go, tool nodes call out through the tool executor, and
//! state nodes read and write the state client. A run is single-threaded
//! and cooperative: one node at a time, suspending only on external calls.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use trellis_host::{CodeExecutor, StateClient, ToolExecutor};
use trellis_template::{Bindings, resolve};
use trellis_workflow::{Node, Workflow};

use crate::error::ExecutionError;
use crate::events::{ExecutionEvent, ExecutionNotifier, NoopNotifier};

/// The workflow execution engine.
///
/// Holds the three collaborators every run dispatches to, plus a notifier
/// for observability. Generic over `N: ExecutionNotifier`; use
/// `Engine::new()` for a default engine with no-op notifications, or
/// `Engine::with_notifier()` to observe events.
pub struct Engine<N: ExecutionNotifier = NoopNotifier> {
  tools: Arc<dyn ToolExecutor>,
  code: Arc<dyn CodeExecutor>,
  state: Arc<dyn StateClient>,
  notifier: N,
}

/// Output and successors of a single node evaluation.
struct Step {
  output: Value,
  successors: Vec<(String, Value)>,
}

impl Engine<NoopNotifier> {
  /// Create an engine with no-op notifications.
  pub fn new(
    tools: Arc<dyn ToolExecutor>,
    code: Arc<dyn CodeExecutor>,
    state: Arc<dyn StateClient>,
  ) -> Self {
    Self::with_notifier(tools, code, state, NoopNotifier)
  }
}

impl<N: ExecutionNotifier> Engine<N> {
  /// Create an engine with a custom notifier.
  pub fn with_notifier(
    tools: Arc<dyn ToolExecutor>,
    code: Arc<dyn CodeExecutor>,
    state: Arc<dyn StateClient>,
    notifier: N,
  ) -> Self {
    Self {
      tools,
      code,
      state,
      notifier,
    }
  }

  /// Execute `workflow` with `user_context` as the initial value.
  ///
  /// Returns the output of the temporally last node that completed. The
  /// workflow is read-only during the run; the engine owns all scratch
  /// state, so concurrent runs only share the injected collaborators.
  pub async fn execute(
    &self,
    workflow: &Workflow,
    user_context: Value,
    cancel: CancellationToken,
  ) -> Result<Value, ExecutionError> {
    let execution_id = uuid::Uuid::new_v4().to_string();

    self.notifier.notify(ExecutionEvent::WorkflowStarted {
      execution_id: execution_id.clone(),
      title: workflow.title.clone(),
    });

    let result = self
      .run(workflow, user_context, &execution_id, &cancel)
      .await;

    match &result {
      Ok(output) => self.notifier.notify(ExecutionEvent::WorkflowCompleted {
        execution_id,
        output: output.clone(),
      }),
      Err(e) => self.notifier.notify(ExecutionEvent::WorkflowFailed {
        execution_id,
        error: e.to_string(),
      }),
    }

    result
  }

  /// Evaluate a single node with the given input, bypassing traversal.
  ///
  /// The payload doubles as the user context; successors are not followed.
  /// Useful for testing one node of a workflow in isolation.
  pub async fn execute_node(
    &self,
    node: &Node,
    payload: Value,
    cancel: CancellationToken,
  ) -> Result<Value, ExecutionError> {
    let step = self
      .evaluate(
        node,
        payload.clone(),
        &payload,
        "",
        &HashMap::new(),
        &HashMap::new(),
        &cancel,
      )
      .await?;
    Ok(step.output)
  }

  async fn run(
    &self,
    workflow: &Workflow,
    user_context: Value,
    execution_id: &str,
    cancel: &CancellationToken,
  ) -> Result<Value, ExecutionError> {
    let trigger_id = workflow.trigger_id().to_string();
    let first = workflow
      .trigger()
      .children()
      .first()
      .map(|child| child.id().to_string())
      .ok_or(ExecutionError::EmptyWorkflow)?;

    let condition_parents = condition_parents(workflow);

    let mut queue: VecDeque<(String, Value)> = VecDeque::new();
    queue.push_back((first, user_context.clone()));

    let mut executed: HashSet<String> = HashSet::new();
    let mut outputs: HashMap<String, Value> = HashMap::new();
    // The trigger counts as executed with the user context as its output,
    // so conditions hanging directly off the root are immediately ready.
    executed.insert(trigger_id.clone());
    outputs.insert(trigger_id.clone(), user_context.clone());

    let mut last_output = Value::Null;
    let mut stalled = 0usize;

    while let Some((node_id, incoming)) = queue.pop_front() {
      if cancel.is_cancelled() {
        return Err(ExecutionError::Cancelled);
      }
      if executed.contains(&node_id) {
        continue;
      }
      let node = workflow
        .find(&node_id)
        .ok_or_else(|| ExecutionError::MissingNode {
          node_id: node_id.clone(),
        })?;

      // A condition waits until every tracked parent has executed. When
      // only permanently blocked conditions remain, the run drains.
      if matches!(node, Node::Condition(_)) {
        let ready = condition_parents
          .get(&node_id)
          .is_none_or(|parents| parents.iter().all(|p| executed.contains(p)));
        if !ready {
          stalled += 1;
          queue.push_back((node_id, incoming));
          if stalled > queue.len() {
            break;
          }
          continue;
        }
      }
      stalled = 0;

      self.notifier.notify(ExecutionEvent::NodeStarted {
        execution_id: execution_id.to_string(),
        node_id: node_id.clone(),
      });

      let step = match self
        .evaluate(
          node,
          incoming,
          &user_context,
          &trigger_id,
          &outputs,
          &condition_parents,
          cancel,
        )
        .await
      {
        Ok(step) => step,
        Err(e) => {
          self.notifier.notify(ExecutionEvent::NodeFailed {
            execution_id: execution_id.to_string(),
            node_id: node_id.clone(),
            error: e.to_string(),
          });
          return Err(e);
        }
      };

      debug!(node_id = %node_id, kind = node.kind(), "node completed");
      executed.insert(node_id.clone());
      outputs.insert(node_id.clone(), step.output.clone());
      last_output = step.output.clone();
      self.notifier.notify(ExecutionEvent::NodeCompleted {
        execution_id: execution_id.to_string(),
        node_id,
        output: step.output,
      });

      for successor in step.successors {
        queue.push_back(successor);
      }
    }

    Ok(last_output)
  }

  async fn evaluate(
    &self,
    node: &Node,
    incoming: Value,
    user_context: &Value,
    trigger_id: &str,
    outputs: &HashMap<String, Value>,
    condition_parents: &HashMap<String, HashSet<String>>,
    cancel: &CancellationToken,
  ) -> Result<Step, ExecutionError> {
    match node {
      // In normal use execution begins at the trigger's child; when a
      // caller starts a run at the trigger itself, it passes through.
      Node::CronjobTrigger(trigger) => {
        let output = if incoming.is_null() {
          json!({"trigger": "executed", "timestamp": unix_millis()})
        } else {
          incoming
        };
        Ok(Step {
          successors: single_successor(trigger.child.as_deref(), &output),
          output,
        })
      }

      Node::Tool(tool) => {
        let output = tokio::select! {
          result = self.tools.invoke(&tool.tool_identifier, incoming) => {
            result.map_err(|e| ExecutionError::ToolFailure {
              node_id: tool.id.clone(),
              source: e,
            })?
          }
          _ = cancel.cancelled() => return Err(ExecutionError::Cancelled),
        };
        Ok(Step {
          successors: single_successor(tool.child.as_deref(), &output),
          output,
        })
      }

      Node::Converter(converter) => {
        let context = json!({
          "input": incoming.clone(),
          "code": converter.code,
          "nodeId": converter.id,
        });
        let output = tokio::select! {
          result = self.code.run(incoming, &converter.code, context) => {
            result.map_err(|e| ExecutionError::ConverterFailure {
              node_id: converter.id.clone(),
              source: e,
            })?
          }
          _ = cancel.cancelled() => return Err(ExecutionError::Cancelled),
        };
        Ok(Step {
          successors: single_successor(converter.child.as_deref(), &output),
          output,
        })
      }

      Node::Condition(condition) => {
        // The code sees the single executed non-trigger parent's output;
        // a condition hanging off the trigger sees the incoming value.
        let parents = condition_parents.get(&condition.id);
        let parent_id = parents
          .and_then(|set| {
            set
              .iter()
              .find(|p| *p != trigger_id && outputs.contains_key(*p))
              .or_else(|| set.iter().find(|p| outputs.contains_key(*p)))
          })
          .cloned()
          .unwrap_or_else(|| trigger_id.to_string());
        let parent_output = outputs.get(&parent_id).cloned().unwrap_or(incoming);

        let code_input = json!({"input": parent_output, "nodeId": parent_id});
        let result = tokio::select! {
          result = self.code.run(code_input, &condition.code, json!({"nodeId": condition.id})) => {
            result.map_err(|e| ExecutionError::ConditionFailure {
              node_id: condition.id.clone(),
              message: e.to_string(),
            })?
          }
          _ = cancel.cancelled() => return Err(ExecutionError::Cancelled),
        };

        match result {
          // Null terminates this path without error.
          Value::Null => Ok(Step {
            output: Value::Null,
            successors: Vec::new(),
          }),
          // The chosen child starts with no incoming value.
          Value::String(child_id) => Ok(Step {
            output: Value::String(child_id.clone()),
            successors: vec![(child_id, Value::Null)],
          }),
          other => Err(ExecutionError::ConditionFailure {
            node_id: condition.id.clone(),
            message: format!("expected a child id or null, got {other}"),
          }),
        }
      }

      Node::Boolean(boolean) => {
        let code_input = json!({"input": incoming.clone()});
        let result = tokio::select! {
          result = self.code.run(code_input, &boolean.code, json!({"nodeId": boolean.id})) => {
            result.map_err(|e| ExecutionError::ConditionFailure {
              node_id: boolean.id.clone(),
              message: e.to_string(),
            })?
          }
          _ = cancel.cancelled() => return Err(ExecutionError::Cancelled),
        };

        let truthy = is_truthy(&result);
        let chosen = if truthy {
          boolean.true_child.as_deref()
        } else {
          boolean.false_child.as_deref()
        };
        // A missing chosen branch terminates the path silently; the
        // branch that does exist receives the incoming value.
        let successors = chosen
          .map(|child| vec![(child.id().to_string(), incoming)])
          .unwrap_or_default();
        Ok(Step {
          output: Value::Bool(truthy),
          successors,
        })
      }

      Node::FixedInput(fixed) => {
        let snapshot = tokio::select! {
          result = self.state.get_all() => {
            result.map_err(|e| ExecutionError::StateFailure {
              node_id: fixed.id.clone(),
              source: e,
            })?
          }
          _ = cancel.cancelled() => return Err(ExecutionError::Cancelled),
        };
        let bindings = Bindings::new(incoming, user_context.clone(), Value::Object(snapshot));
        // Reference errors propagate to the caller unwrapped.
        let output = resolve(&fixed.output, &bindings)?;
        Ok(Step {
          successors: single_successor(fixed.child.as_deref(), &output),
          output,
        })
      }

      Node::UpsertState(upsert) => {
        tokio::select! {
          result = self.state.set(&upsert.key, upsert.value.clone()) => {
            result.map_err(|e| ExecutionError::StateFailure {
              node_id: upsert.id.clone(),
              source: e,
            })?
          }
          _ = cancel.cancelled() => return Err(ExecutionError::Cancelled),
        }
        let output = upsert.value.clone();
        Ok(Step {
          successors: single_successor(upsert.child.as_deref(), &output),
          output,
        })
      }

      // Skip forwards its input and stops propagation down this subtree.
      Node::Skip(_) => Ok(Step {
        output: incoming,
        successors: Vec::new(),
      }),
    }
  }
}

fn single_successor(child: Option<&Node>, output: &Value) -> Vec<(String, Value)> {
  child
    .map(|c| vec![(c.id().to_string(), output.clone())])
    .unwrap_or_default()
}

/// One pass over the tree mapping each condition node to its parent ids,
/// giving O(1) readiness checks during the run.
fn condition_parents(workflow: &Workflow) -> HashMap<String, HashSet<String>> {
  let mut parents: HashMap<String, HashSet<String>> = HashMap::new();
  let mut queue = VecDeque::from([workflow.trigger()]);
  while let Some(node) = queue.pop_front() {
    for child in node.children() {
      if matches!(child, Node::Condition(_)) {
        parents
          .entry(child.id().to_string())
          .or_default()
          .insert(node.id().to_string());
      }
      queue.push_back(child);
    }
  }
  parents
}

/// JS-style truthiness, matching the sandboxed-code heritage of boolean
/// node results.
fn is_truthy(value: &Value) -> bool {
  match value {
    Value::Null => false,
    Value::Bool(b) => *b,
    Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
    Value::String(s) => !s.is_empty(),
    Value::Array(_) | Value::Object(_) => true,
  }
}

fn unix_millis() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_millis() as u64)
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn truthiness_follows_js_coercion() {
    assert!(!is_truthy(&json!(null)));
    assert!(!is_truthy(&json!(false)));
    assert!(!is_truthy(&json!(0)));
    assert!(!is_truthy(&json!("")));
    assert!(is_truthy(&json!(true)));
    assert!(is_truthy(&json!(1)));
    assert!(is_truthy(&json!("no")));
    assert!(is_truthy(&json!({})));
    assert!(is_truthy(&json!([])));
  }
}
