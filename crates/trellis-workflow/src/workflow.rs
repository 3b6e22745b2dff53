use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;
use crate::node::{CronjobTrigger, Node, validate_cron};

/// A workflow: a titled tree of nodes rooted at a cron trigger.
///
/// The workflow owns its nodes exclusively; all references run parent to
/// child, so the structure is a tree by construction. Mutations go through
/// the builder methods, which preserve the structural invariants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
  pub title: String,
  pub(crate) trigger: Node,
}

impl Workflow {
  /// Create a workflow. The title must be nonempty.
  pub fn new(title: impl Into<String>, trigger: CronjobTrigger) -> Result<Self, WorkflowError> {
    let title = title.into();
    if title.trim().is_empty() {
      return Err(WorkflowError::bad_structure("workflow title is empty"));
    }
    Ok(Self {
      title,
      trigger: Node::CronjobTrigger(trigger),
    })
  }

  /// The root trigger node.
  pub fn trigger(&self) -> &Node {
    &self.trigger
  }

  pub fn trigger_id(&self) -> &str {
    self.trigger.id()
  }

  /// BFS lookup of a node by id, including the trigger.
  pub fn find(&self, id: &str) -> Option<&Node> {
    let mut queue = VecDeque::from([&self.trigger]);
    while let Some(node) = queue.pop_front() {
      if node.id() == id {
        return Some(node);
      }
      queue.extend(node.children());
    }
    None
  }

  /// BFS lookup of the parent of the node with `id`. The trigger has no
  /// parent; an absent id yields `None`.
  pub fn find_parent(&self, id: &str) -> Option<&Node> {
    let mut queue = VecDeque::from([&self.trigger]);
    while let Some(node) = queue.pop_front() {
      if node.children().iter().any(|child| child.id() == id) {
        return Some(node);
      }
      queue.extend(node.children());
    }
    None
  }

  /// All node ids in BFS order, trigger first.
  pub fn node_ids(&self) -> Vec<String> {
    let mut ids = Vec::new();
    let mut queue = VecDeque::from([&self.trigger]);
    while let Some(node) = queue.pop_front() {
      ids.push(node.id().to_string());
      queue.extend(node.children());
    }
    ids
  }

  /// Re-check the invariants of the tree.
  ///
  /// Construction and the builder methods keep these invariants by
  /// themselves; this is the entry point for workflows that arrived through
  /// deserialization.
  pub fn validate(&self) -> Result<(), WorkflowError> {
    if self.title.trim().is_empty() {
      return Err(WorkflowError::bad_structure("workflow title is empty"));
    }
    let Node::CronjobTrigger(trigger) = &self.trigger else {
      return Err(WorkflowError::bad_structure(
        "workflow root must be a cronjob trigger",
      ));
    };
    validate_cron(&trigger.cron)?;

    let mut seen: HashSet<&str> = HashSet::new();
    let mut queue = VecDeque::from([&self.trigger]);
    while let Some(node) = queue.pop_front() {
      if !seen.insert(node.id()) {
        return Err(WorkflowError::bad_structure(format!(
          "duplicate node id: {}",
          node.id()
        )));
      }
      for child in node.children() {
        if matches!(child, Node::CronjobTrigger(_)) {
          return Err(WorkflowError::bad_structure(format!(
            "trigger node '{}' cannot have a parent",
            child.id()
          )));
        }
        queue.push_back(child);
      }
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::node::{ConverterNode, SkipNode};

  fn workflow() -> Workflow {
    Workflow::new("lookup test", CronjobTrigger::new("0 * * * *").unwrap()).unwrap()
  }

  #[test]
  fn rejects_empty_title() {
    let err = Workflow::new("  ", CronjobTrigger::new("0 * * * *").unwrap()).unwrap_err();
    assert!(err.to_string().contains("title"));
  }

  #[test]
  fn find_locates_trigger_and_descendants() {
    let mut wf = workflow();
    wf.add_child(None, Node::Converter(ConverterNode::new("return input;")))
      .unwrap();
    let child_id = wf.trigger().children()[0].id().to_string();

    assert!(wf.find(wf.trigger_id()).is_some());
    assert!(wf.find(&child_id).is_some());
    assert!(wf.find("missing").is_none());
  }

  #[test]
  fn find_parent_of_trigger_is_none() {
    let wf = workflow();
    assert!(wf.find_parent(wf.trigger_id()).is_none());
  }

  #[test]
  fn validate_accepts_built_workflow() {
    let mut wf = workflow();
    wf.add_child(None, Node::Skip(SkipNode::new())).unwrap();
    wf.validate().unwrap();
  }

  #[test]
  fn validate_rejects_duplicate_ids_from_the_wire() {
    let mut wf = workflow();
    wf.add_child(None, Node::Skip(SkipNode::new())).unwrap();
    let mut value = serde_json::to_value(&wf).unwrap();
    let trigger_id = value["trigger"]["id"].clone();
    value["trigger"]["child"]["id"] = trigger_id;

    let wf: Workflow = serde_json::from_value(value).unwrap();
    let err = wf.validate().unwrap_err();
    assert!(err.to_string().contains("duplicate node id"));
  }

  #[test]
  fn validate_rejects_nested_trigger_from_the_wire() {
    let wf = workflow();
    let mut value = serde_json::to_value(&wf).unwrap();
    value["trigger"]["child"] = serde_json::json!({
      "kind": "cronjob-trigger",
      "id": "nested",
      "cron": "0 * * * *"
    });

    let wf: Workflow = serde_json::from_value(value).unwrap();
    let err = wf.validate().unwrap_err();
    assert!(err.to_string().contains("cannot have a parent"));
  }
}
