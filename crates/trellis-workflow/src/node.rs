use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;

/// A node in a workflow tree.
///
/// Nodes are a tagged union discriminated by `kind` on the wire. Connectivity
/// is encoded in the variants: most kinds carry a single optional child,
/// conditions carry an ordered child list, booleans carry two named branches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Node {
  /// Root of the tree; holds the cron schedule. Never has a parent.
  CronjobTrigger(CronjobTrigger),
  /// Invokes an externally registered tool by identifier.
  Tool(ToolNode),
  /// Sandboxed code transform of the incoming value.
  Converter(ConverterNode),
  /// Branching node whose code returns the id of the child to run next.
  Condition(ConditionNode),
  /// Binary branching node whose code returns a boolean.
  Boolean(BooleanNode),
  /// Emits a constant-shaped value with template expressions expanded.
  FixedInput(FixedInputNode),
  /// Writes a key/value pair into the state store.
  UpsertState(UpsertStateNode),
  /// Forwards its input and terminates the branch.
  Skip(SkipNode),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronjobTrigger {
  pub id: String,
  /// 5-field cron expression: minute, hour, day-of-month, month, day-of-week.
  pub cron: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub child: Option<Box<Node>>,
}

impl CronjobTrigger {
  /// Create a trigger with a fresh id, rejecting invalid cron expressions.
  pub fn new(cron: impl Into<String>) -> Result<Self, WorkflowError> {
    let cron = cron.into();
    validate_cron(&cron)?;
    Ok(Self {
      id: fresh_id(),
      cron,
      child: None,
    })
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolNode {
  pub id: String,
  pub tool_identifier: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  /// JSON Schema fragment describing the tool's input.
  pub input_schema: serde_json::Value,
  /// JSON Schema fragment describing the tool's output.
  pub output_schema: serde_json::Value,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub child: Option<Box<Node>>,
}

impl ToolNode {
  pub fn new(
    tool_identifier: impl Into<String>,
    input_schema: serde_json::Value,
    output_schema: serde_json::Value,
  ) -> Self {
    Self {
      id: fresh_id(),
      tool_identifier: tool_identifier.into(),
      description: None,
      input_schema,
      output_schema,
      child: None,
    }
  }

  pub fn with_description(mut self, description: impl Into<String>) -> Self {
    self.description = Some(description.into());
    self
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConverterNode {
  pub id: String,
  #[serde(default = "default_runtime")]
  pub runtime: String,
  /// Body of `handle({input, context, state})`, run by the code executor.
  pub code: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub child: Option<Box<Node>>,
}

impl ConverterNode {
  pub fn new(code: impl Into<String>) -> Self {
    Self {
      id: fresh_id(),
      runtime: default_runtime(),
      code: code.into(),
      child: None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionNode {
  pub id: String,
  #[serde(default = "default_runtime")]
  pub runtime: String,
  /// Returns the id of the child to execute next, or null to terminate.
  pub code: String,
  #[serde(default)]
  pub children: Vec<Node>,
}

impl ConditionNode {
  pub fn new(code: impl Into<String>) -> Self {
    Self {
      id: fresh_id(),
      runtime: default_runtime(),
      code: code.into(),
      children: Vec::new(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BooleanNode {
  pub id: String,
  #[serde(default = "default_runtime")]
  pub runtime: String,
  /// Returns a boolean selecting the true or false branch.
  pub code: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub true_child: Option<Box<Node>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub false_child: Option<Box<Node>>,
}

impl BooleanNode {
  pub fn new(code: impl Into<String>) -> Self {
    Self {
      id: fresh_id(),
      runtime: default_runtime(),
      code: code.into(),
      true_child: None,
      false_child: None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixedInputNode {
  pub id: String,
  /// Arbitrary JSON whose string leaves may carry template expressions.
  pub output: serde_json::Value,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub child: Option<Box<Node>>,
}

impl FixedInputNode {
  pub fn new(output: serde_json::Value) -> Self {
    Self {
      id: fresh_id(),
      output,
      child: None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertStateNode {
  pub id: String,
  pub key: String,
  pub value: serde_json::Value,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub child: Option<Box<Node>>,
}

impl UpsertStateNode {
  pub fn new(key: impl Into<String>, value: serde_json::Value) -> Self {
    Self {
      id: fresh_id(),
      key: key.into(),
      value,
      child: None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkipNode {
  pub id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub child: Option<Box<Node>>,
}

impl SkipNode {
  pub fn new() -> Self {
    Self {
      id: fresh_id(),
      child: None,
    }
  }
}

impl Default for SkipNode {
  fn default() -> Self {
    Self::new()
  }
}

/// Shape of a node's outgoing child slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
  /// At most one child.
  Single,
  /// An ordered list of children.
  List,
  /// Named true/false branches, either may be absent.
  Pair,
}

/// Position of a child under its parent, used to reattach at the same spot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChildPos {
  Single,
  List(usize),
  TrueBranch,
  FalseBranch,
}

/// The detached contents of a node's child slot.
#[derive(Debug)]
pub(crate) enum Slot {
  Single(Option<Box<Node>>),
  List(Vec<Node>),
  Pair {
    on_true: Option<Box<Node>>,
    on_false: Option<Box<Node>>,
  },
}

impl Slot {
  fn len(&self) -> usize {
    match self {
      Slot::Single(child) => usize::from(child.is_some()),
      Slot::List(children) => children.len(),
      Slot::Pair { on_true, on_false } => {
        usize::from(on_true.is_some()) + usize::from(on_false.is_some())
      }
    }
  }

  fn has_false_branch(&self) -> bool {
    matches!(self, Slot::Pair { on_false: Some(_), .. })
  }

  /// Whether this slot's contents can move losslessly into a slot of `kind`.
  ///
  /// Conversions are restricted so that moving a slot into another shape and
  /// back always restores the original (swap stays an involution): a false
  /// branch never survives a shape change, and a list of two or more only
  /// fits another list.
  pub(crate) fn fits(&self, kind: SlotKind) -> bool {
    match kind {
      SlotKind::Single => self.len() <= 1 && !self.has_false_branch(),
      SlotKind::List => !self.has_false_branch(),
      SlotKind::Pair => match self {
        Slot::Pair { .. } | Slot::Single(_) => true,
        Slot::List(children) => children.len() <= 1,
      },
    }
  }
}

impl Node {
  pub fn id(&self) -> &str {
    match self {
      Node::CronjobTrigger(n) => &n.id,
      Node::Tool(n) => &n.id,
      Node::Converter(n) => &n.id,
      Node::Condition(n) => &n.id,
      Node::Boolean(n) => &n.id,
      Node::FixedInput(n) => &n.id,
      Node::UpsertState(n) => &n.id,
      Node::Skip(n) => &n.id,
    }
  }

  /// The wire tag for this kind.
  pub fn kind(&self) -> &'static str {
    match self {
      Node::CronjobTrigger(_) => "cronjob-trigger",
      Node::Tool(_) => "tool",
      Node::Converter(_) => "converter",
      Node::Condition(_) => "condition",
      Node::Boolean(_) => "boolean",
      Node::FixedInput(_) => "fixed-input",
      Node::UpsertState(_) => "upsert-state",
      Node::Skip(_) => "skip",
    }
  }

  pub fn slot_kind(&self) -> SlotKind {
    match self {
      Node::Condition(_) => SlotKind::List,
      Node::Boolean(_) => SlotKind::Pair,
      _ => SlotKind::Single,
    }
  }

  /// Ordered outgoing children. Boolean branches come true-then-false.
  pub fn children(&self) -> Vec<&Node> {
    match self {
      Node::CronjobTrigger(n) => n.child.iter().map(Box::as_ref).collect(),
      Node::Tool(n) => n.child.iter().map(Box::as_ref).collect(),
      Node::Converter(n) => n.child.iter().map(Box::as_ref).collect(),
      Node::Condition(n) => n.children.iter().collect(),
      Node::Boolean(n) => n
        .true_child
        .iter()
        .chain(n.false_child.iter())
        .map(Box::as_ref)
        .collect(),
      Node::FixedInput(n) => n.child.iter().map(Box::as_ref).collect(),
      Node::UpsertState(n) => n.child.iter().map(Box::as_ref).collect(),
      Node::Skip(n) => n.child.iter().map(Box::as_ref).collect(),
    }
  }

  pub(crate) fn children_mut(&mut self) -> Vec<&mut Node> {
    match self {
      Node::CronjobTrigger(n) => n.child.iter_mut().map(Box::as_mut).collect(),
      Node::Tool(n) => n.child.iter_mut().map(Box::as_mut).collect(),
      Node::Converter(n) => n.child.iter_mut().map(Box::as_mut).collect(),
      Node::Condition(n) => n.children.iter_mut().collect(),
      Node::Boolean(n) => n
        .true_child
        .iter_mut()
        .chain(n.false_child.iter_mut())
        .map(Box::as_mut)
        .collect(),
      Node::FixedInput(n) => n.child.iter_mut().map(Box::as_mut).collect(),
      Node::UpsertState(n) => n.child.iter_mut().map(Box::as_mut).collect(),
      Node::Skip(n) => n.child.iter_mut().map(Box::as_mut).collect(),
    }
  }

  fn single_child_mut(&mut self) -> Option<&mut Option<Box<Node>>> {
    match self {
      Node::CronjobTrigger(n) => Some(&mut n.child),
      Node::Tool(n) => Some(&mut n.child),
      Node::Converter(n) => Some(&mut n.child),
      Node::FixedInput(n) => Some(&mut n.child),
      Node::UpsertState(n) => Some(&mut n.child),
      Node::Skip(n) => Some(&mut n.child),
      Node::Condition(_) | Node::Boolean(_) => None,
    }
  }

  pub(crate) fn take_single_child(&mut self) -> Option<Box<Node>> {
    self.single_child_mut().and_then(Option::take)
  }

  pub(crate) fn set_single_child(&mut self, child: Option<Box<Node>>) {
    if let Some(slot) = self.single_child_mut() {
      *slot = child;
    }
  }

  /// Whether `attach_child` would succeed right now.
  pub(crate) fn can_accept_child(&self) -> bool {
    match self {
      Node::Condition(_) => true,
      Node::Boolean(n) => n.true_child.is_none() || n.false_child.is_none(),
      Node::CronjobTrigger(n) => n.child.is_none(),
      Node::Tool(n) => n.child.is_none(),
      Node::Converter(n) => n.child.is_none(),
      Node::FixedInput(n) => n.child.is_none(),
      Node::UpsertState(n) => n.child.is_none(),
      Node::Skip(n) => n.child.is_none(),
    }
  }

  /// Attach a child per this node's slot shape: fill an empty single slot,
  /// append to a condition's list, fill a boolean's true branch then false.
  pub(crate) fn attach_child(&mut self, child: Node) -> Result<(), WorkflowError> {
    match self {
      Node::Condition(n) => {
        n.children.push(child);
        Ok(())
      }
      Node::Boolean(n) => {
        if n.true_child.is_none() {
          n.true_child = Some(Box::new(child));
          Ok(())
        } else if n.false_child.is_none() {
          n.false_child = Some(Box::new(child));
          Ok(())
        } else {
          Err(WorkflowError::bad_structure(format!(
            "both branches of boolean node '{}' are occupied",
            n.id
          )))
        }
      }
      other => {
        let id = other.id().to_string();
        let slot = other
          .single_child_mut()
          .ok_or_else(|| WorkflowError::bad_structure("node cannot hold children"))?;
        if slot.is_some() {
          return Err(WorkflowError::bad_structure(format!(
            "child slot of node '{id}' is occupied"
          )));
        }
        *slot = Some(Box::new(child));
        Ok(())
      }
    }
  }

  /// Remove the direct child with `id`, returning it and its position.
  pub(crate) fn detach_child(&mut self, id: &str) -> Option<(Node, ChildPos)> {
    match self {
      Node::Condition(n) => {
        let index = n.children.iter().position(|c| c.id() == id)?;
        Some((n.children.remove(index), ChildPos::List(index)))
      }
      Node::Boolean(n) => {
        if n.true_child.as_deref().is_some_and(|c| c.id() == id) {
          return n.true_child.take().map(|c| (*c, ChildPos::TrueBranch));
        }
        if n.false_child.as_deref().is_some_and(|c| c.id() == id) {
          return n.false_child.take().map(|c| (*c, ChildPos::FalseBranch));
        }
        None
      }
      other => {
        let slot = other.single_child_mut()?;
        if slot.as_deref().is_some_and(|c| c.id() == id) {
          return slot.take().map(|c| (*c, ChildPos::Single));
        }
        None
      }
    }
  }

  /// Reattach a node at a previously recorded position.
  pub(crate) fn attach_child_at(
    &mut self,
    pos: ChildPos,
    child: Node,
  ) -> Result<(), WorkflowError> {
    match (self, pos) {
      (Node::Condition(n), ChildPos::List(index)) => {
        let index = index.min(n.children.len());
        n.children.insert(index, child);
        Ok(())
      }
      (Node::Boolean(n), ChildPos::TrueBranch) => {
        n.true_child = Some(Box::new(child));
        Ok(())
      }
      (Node::Boolean(n), ChildPos::FalseBranch) => {
        n.false_child = Some(Box::new(child));
        Ok(())
      }
      (other, ChildPos::Single) => {
        let slot = other
          .single_child_mut()
          .ok_or_else(|| WorkflowError::bad_structure("node cannot hold a single child"))?;
        *slot = Some(Box::new(child));
        Ok(())
      }
      _ => Err(WorkflowError::bad_structure(
        "child position does not match the parent's slot shape",
      )),
    }
  }

  /// Empty this node's child slot, returning the previous contents.
  pub(crate) fn take_slot(&mut self) -> Slot {
    match self {
      Node::Condition(n) => Slot::List(std::mem::take(&mut n.children)),
      Node::Boolean(n) => Slot::Pair {
        on_true: n.true_child.take(),
        on_false: n.false_child.take(),
      },
      other => Slot::Single(other.take_single_child()),
    }
  }

  /// Pour `slot` into this node's child slot. The caller must have verified
  /// the fit with [`Slot::fits`]; a mismatch is reported as `BadStructure`.
  pub(crate) fn attach_slot(&mut self, slot: Slot) -> Result<(), WorkflowError> {
    if !slot.fits(self.slot_kind()) {
      return Err(WorkflowError::bad_structure(format!(
        "child subtree does not fit the slot shape of node '{}'",
        self.id()
      )));
    }
    match self {
      Node::Condition(n) => {
        n.children = match slot {
          Slot::List(children) => children,
          Slot::Single(child) => child.into_iter().map(|c| *c).collect(),
          Slot::Pair { on_true, .. } => on_true.into_iter().map(|c| *c).collect(),
        };
      }
      Node::Boolean(n) => match slot {
        Slot::Pair { on_true, on_false } => {
          n.true_child = on_true;
          n.false_child = on_false;
        }
        Slot::Single(child) => n.true_child = child,
        Slot::List(mut children) => n.true_child = children.pop().map(Box::new),
      },
      other => {
        let child = match slot {
          Slot::Single(child) => child,
          Slot::List(mut children) => children.pop().map(Box::new),
          Slot::Pair { on_true, .. } => on_true,
        };
        other.set_single_child(child);
      }
    }
    Ok(())
  }

  /// Whether this node's current slot contents would fit losslessly into a
  /// slot of `target` shape, without detaching anything.
  pub(crate) fn slot_contents_fit(&self, target: SlotKind) -> bool {
    let count = self.children().len();
    let false_present = matches!(self, Node::Boolean(b) if b.false_child.is_some());
    match target {
      SlotKind::Single => count <= 1 && !false_present,
      SlotKind::List => !false_present,
      SlotKind::Pair => match self.slot_kind() {
        SlotKind::Pair | SlotKind::Single => true,
        SlotKind::List => count <= 1,
      },
    }
  }
}

pub(crate) fn fresh_id() -> String {
  uuid::Uuid::new_v4().to_string()
}

fn default_runtime() -> String {
  "js".to_string()
}

/// Validate a standard 5-field cron expression.
///
/// The `cron` crate parses the 6/7-field form, so a zero seconds field is
/// prepended before parsing.
pub(crate) fn validate_cron(expression: &str) -> Result<(), WorkflowError> {
  let fields = expression.split_whitespace().count();
  if fields != 5 {
    return Err(WorkflowError::InvalidCron {
      expression: expression.to_string(),
      message: format!("expected 5 fields, found {fields}"),
    });
  }
  cron::Schedule::from_str(&format!("0 {expression}")).map_err(|e| WorkflowError::InvalidCron {
    expression: expression.to_string(),
    message: e.to_string(),
  })?;
  Ok(())
}
