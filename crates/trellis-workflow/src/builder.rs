//! Mutating operations on a workflow tree.
//!
//! Every operation either leaves the tree satisfying the structural
//! invariants (unique ids, parentless trigger, slot shapes respected) or
//! fails without mutating anything observable.

use std::collections::HashSet;

use crate::error::WorkflowError;
use crate::node::{CronjobTrigger, Node, SlotKind, validate_cron};
use crate::workflow::Workflow;

impl Workflow {
  /// Attach `child` under the node with `parent_id`, or under the trigger
  /// when no parent is given.
  ///
  /// Single-slot parents must have an empty slot; condition parents append
  /// to their child list; boolean parents fill the true branch first, then
  /// the false branch.
  pub fn add_child(&mut self, parent_id: Option<&str>, child: Node) -> Result<(), WorkflowError> {
    self.assert_new_subtree(&child)?;
    let parent = self.locate_mut(parent_id)?;
    parent.attach_child(child)
  }

  /// Splice `child` between the parent and its current single child. The
  /// displaced child becomes the new node's child.
  pub fn add_after(&mut self, parent_id: Option<&str>, child: Node) -> Result<(), WorkflowError> {
    self.assert_new_subtree(&child)?;
    let parent = self.locate_mut(parent_id)?;
    if parent.slot_kind() != SlotKind::Single {
      return Err(WorkflowError::bad_structure(format!(
        "cannot add after multi-child node '{}'",
        parent.id()
      )));
    }
    if !child.can_accept_child() {
      return Err(WorkflowError::bad_structure(format!(
        "node '{}' cannot adopt the displaced child",
        child.id()
      )));
    }
    let mut child = child;
    if let Some(displaced) = parent.take_single_child() {
      child.attach_child(*displaced)?;
    }
    parent.set_single_child(Some(Box::new(child)));
    Ok(())
  }

  /// Detach the node with `id` (and its subtree) from its parent.
  pub fn remove_child(&mut self, id: &str) -> Result<Node, WorkflowError> {
    if id == self.trigger.id() {
      return Err(WorkflowError::bad_structure("cannot remove the trigger node"));
    }
    let parent = find_parent_mut(&mut self.trigger, id).ok_or_else(|| WorkflowError::not_found(id))?;
    let (node, _) = parent
      .detach_child(id)
      .ok_or_else(|| WorkflowError::not_found(id))?;
    Ok(node)
  }

  /// Replace the node with `id` by `replacement`, keeping the parent link.
  /// The replacement subtree stands in for the old one entirely.
  pub fn modify_child(&mut self, id: &str, replacement: Node) -> Result<Node, WorkflowError> {
    if id == self.trigger.id() {
      return Err(WorkflowError::bad_structure(
        "cannot modify the trigger node; use modify_trigger",
      ));
    }
    let parent_id = self
      .find_parent(id)
      .ok_or_else(|| WorkflowError::not_found(id))?
      .id()
      .to_string();

    let parent = find_node_mut(&mut self.trigger, &parent_id)
      .ok_or_else(|| WorkflowError::not_found(&parent_id))?;
    let (old, pos) = parent
      .detach_child(id)
      .ok_or_else(|| WorkflowError::not_found(id))?;

    if let Err(e) = self.assert_new_subtree(&replacement) {
      // Put the original subtree back before reporting the conflict.
      let parent = find_node_mut(&mut self.trigger, &parent_id)
        .ok_or_else(|| WorkflowError::not_found(&parent_id))?;
      parent.attach_child_at(pos, old)?;
      return Err(e);
    }

    let parent = find_node_mut(&mut self.trigger, &parent_id)
      .ok_or_else(|| WorkflowError::not_found(&parent_id))?;
    parent.attach_child_at(pos, replacement)?;
    Ok(old)
  }

  /// Replace the trigger's metadata (id, cron), keeping its child subtree.
  pub fn modify_trigger(&mut self, new_trigger: CronjobTrigger) -> Result<(), WorkflowError> {
    validate_cron(&new_trigger.cron)?;
    let old_id = self.trigger.id().to_string();
    if new_trigger.id != old_id && self.find(&new_trigger.id).is_some() {
      return Err(WorkflowError::bad_structure(format!(
        "duplicate node id: {}",
        new_trigger.id
      )));
    }
    if let Node::CronjobTrigger(trigger) = &mut self.trigger {
      trigger.id = new_trigger.id;
      trigger.cron = new_trigger.cron;
      Ok(())
    } else {
      Err(WorkflowError::bad_structure(
        "workflow root must be a cronjob trigger",
      ))
    }
  }

  /// Exchange two non-trigger, non-identical nodes.
  ///
  /// Children of the same condition swap positions in its list; a node and
  /// its direct child swap their relative order in the chain; otherwise the
  /// two nodes trade places while each tree position keeps its child
  /// subtree. Applying the same swap twice restores the original tree.
  pub fn swap_nodes(&mut self, a: &str, b: &str) -> Result<(), WorkflowError> {
    if a == b {
      return Err(WorkflowError::bad_structure(
        "cannot swap a node with itself",
      ));
    }
    if a == self.trigger.id() || b == self.trigger.id() {
      return Err(WorkflowError::bad_structure("cannot swap the trigger node"));
    }
    let parent_a = self
      .find_parent(a)
      .ok_or_else(|| WorkflowError::not_found(a))?
      .id()
      .to_string();
    let parent_b = self
      .find_parent(b)
      .ok_or_else(|| WorkflowError::not_found(b))?
      .id()
      .to_string();

    if parent_a == parent_b {
      let parent = find_node_mut(&mut self.trigger, &parent_a)
        .ok_or_else(|| WorkflowError::not_found(&parent_a))?;
      if let Node::Condition(cond) = parent {
        let i = cond.children.iter().position(|c| c.id() == a);
        let j = cond.children.iter().position(|c| c.id() == b);
        if let (Some(i), Some(j)) = (i, j) {
          cond.children.swap(i, j);
          return Ok(());
        }
      }
      // A shared non-condition parent (a boolean's two branches) goes
      // through the general exchange below.
    }

    if parent_a == b {
      return self.swap_adjacent(b, a);
    }
    if parent_b == a {
      return self.swap_adjacent(a, b);
    }
    self.swap_detached(a, b)
  }

  /// Swap a node with its direct child, preserving the deeper tail:
  /// `P -> A -> B -> tail` becomes `P -> B -> A -> tail`.
  fn swap_adjacent(&mut self, outer_id: &str, inner_id: &str) -> Result<(), WorkflowError> {
    for id in [outer_id, inner_id] {
      let node = self.find(id).ok_or_else(|| WorkflowError::not_found(id))?;
      if node.slot_kind() != SlotKind::Single {
        return Err(WorkflowError::bad_structure(format!(
          "cannot swap multi-child node '{id}' with its neighbor",
        )));
      }
    }
    let grand_id = self
      .find_parent(outer_id)
      .ok_or_else(|| WorkflowError::not_found(outer_id))?
      .id()
      .to_string();
    let grand = find_node_mut(&mut self.trigger, &grand_id)
      .ok_or_else(|| WorkflowError::not_found(&grand_id))?;
    let (mut outer, pos) = grand
      .detach_child(outer_id)
      .ok_or_else(|| WorkflowError::not_found(outer_id))?;
    let Some((mut inner, _)) = outer.detach_child(inner_id) else {
      // Not actually adjacent; restore and report.
      grand.attach_child_at(pos, outer)?;
      return Err(WorkflowError::not_found(inner_id));
    };
    let tail = inner.take_single_child();
    outer.set_single_child(tail);
    inner.set_single_child(Some(Box::new(outer)));
    grand.attach_child_at(pos, inner)
  }

  /// General exchange: the two nodes trade places, each tree position keeps
  /// its child subtree. Handles nodes in disjoint branches as well as an
  /// ancestor/descendant pair that is not directly adjacent.
  fn swap_detached(&mut self, a: &str, b: &str) -> Result<(), WorkflowError> {
    // Detach the ancestor first when one contains the other.
    let b_contains_a = self
      .find(b)
      .is_some_and(|node| subtree_contains(node, a));
    let (outer_id, inner_id) = if b_contains_a { (b, a) } else { (a, b) };

    // Both exchanges must be lossless before anything moves.
    let outer_ref = self
      .find(outer_id)
      .ok_or_else(|| WorkflowError::not_found(outer_id))?;
    let inner_ref = self
      .find(inner_id)
      .ok_or_else(|| WorkflowError::not_found(inner_id))?;
    if !outer_ref.slot_contents_fit(inner_ref.slot_kind())
      || !inner_ref.slot_contents_fit(outer_ref.slot_kind())
    {
      return Err(WorkflowError::bad_structure(format!(
        "cannot swap '{outer_id}' and '{inner_id}': child subtrees do not fit the slot shapes",
      )));
    }

    let parent_outer_id = self
      .find_parent(outer_id)
      .ok_or_else(|| WorkflowError::not_found(outer_id))?
      .id()
      .to_string();
    let parent_outer = find_node_mut(&mut self.trigger, &parent_outer_id)
      .ok_or_else(|| WorkflowError::not_found(&parent_outer_id))?;
    let (mut outer, pos_outer) = parent_outer
      .detach_child(outer_id)
      .ok_or_else(|| WorkflowError::not_found(outer_id))?;

    // The inner node lives either inside the detached subtree or elsewhere
    // in the tree.
    let (mut inner, pos_inner, parent_inner_id, inner_was_nested) =
      match find_parent_mut(&mut outer, inner_id) {
        Some(parent) => {
          let parent_id = parent.id().to_string();
          let (inner, pos) = parent
            .detach_child(inner_id)
            .ok_or_else(|| WorkflowError::not_found(inner_id))?;
          (inner, pos, parent_id, true)
        }
        None => {
          let parent = find_parent_mut(&mut self.trigger, inner_id)
            .ok_or_else(|| WorkflowError::not_found(inner_id))?;
          let parent_id = parent.id().to_string();
          let (inner, pos) = parent
            .detach_child(inner_id)
            .ok_or_else(|| WorkflowError::not_found(inner_id))?;
          (inner, pos, parent_id, false)
        }
      };

    let slot_outer = outer.take_slot();
    let slot_inner = inner.take_slot();
    outer.attach_slot(slot_inner)?;
    inner.attach_slot(slot_outer)?;

    // Reattach the outer node at the inner position. When the pair was
    // nested, the inner position's parent now lives inside the inner
    // node's freshly exchanged subtree.
    if inner_was_nested {
      let parent = find_node_mut(&mut inner, &parent_inner_id)
        .ok_or_else(|| WorkflowError::not_found(&parent_inner_id))?;
      parent.attach_child_at(pos_inner, outer)?;
    } else {
      let parent = find_node_mut(&mut self.trigger, &parent_inner_id)
        .ok_or_else(|| WorkflowError::not_found(&parent_inner_id))?;
      parent.attach_child_at(pos_inner, outer)?;
    }

    let parent = find_node_mut(&mut self.trigger, &parent_outer_id)
      .ok_or_else(|| WorkflowError::not_found(&parent_outer_id))?;
    parent.attach_child_at(pos_outer, inner)
  }

  fn locate_mut(&mut self, parent_id: Option<&str>) -> Result<&mut Node, WorkflowError> {
    match parent_id {
      None => Ok(&mut self.trigger),
      Some(id) => {
        find_node_mut(&mut self.trigger, id).ok_or_else(|| WorkflowError::not_found(id))
      }
    }
  }

  /// Reject a subtree whose ids collide with the tree or repeat internally.
  fn assert_new_subtree(&self, subtree: &Node) -> Result<(), WorkflowError> {
    if matches!(subtree, Node::CronjobTrigger(_)) {
      return Err(WorkflowError::bad_structure(
        "trigger nodes cannot be attached below the root",
      ));
    }
    let existing: HashSet<String> = self.node_ids().into_iter().collect();
    let mut incoming = HashSet::new();
    let mut queue = vec![subtree];
    while let Some(node) = queue.pop() {
      let id = node.id();
      if existing.contains(id) || !incoming.insert(id.to_string()) {
        return Err(WorkflowError::bad_structure(format!(
          "duplicate node id: {id}"
        )));
      }
      queue.extend(node.children());
    }
    Ok(())
  }
}

fn subtree_contains(root: &Node, id: &str) -> bool {
  if root.id() == id {
    return true;
  }
  root.children().iter().any(|child| subtree_contains(child, id))
}

fn find_node_mut<'a>(root: &'a mut Node, id: &str) -> Option<&'a mut Node> {
  if root.id() == id {
    return Some(root);
  }
  root
    .children_mut()
    .into_iter()
    .find_map(|child| find_node_mut(child, id))
}

fn find_parent_mut<'a>(root: &'a mut Node, id: &str) -> Option<&'a mut Node> {
  if root.children().iter().any(|child| child.id() == id) {
    return Some(root);
  }
  root
    .children_mut()
    .into_iter()
    .find_map(|child| find_parent_mut(child, id))
}
