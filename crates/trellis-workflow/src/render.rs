//! Human-readable tree rendering for diagnostics.

use crate::node::Node;
use crate::workflow::Workflow;

impl Workflow {
  /// Render the tree as an indented listing, one node per line.
  pub fn render_tree(&self) -> String {
    let mut out = format!("{}\n", self.title);
    render(self.trigger(), "", "", "", &mut out);
    out
  }
}

fn render(node: &Node, line_prefix: &str, child_prefix: &str, label: &str, out: &mut String) {
  out.push_str(line_prefix);
  out.push_str(label);
  out.push_str(&describe(node));
  out.push('\n');

  let labels = branch_labels(node);
  let children = node.children();
  let count = children.len();
  for (index, child) in children.into_iter().enumerate() {
    let last = index + 1 == count;
    let connector = if last { "└─ " } else { "├─ " };
    let continuation = if last { "   " } else { "│  " };
    let child_label = labels
      .as_ref()
      .and_then(|l| l.get(index).copied())
      .unwrap_or("");
    render(
      child,
      &format!("{child_prefix}{connector}"),
      &format!("{child_prefix}{continuation}"),
      child_label,
      out,
    );
  }
}

fn branch_labels(node: &Node) -> Option<Vec<&'static str>> {
  if let Node::Boolean(boolean) = node {
    let mut labels = Vec::new();
    if boolean.true_child.is_some() {
      labels.push("true: ");
    }
    if boolean.false_child.is_some() {
      labels.push("false: ");
    }
    return Some(labels);
  }
  None
}

fn describe(node: &Node) -> String {
  match node {
    Node::CronjobTrigger(n) => format!("cronjob-trigger [{}] \"{}\"", n.id, n.cron),
    Node::Tool(n) => format!("tool [{}] {}", n.id, n.tool_identifier),
    Node::Converter(n) => format!("converter [{}]", n.id),
    Node::Condition(n) => format!("condition [{}]", n.id),
    Node::Boolean(n) => format!("boolean [{}]", n.id),
    Node::FixedInput(n) => format!("fixed-input [{}]", n.id),
    Node::UpsertState(n) => format!("upsert-state [{}] {}", n.id, n.key),
    Node::Skip(n) => format!("skip [{}]", n.id),
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use crate::node::{BooleanNode, CronjobTrigger, Node, ToolNode, UpsertStateNode};
  use crate::workflow::Workflow;

  #[test]
  fn renders_nodes_with_branch_labels() {
    let mut trigger = CronjobTrigger::new("*/5 * * * *").unwrap();
    trigger.id = "t".to_string();
    let mut wf = Workflow::new("render test", trigger).unwrap();

    let mut gate = BooleanNode::new("return true;");
    gate.id = "gate".to_string();
    gate.true_child = Some(Box::new(Node::UpsertState(UpsertStateNode::new(
      "hasSent",
      json!(true),
    ))));
    let mut tool = ToolNode::new("binance", json!({}), json!({}));
    tool.id = "quote".to_string();

    wf.add_child(None, Node::Tool(tool)).unwrap();
    wf.add_child(Some("quote"), Node::Boolean(gate)).unwrap();

    let rendered = wf.render_tree();
    assert!(rendered.starts_with("render test\n"));
    assert!(rendered.contains("cronjob-trigger [t] \"*/5 * * * *\""));
    assert!(rendered.contains("tool [quote] binance"));
    assert!(rendered.contains("true: upsert-state"));
  }
}
