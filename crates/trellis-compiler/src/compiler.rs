//! The compile pipeline.
//!
//! Three stages, each short-circuiting the rest on failure while collecting
//! every issue within itself: structural validation, tool existence against
//! the registry, and schema compatibility along tool-to-tool edges.

use std::collections::VecDeque;

use trellis_workflow::{Node, Workflow};

use crate::compat::check_compatibility;
use crate::error::CompileError;
use crate::registry::ToolRegistry;

pub struct Compiler<R: ToolRegistry> {
  registry: R,
}

impl<R: ToolRegistry> Compiler<R> {
  pub fn new(registry: R) -> Self {
    Self { registry }
  }

  /// Validate `workflow`, returning it unchanged on success.
  pub async fn compile<'a>(&self, workflow: &'a Workflow) -> Result<&'a Workflow, CompileError> {
    workflow
      .validate()
      .map_err(|e| CompileError::BadStructure {
        detail: e.to_string(),
      })?;

    let identifiers = tool_identifiers(workflow);
    if !identifiers.is_empty() {
      let existence = self.registry.check_existence(&identifiers).await?;
      if !existence.missing_tools.is_empty() {
        return Err(CompileError::ToolsMissing {
          missing_tools: existence.missing_tools,
        });
      }
    }

    let mut errors = Vec::new();
    let mut suggestions = Vec::new();
    for (producer, consumer) in tool_edges(workflow) {
      let check = check_compatibility(&producer.output_schema, &consumer.input_schema);
      if !check.compatible {
        errors.extend(check.errors);
        suggestions.extend(check.suggestions);
      }
    }
    if !errors.is_empty() {
      return Err(CompileError::SchemaMismatch {
        errors,
        suggestions,
      });
    }

    Ok(workflow)
  }
}

/// Every tool identifier in the tree, deduplicated, in BFS order.
fn tool_identifiers(workflow: &Workflow) -> Vec<String> {
  let mut identifiers = Vec::new();
  let mut queue = VecDeque::from([workflow.trigger()]);
  while let Some(node) = queue.pop_front() {
    if let Node::Tool(tool) = node {
      if !identifiers.contains(&tool.tool_identifier) {
        identifiers.push(tool.tool_identifier.clone());
      }
    }
    queue.extend(node.children());
  }
  identifiers
}

/// Every direct edge whose producer and consumer are both tool nodes, in
/// BFS order. The stable order keeps error reports deterministic.
fn tool_edges(
  workflow: &Workflow,
) -> Vec<(&trellis_workflow::ToolNode, &trellis_workflow::ToolNode)> {
  let mut edges = Vec::new();
  let mut queue = VecDeque::from([workflow.trigger()]);
  while let Some(node) = queue.pop_front() {
    if let Node::Tool(producer) = node {
      for child in node.children() {
        if let Node::Tool(consumer) = child {
          edges.push((producer, consumer));
        }
      }
    }
    queue.extend(node.children());
  }
  edges
}

#[cfg(test)]
mod tests {
  use serde_json::json;
  use trellis_workflow::{ConverterNode, CronjobTrigger, Node, ToolNode, Workflow};

  use super::*;
  use crate::registry::StaticToolRegistry;

  fn tool(id: &str, identifier: &str, input: serde_json::Value, output: serde_json::Value) -> Node {
    let mut node = ToolNode::new(identifier, input, output);
    node.id = id.to_string();
    Node::Tool(node)
  }

  fn workflow() -> Workflow {
    Workflow::new("compile test", CronjobTrigger::new("0 * * * *").unwrap()).unwrap()
  }

  #[tokio::test]
  async fn compiles_a_valid_tool_chain() {
    let mut wf = workflow();
    wf.add_child(
      None,
      tool(
        "a",
        "binance",
        json!({}),
        json!({"type": "object", "properties": {"price": {"type": "string"}}}),
      ),
    )
    .unwrap();
    wf.add_child(
      Some("a"),
      tool(
        "b",
        "notifier",
        json!({"type": "object", "properties": {"price": {"type": "string"}}}),
        json!({}),
      ),
    )
    .unwrap();

    let compiler = Compiler::new(StaticToolRegistry::new(["binance", "notifier"]));
    compiler.compile(&wf).await.unwrap();
  }

  #[tokio::test]
  async fn missing_tools_short_circuit_before_schemas() {
    let mut wf = workflow();
    wf.add_child(
      None,
      tool(
        "a",
        "ghost",
        json!({}),
        json!({"type": "object", "properties": {"name": {"type": "string"}}}),
      ),
    )
    .unwrap();
    wf.add_child(
      Some("a"),
      tool(
        "b",
        "notifier",
        json!({"type": "object", "properties": {"firstName": {"type": "string"}}}),
        json!({}),
      ),
    )
    .unwrap();

    let compiler = Compiler::new(StaticToolRegistry::new(["notifier"]));
    let err = compiler.compile(&wf).await.unwrap_err();
    let CompileError::ToolsMissing { missing_tools } = err else {
      panic!("expected ToolsMissing, got {err}");
    };
    assert_eq!(missing_tools, vec!["ghost".to_string()]);
  }

  #[tokio::test]
  async fn incompatible_edge_reports_errors_and_suggestions() {
    let mut wf = workflow();
    wf.add_child(
      None,
      tool(
        "a",
        "source",
        json!({}),
        json!({"type": "object", "properties": {"name": {"type": "string"}}}),
      ),
    )
    .unwrap();
    wf.add_child(
      Some("a"),
      tool(
        "b",
        "sink",
        json!({"type": "object", "properties": {"firstName": {"type": "string"}}}),
        json!({}),
      ),
    )
    .unwrap();

    let compiler = Compiler::new(StaticToolRegistry::new(["source", "sink"]));
    let err = compiler.compile(&wf).await.unwrap_err();
    let CompileError::SchemaMismatch {
      errors,
      suggestions,
    } = err
    else {
      panic!("expected SchemaMismatch, got {err}");
    };
    assert!(errors[0].contains("firstName"));
    assert_eq!(suggestions[0], "Consider mapping 'name' to 'firstName'");
  }

  #[tokio::test]
  async fn non_tool_edges_are_not_schema_checked() {
    let mut wf = workflow();
    wf.add_child(
      None,
      tool(
        "a",
        "source",
        json!({}),
        json!({"type": "object", "properties": {"name": {"type": "string"}}}),
      ),
    )
    .unwrap();
    wf.add_child(Some("a"), Node::Converter(ConverterNode::new("return input;")))
      .unwrap();

    let compiler = Compiler::new(StaticToolRegistry::new(["source"]));
    compiler.compile(&wf).await.unwrap();
  }

  #[tokio::test]
  async fn compilation_is_deterministic() {
    let mut wf = workflow();
    wf.add_child(
      None,
      tool(
        "a",
        "source",
        json!({}),
        json!({"type": "object", "properties": {"name": {"type": "string"}}}),
      ),
    )
    .unwrap();
    wf.add_child(
      Some("a"),
      tool(
        "b",
        "sink",
        json!({"type": "object", "properties": {"first": {"type": "string"}, "second": {"type": "string"}}}),
        json!({}),
      ),
    )
    .unwrap();

    let compiler = Compiler::new(StaticToolRegistry::new(["source", "sink"]));
    let first = compiler.compile(&wf).await.unwrap_err().to_string();
    let second = compiler.compile(&wf).await.unwrap_err().to_string();
    assert_eq!(first, second);
  }
}
