//! End-to-end engine runs against stub executors and in-memory state.

use std::sync::Arc;

use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use trellis_engine::{ChannelNotifier, Engine, ExecutionError, ExecutionEvent};
use trellis_host::{
  FnCodeExecutor, HostError, MemoryStateClient, StateClient, StubToolExecutor,
};
use trellis_template::{Namespace, TemplateError};
use trellis_workflow::{
  BooleanNode, ConditionNode, ConverterNode, CronjobTrigger, FixedInputNode, Node, SkipNode,
  ToolNode, UpsertStateNode, Workflow,
};

fn workflow(title: &str) -> Workflow {
  let mut trigger = CronjobTrigger::new("0 * * * *").unwrap();
  trigger.id = "trigger".to_string();
  Workflow::new(title, trigger).unwrap()
}

fn converter(id: &str, code: &str) -> Node {
  let mut node = ConverterNode::new(code);
  node.id = id.to_string();
  node.into()
}

fn fixed(id: &str, output: Value) -> Node {
  let mut node = FixedInputNode::new(output);
  node.id = id.to_string();
  node.into()
}

fn tool(id: &str, identifier: &str) -> Node {
  let mut node = ToolNode::new(identifier, json!({}), json!({}));
  node.id = id.to_string();
  node.into()
}

fn boolean(id: &str, code: &str) -> Node {
  let mut node = BooleanNode::new(code);
  node.id = id.to_string();
  node.into()
}

fn condition(id: &str, code: &str) -> Node {
  let mut node = ConditionNode::new(code);
  node.id = id.to_string();
  node.into()
}

fn upsert(id: &str, key: &str, value: Value) -> Node {
  let mut node = UpsertStateNode::new(key, value);
  node.id = id.to_string();
  node.into()
}

fn skip(id: &str) -> Node {
  let mut node = SkipNode::new();
  node.id = id.to_string();
  node.into()
}

type CodeFn = fn(Value, &str, Value) -> Result<Value, HostError>;

fn engine_with(tools: StubToolExecutor, code: CodeFn) -> (Arc<MemoryStateClient>, Engine) {
  let state = Arc::new(MemoryStateClient::new());
  let engine = Engine::new(
    Arc::new(tools),
    Arc::new(FnCodeExecutor::new(code)),
    state.clone(),
  );
  (state, engine)
}

fn echo_code(input: Value, _source: &str, _context: Value) -> Result<Value, HostError> {
  Ok(input)
}

async fn run(engine: &Engine, wf: &Workflow, context: Value) -> Result<Value, ExecutionError> {
  engine.execute(wf, context, CancellationToken::new()).await
}

#[tokio::test]
async fn fixed_input_expands_input_and_context() {
  let mut wf = workflow("fixed input expansion");
  wf.add_child(
    None,
    fixed(
      "render",
      json!({"fullName": "{{input.firstName}} {{context.lastName}}"}),
    ),
  )
  .unwrap();

  let (_, engine) = engine_with(StubToolExecutor::new(), echo_code);
  let output = run(&engine, &wf, json!({"firstName": "John", "lastName": "Doe"}))
    .await
    .unwrap();
  assert_eq!(output, json!({"fullName": "John Doe"}));
}

#[tokio::test]
async fn missing_reference_aborts_with_reference_error() {
  let mut wf = workflow("missing reference");
  wf.add_child(None, fixed("render", json!({"value": "{{input.missing}}"})))
    .unwrap();

  let (_, engine) = engine_with(StubToolExecutor::new(), echo_code);
  let err = run(&engine, &wf, json!({"firstName": "John"}))
    .await
    .unwrap_err();
  let ExecutionError::Template(TemplateError::Reference { field, reference }) = err else {
    panic!("expected reference error, got {err}");
  };
  assert_eq!(field, Namespace::Input);
  assert_eq!(reference, "missing");
}

#[tokio::test]
async fn fixed_input_feeds_tool_feeds_converter() {
  let mut wf = workflow("price pipeline");
  wf.add_child(None, fixed("symbol", json!({"symbol": "BTCUSDT"})))
    .unwrap();
  wf.add_child(Some("symbol"), tool("price", "binance")).unwrap();
  wf.add_child(Some("price"), converter("label", "format-price"))
    .unwrap();

  fn code(input: Value, source: &str, _context: Value) -> Result<Value, HostError> {
    match source {
      "format-price" => {
        let price = input["price"].as_str().unwrap_or_default();
        Ok(json!(format!("BTC {price}")))
      }
      other => Err(HostError::Code(format!("unexpected source: {other}"))),
    }
  }

  let tools = StubToolExecutor::new().with_response("binance", json!({"price": "42000"}));
  let (_, engine) = engine_with(tools, code);
  let output = run(&engine, &wf, json!({})).await.unwrap();
  assert_eq!(output, json!("BTC 42000"));
}

#[tokio::test]
async fn boolean_branches_on_price_threshold() {
  let mut wf = workflow("price alert");
  wf.add_child(None, converter("quote", "emit-price")).unwrap();
  wf.add_child(Some("quote"), boolean("gate", "price-over-10000"))
    .unwrap();
  wf.add_child(Some("gate"), upsert("sent", "hasSent", json!(true)))
    .unwrap();
  wf.add_child(Some("gate"), upsert("unsent", "hasSent", json!(false)))
    .unwrap();

  fn code(input: Value, source: &str, _context: Value) -> Result<Value, HostError> {
    match source {
      "emit-price" => Ok(json!({"price": 15000})),
      "price-over-10000" => {
        let price = input["input"]["price"].as_i64().unwrap_or_default();
        Ok(json!(price > 10000))
      }
      other => Err(HostError::Code(format!("unexpected source: {other}"))),
    }
  }

  let (state, engine) = engine_with(StubToolExecutor::new(), code);
  let output = run(&engine, &wf, json!({})).await.unwrap();
  assert_eq!(output, json!(true));
  assert_eq!(state.get("hasSent").await.unwrap(), Some(json!(true)));
}

#[tokio::test]
async fn boolean_with_missing_branch_terminates_silently() {
  let mut wf = workflow("one-shot notification");
  wf.add_child(None, boolean("gate", "always-false")).unwrap();
  wf.add_child(Some("gate"), upsert("sent", "hasSent", json!(true)))
    .unwrap();
  // No false branch; the run just ends.

  fn code(_input: Value, _source: &str, _context: Value) -> Result<Value, HostError> {
    Ok(json!(false))
  }

  let (state, engine) = engine_with(StubToolExecutor::new(), code);
  let output = run(&engine, &wf, json!({})).await.unwrap();
  assert_eq!(output, json!(false));
  assert_eq!(state.get("hasSent").await.unwrap(), None);
}

#[tokio::test]
async fn condition_null_terminates_without_error() {
  let mut wf = workflow("condition termination");
  wf.add_child(None, converter("pre", "echo")).unwrap();
  wf.add_child(Some("pre"), condition("route", "return-null"))
    .unwrap();
  wf.add_child(Some("route"), converter("never", "echo")).unwrap();

  fn code(input: Value, source: &str, _context: Value) -> Result<Value, HostError> {
    match source {
      "echo" => Ok(input),
      "return-null" => Ok(Value::Null),
      other => Err(HostError::Code(format!("unexpected source: {other}"))),
    }
  }

  let (_, engine) = engine_with(StubToolExecutor::new(), code);
  let output = run(&engine, &wf, json!({"seed": 1})).await.unwrap();
  assert_eq!(output, Value::Null);
}

#[tokio::test]
async fn condition_routes_to_named_child_with_no_incoming() {
  let mut wf = workflow("condition routing");
  wf.add_child(None, condition("route", "pick-b")).unwrap();
  wf.add_child(Some("route"), converter("branch-a", "echo")).unwrap();
  wf.add_child(Some("route"), converter("branch-b", "tag")).unwrap();

  fn code(input: Value, source: &str, _context: Value) -> Result<Value, HostError> {
    match source {
      "pick-b" => Ok(json!("branch-b")),
      "tag" => Ok(json!({"ran": "branch-b", "incoming": input})),
      "echo" => Ok(input),
      other => Err(HostError::Code(format!("unexpected source: {other}"))),
    }
  }

  let (_, engine) = engine_with(StubToolExecutor::new(), code);
  let output = run(&engine, &wf, json!({"seed": 1})).await.unwrap();
  // The routed child starts with no incoming value.
  assert_eq!(output, json!({"ran": "branch-b", "incoming": null}));
}

#[tokio::test]
async fn condition_sees_parent_output_and_ids() {
  let mut wf = workflow("condition context");
  wf.add_child(None, converter("pre", "emit")).unwrap();
  wf.add_child(Some("pre"), condition("route", "inspect")).unwrap();

  fn code(input: Value, source: &str, context: Value) -> Result<Value, HostError> {
    match source {
      "emit" => Ok(json!({"marker": 7})),
      "inspect" => {
        assert_eq!(input["input"], json!({"marker": 7}));
        assert_eq!(input["nodeId"], json!("pre"));
        assert_eq!(context["nodeId"], json!("route"));
        Ok(Value::Null)
      }
      other => Err(HostError::Code(format!("unexpected source: {other}"))),
    }
  }

  let (_, engine) = engine_with(StubToolExecutor::new(), code);
  run(&engine, &wf, json!({})).await.unwrap();
}

#[tokio::test]
async fn condition_with_unknown_child_is_missing_node() {
  let mut wf = workflow("condition misroute");
  wf.add_child(None, condition("route", "pick-ghost")).unwrap();
  wf.add_child(Some("route"), converter("real", "echo")).unwrap();

  fn code(input: Value, source: &str, _context: Value) -> Result<Value, HostError> {
    match source {
      "pick-ghost" => Ok(json!("ghost")),
      _ => Ok(input),
    }
  }

  let (_, engine) = engine_with(StubToolExecutor::new(), code);
  let err = run(&engine, &wf, json!({})).await.unwrap_err();
  let ExecutionError::MissingNode { node_id } = err else {
    panic!("expected MissingNode, got {err}");
  };
  assert_eq!(node_id, "ghost");
}

#[tokio::test]
async fn linear_chain_executes_in_order() {
  let mut wf = workflow("linear order");
  wf.add_child(None, converter("a", "echo")).unwrap();
  wf.add_child(Some("a"), converter("b", "echo")).unwrap();
  wf.add_child(Some("b"), converter("c", "stamp")).unwrap();

  fn code(input: Value, source: &str, _context: Value) -> Result<Value, HostError> {
    match source {
      "stamp" => Ok(json!({"final": true})),
      _ => Ok(input),
    }
  }

  let (sender, mut receiver) = tokio::sync::mpsc::unbounded_channel();
  let state = Arc::new(MemoryStateClient::new());
  let engine = Engine::with_notifier(
    Arc::new(StubToolExecutor::new()),
    Arc::new(FnCodeExecutor::new(
      code as fn(Value, &str, Value) -> Result<Value, HostError>,
    )),
    state,
    ChannelNotifier::new(sender),
  );

  let output = engine
    .execute(&wf, json!({"seed": 1}), CancellationToken::new())
    .await
    .unwrap();
  assert_eq!(output, json!({"final": true}));

  let mut completed = Vec::new();
  while let Ok(event) = receiver.try_recv() {
    if let ExecutionEvent::NodeCompleted { node_id, .. } = event {
      completed.push(node_id);
    }
  }
  assert_eq!(completed, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn condition_runs_after_its_parent() {
  let mut wf = workflow("fan-in ordering");
  wf.add_child(None, converter("parent", "echo")).unwrap();
  wf.add_child(Some("parent"), condition("route", "return-null"))
    .unwrap();

  fn code(input: Value, source: &str, _context: Value) -> Result<Value, HostError> {
    match source {
      "return-null" => Ok(Value::Null),
      _ => Ok(input),
    }
  }

  let (sender, mut receiver) = tokio::sync::mpsc::unbounded_channel();
  let engine = Engine::with_notifier(
    Arc::new(StubToolExecutor::new()),
    Arc::new(FnCodeExecutor::new(
      code as fn(Value, &str, Value) -> Result<Value, HostError>,
    )),
    Arc::new(MemoryStateClient::new()),
    ChannelNotifier::new(sender),
  );

  engine
    .execute(&wf, json!({}), CancellationToken::new())
    .await
    .unwrap();

  let mut completed = Vec::new();
  while let Ok(event) = receiver.try_recv() {
    if let ExecutionEvent::NodeCompleted { node_id, .. } = event {
      completed.push(node_id);
    }
  }
  assert_eq!(completed, vec!["parent", "route"]);
}

#[tokio::test]
async fn state_written_earlier_is_visible_to_templates() {
  let mut wf = workflow("state persistence");
  wf.add_child(None, upsert("write", "greeting", json!("hello")))
    .unwrap();
  wf.add_child(Some("write"), fixed("read", json!({"echoed": "{{state.greeting}}"})))
    .unwrap();

  let (_, engine) = engine_with(StubToolExecutor::new(), echo_code);
  let output = run(&engine, &wf, json!({})).await.unwrap();
  assert_eq!(output, json!({"echoed": "hello"}));
}

#[tokio::test]
async fn state_persists_across_runs() {
  let mut writer = workflow("writer");
  writer
    .add_child(None, upsert("write", "counter", json!(42)))
    .unwrap();

  let mut reader = workflow("reader");
  reader
    .add_child(None, fixed("read", json!("{{state.counter}}")))
    .unwrap();

  let (_, engine) = engine_with(StubToolExecutor::new(), echo_code);
  run(&engine, &writer, json!({})).await.unwrap();
  let output = run(&engine, &reader, json!({})).await.unwrap();
  assert_eq!(output, json!(42));
}

#[tokio::test]
async fn skip_forwards_input_and_stops_propagation() {
  let mut wf = workflow("skip termination");
  wf.add_child(None, converter("pre", "emit")).unwrap();
  wf.add_child(Some("pre"), skip("stop")).unwrap();
  wf.add_child(Some("stop"), upsert("never", "ran", json!(true)))
    .unwrap();

  fn code(_input: Value, source: &str, _context: Value) -> Result<Value, HostError> {
    match source {
      "emit" => Ok(json!({"payload": 9})),
      other => Err(HostError::Code(format!("unexpected source: {other}"))),
    }
  }

  let (state, engine) = engine_with(StubToolExecutor::new(), code);
  let output = run(&engine, &wf, json!({})).await.unwrap();
  assert_eq!(output, json!({"payload": 9}));
  assert_eq!(state.get("ran").await.unwrap(), None);
}

#[tokio::test]
async fn trigger_without_child_is_empty_workflow() {
  let wf = workflow("empty");
  let (_, engine) = engine_with(StubToolExecutor::new(), echo_code);
  let err = run(&engine, &wf, json!({})).await.unwrap_err();
  assert!(matches!(err, ExecutionError::EmptyWorkflow));
}

#[tokio::test]
async fn tool_failure_aborts_the_run() {
  let mut wf = workflow("tool failure");
  wf.add_child(None, tool("call", "unregistered")).unwrap();
  wf.add_child(Some("call"), upsert("never", "ran", json!(true)))
    .unwrap();

  let (state, engine) = engine_with(StubToolExecutor::new(), echo_code);
  let err = run(&engine, &wf, json!({})).await.unwrap_err();
  let ExecutionError::ToolFailure { node_id, .. } = err else {
    panic!("expected ToolFailure, got {err}");
  };
  assert_eq!(node_id, "call");
  assert_eq!(state.get("ran").await.unwrap(), None);
}

#[tokio::test]
async fn converter_failure_aborts_the_run() {
  let mut wf = workflow("converter failure");
  wf.add_child(None, converter("boom", "explode")).unwrap();

  fn code(_input: Value, _source: &str, _context: Value) -> Result<Value, HostError> {
    Err(HostError::Code("deliberate".to_string()))
  }

  let (_, engine) = engine_with(StubToolExecutor::new(), code);
  let err = run(&engine, &wf, json!({})).await.unwrap_err();
  assert!(matches!(err, ExecutionError::ConverterFailure { .. }));
}

#[tokio::test]
async fn state_writes_before_a_failure_persist() {
  let mut wf = workflow("no rollback");
  wf.add_child(None, upsert("write", "progress", json!("partial")))
    .unwrap();
  wf.add_child(Some("write"), tool("call", "unregistered")).unwrap();

  let (state, engine) = engine_with(StubToolExecutor::new(), echo_code);
  run(&engine, &wf, json!({})).await.unwrap_err();
  assert_eq!(state.get("progress").await.unwrap(), Some(json!("partial")));
}

#[tokio::test]
async fn cancelled_token_aborts_before_any_node() {
  let mut wf = workflow("cancelled");
  wf.add_child(None, upsert("write", "ran", json!(true))).unwrap();

  let (state, engine) = engine_with(StubToolExecutor::new(), echo_code);
  let cancel = CancellationToken::new();
  cancel.cancel();

  let err = engine.execute(&wf, json!({}), cancel).await.unwrap_err();
  assert!(matches!(err, ExecutionError::Cancelled));
  assert_eq!(state.get("ran").await.unwrap(), None);
}

#[tokio::test]
async fn execute_node_runs_one_node_in_isolation() {
  let (_, engine) = engine_with(StubToolExecutor::new(), echo_code);

  let node = fixed("render", json!({"greeting": "hi {{input.name}}"}));
  let output = engine
    .execute_node(&node, json!({"name": "Ada"}), CancellationToken::new())
    .await
    .unwrap();
  assert_eq!(output, json!({"greeting": "hi Ada"}));
}

#[tokio::test]
async fn trigger_passthrough_synthesizes_payload_for_null_input() {
  let (_, engine) = engine_with(StubToolExecutor::new(), echo_code);

  let mut trigger = CronjobTrigger::new("0 * * * *").unwrap();
  trigger.id = "t".to_string();
  let node: Node = trigger.into();

  let passed = engine
    .execute_node(&node, json!({"seed": 1}), CancellationToken::new())
    .await
    .unwrap();
  assert_eq!(passed, json!({"seed": 1}));

  let synthetic = engine
    .execute_node(&node, Value::Null, CancellationToken::new())
    .await
    .unwrap();
  assert_eq!(synthetic["trigger"], json!("executed"));
  assert!(synthetic.get("timestamp").is_some());
}
