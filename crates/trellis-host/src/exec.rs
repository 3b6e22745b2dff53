//! Tool and code execution seams.
//!
//! The engine never embeds a tool transport or a code sandbox; it talks to
//! these traits. Production hosts put an RPC client or an isolated runtime
//! behind them; tests and dry runs use the stubs below.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::HostError;

/// Executes externally registered tools by identifier.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
  async fn invoke(&self, tool_identifier: &str, input: Value) -> Result<Value, HostError>;
}

/// Runs sandboxed user code.
///
/// `source` is the body of `handle({input, context, state})`; `context`
/// carries engine-provided metadata such as the node id.
#[async_trait]
pub trait CodeExecutor: Send + Sync {
  async fn run(&self, input: Value, source: &str, context: Value) -> Result<Value, HostError>;
}

/// Tool executor answering from a fixed table of canned responses.
#[derive(Debug, Default)]
pub struct StubToolExecutor {
  responses: HashMap<String, Value>,
}

impl StubToolExecutor {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_response(mut self, tool_identifier: impl Into<String>, response: Value) -> Self {
    self.responses.insert(tool_identifier.into(), response);
    self
  }
}

#[async_trait]
impl ToolExecutor for StubToolExecutor {
  async fn invoke(&self, tool_identifier: &str, _input: Value) -> Result<Value, HostError> {
    self
      .responses
      .get(tool_identifier)
      .cloned()
      .ok_or_else(|| HostError::UnknownTool(tool_identifier.to_string()))
  }
}

/// Code executor backed by a closure.
///
/// Lets tests script node behavior without a sandbox runtime.
pub struct FnCodeExecutor<F> {
  handler: F,
}

impl<F> FnCodeExecutor<F>
where
  F: Fn(Value, &str, Value) -> Result<Value, HostError> + Send + Sync,
{
  pub fn new(handler: F) -> Self {
    Self { handler }
  }
}

#[async_trait]
impl<F> CodeExecutor for FnCodeExecutor<F>
where
  F: Fn(Value, &str, Value) -> Result<Value, HostError> + Send + Sync,
{
  async fn run(&self, input: Value, source: &str, context: Value) -> Result<Value, HostError> {
    (self.handler)(input, source, context)
  }
}

/// Code executor that rejects every invocation.
///
/// Used where no sandbox runtime is wired in, such as CLI dry runs.
#[derive(Debug, Default)]
pub struct UnsupportedCodeExecutor;

#[async_trait]
impl CodeExecutor for UnsupportedCodeExecutor {
  async fn run(&self, _input: Value, _source: &str, _context: Value) -> Result<Value, HostError> {
    Err(HostError::Unsupported(
      "code execution requires an external sandbox runtime".to_string(),
    ))
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[tokio::test]
  async fn stub_tool_returns_canned_response() {
    let tools = StubToolExecutor::new().with_response("binance", json!({"price": "42000"}));

    let output = tools.invoke("binance", json!({})).await.unwrap();
    assert_eq!(output, json!({"price": "42000"}));

    let err = tools.invoke("unknown", json!({})).await.unwrap_err();
    assert!(matches!(err, HostError::UnknownTool(_)));
  }

  #[tokio::test]
  async fn fn_code_executor_sees_all_arguments() {
    let code = FnCodeExecutor::new(|input, source, context| {
      assert_eq!(source, "return input;");
      assert_eq!(context["nodeId"], "n1");
      Ok(input)
    });

    let output = code
      .run(json!({"x": 1}), "return input;", json!({"nodeId": "n1"}))
      .await
      .unwrap();
    assert_eq!(output, json!({"x": 1}));
  }
}
