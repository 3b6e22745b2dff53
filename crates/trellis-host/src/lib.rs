//! Trellis Host
//!
//! The interfaces the execution engine talks to: tool invocation, sandboxed
//! code execution, and the key-value state store. The engine holds trait
//! objects and never inspects implementations; this crate also ships the
//! in-memory state client, a namespacing adapter, and scriptable stubs used
//! by tests and CLI dry runs.

mod error;
mod exec;
mod state;

pub use error::HostError;
pub use exec::{
  CodeExecutor, FnCodeExecutor, StubToolExecutor, ToolExecutor, UnsupportedCodeExecutor,
};
pub use state::{MemoryStateClient, NamespacedStateClient, StateClient};
