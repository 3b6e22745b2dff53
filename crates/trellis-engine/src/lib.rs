//! Trellis Engine
//!
//! Executes workflow trees: a breadth-first interpreter that threads data
//! between nodes, coordinates conditional fan-in, dispatches tool and code
//! invocations to abstract executors, and reads and writes the state store.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      WorkflowRunner                         │
//! │  - owns mpsc channel (sender + receiver)                    │
//! │  - dispatch(user_context) queues a run                      │
//! │  - start(cancel) serves the dispatch loop                   │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Engine                             │
//! │  - execute(workflow, user_context, cancel) → last output    │
//! │  - BFS queue, fan-in tracking, per-kind evaluation          │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       trellis-host                          │
//! │  - ToolExecutor / CodeExecutor / StateClient                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! A run is single-threaded and cooperative: nodes execute one at a time in
//! the order they become ready, suspending only while a tool call, code
//! invocation, or state operation is in flight. Cancellation is checked
//! between nodes and raced against every external call. The run's result
//! is the output of the temporally last node that completed.

mod engine;
mod error;
mod events;
mod runner;

pub use engine::Engine;
pub use error::ExecutionError;
pub use events::{ChannelNotifier, ExecutionEvent, ExecutionNotifier, NoopNotifier};
pub use runner::WorkflowRunner;
