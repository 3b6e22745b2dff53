//! Trellis Compiler
//!
//! Validates a workflow before execution: structural invariants, tool
//! existence against an external registry, and recursive schema
//! compatibility along tool-to-tool edges. Each stage has its own
//! [`CompileError`] class so callers can surface the issues verbatim.

mod compat;
mod compiler;
mod error;
mod registry;

pub use compat::{SchemaCheck, check_compatibility};
pub use compiler::Compiler;
pub use error::CompileError;
pub use registry::{RegistryError, StaticToolRegistry, ToolExistence, ToolRegistry};
