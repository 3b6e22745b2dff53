//! Tool registry seam used at compile time.

use std::collections::HashSet;

use async_trait::async_trait;
use thiserror::Error;

/// Result of a tool existence check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolExistence {
  /// Identifiers that are not registered.
  pub missing_tools: Vec<String>,
}

#[derive(Debug, Error)]
pub enum RegistryError {
  #[error("tool registry unavailable: {0}")]
  Unavailable(String),
}

/// Answers which tool identifiers exist.
///
/// Production registries sit in front of a remote catalog; compilation only
/// needs the existence check.
#[async_trait]
pub trait ToolRegistry: Send + Sync {
  async fn check_existence(&self, identifiers: &[String]) -> Result<ToolExistence, RegistryError>;
}

/// Registry backed by a fixed set of known identifiers.
#[derive(Debug, Default)]
pub struct StaticToolRegistry {
  known: HashSet<String>,
}

impl StaticToolRegistry {
  pub fn new(known: impl IntoIterator<Item = impl Into<String>>) -> Self {
    Self {
      known: known.into_iter().map(Into::into).collect(),
    }
  }
}

#[async_trait]
impl ToolRegistry for StaticToolRegistry {
  async fn check_existence(&self, identifiers: &[String]) -> Result<ToolExistence, RegistryError> {
    Ok(ToolExistence {
      missing_tools: identifiers
        .iter()
        .filter(|id| !self.known.contains(*id))
        .cloned()
        .collect(),
    })
  }
}
