//! Key-value state shared across workflow runs.
//!
//! Entries written by upsert-state nodes persist between runs; the engine
//! reads a snapshot when rendering fixed-input templates. Adapters over
//! remote backends implement [`StateClient`]; [`NamespacedStateClient`]
//! scopes any client to one namespace (typically the owning user id).

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::HostError;

/// Async key-value store.
#[async_trait]
pub trait StateClient: Send + Sync {
  async fn set(&self, key: &str, value: Value) -> Result<(), HostError>;

  async fn get(&self, key: &str) -> Result<Option<Value>, HostError>;

  async fn delete(&self, key: &str) -> Result<(), HostError>;

  async fn clear(&self) -> Result<(), HostError>;

  async fn get_all(&self) -> Result<serde_json::Map<String, Value>, HostError>;
}

/// In-memory state client.
///
/// Suitable for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct MemoryStateClient {
  entries: RwLock<HashMap<String, Value>>,
}

impl MemoryStateClient {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl StateClient for MemoryStateClient {
  async fn set(&self, key: &str, value: Value) -> Result<(), HostError> {
    self.entries.write().await.insert(key.to_string(), value);
    Ok(())
  }

  async fn get(&self, key: &str) -> Result<Option<Value>, HostError> {
    Ok(self.entries.read().await.get(key).cloned())
  }

  async fn delete(&self, key: &str) -> Result<(), HostError> {
    self.entries.write().await.remove(key);
    Ok(())
  }

  async fn clear(&self) -> Result<(), HostError> {
    self.entries.write().await.clear();
    Ok(())
  }

  async fn get_all(&self) -> Result<serde_json::Map<String, Value>, HostError> {
    Ok(
      self
        .entries
        .read()
        .await
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect(),
    )
  }
}

/// Scopes another state client to a namespace.
///
/// Keys are stored as `{namespace}:{key}`; `get_all` strips the prefix and
/// `clear` removes only this namespace's entries.
pub struct NamespacedStateClient<C> {
  inner: C,
  prefix: String,
}

impl<C: StateClient> NamespacedStateClient<C> {
  pub fn new(inner: C, namespace: impl Into<String>) -> Self {
    Self {
      inner,
      prefix: format!("{}:", namespace.into()),
    }
  }

  fn scoped(&self, key: &str) -> String {
    format!("{}{key}", self.prefix)
  }
}

#[async_trait]
impl<C: StateClient> StateClient for NamespacedStateClient<C> {
  async fn set(&self, key: &str, value: Value) -> Result<(), HostError> {
    self.inner.set(&self.scoped(key), value).await
  }

  async fn get(&self, key: &str) -> Result<Option<Value>, HostError> {
    self.inner.get(&self.scoped(key)).await
  }

  async fn delete(&self, key: &str) -> Result<(), HostError> {
    self.inner.delete(&self.scoped(key)).await
  }

  async fn clear(&self) -> Result<(), HostError> {
    for key in self.inner.get_all().await?.keys() {
      if key.starts_with(&self.prefix) {
        self.inner.delete(key).await?;
      }
    }
    Ok(())
  }

  async fn get_all(&self) -> Result<serde_json::Map<String, Value>, HostError> {
    Ok(
      self
        .inner
        .get_all()
        .await?
        .into_iter()
        .filter_map(|(key, value)| {
          key
            .strip_prefix(&self.prefix)
            .map(|stripped| (stripped.to_string(), value))
        })
        .collect(),
    )
  }
}
