//! Defensive wrapper around the durable key-value collaborator, plus an
//! in-memory implementation.

use color_eyre::{eyre::eyre, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::warn;

use super::traits::KeyValueStore;

/// Keys used in the durable store.
pub mod keys {
  pub const DEBUG: &str = "portal_progress.debug";
  pub const SHOW: &str = "portal_progress.show";
  pub const PROJECT_CONFIGS: &str = "portal_progress.project_configs";
  pub const LAST_BOARD_ID: &str = "portal_progress.last_board_id";
  pub const LAST_REFRESH: &str = "portal_progress.last_refresh";
  pub const CACHE_SNAPSHOT: &str = "portal_progress.cache";
}

/// Durable store that never fails.
///
/// Read errors and unparseable values come back as `None`, write errors are
/// logged and dropped.
#[derive(Clone)]
pub struct DurableStore {
  inner: Arc<dyn KeyValueStore>,
}

impl DurableStore {
  pub fn new(inner: Arc<dyn KeyValueStore>) -> Self {
    Self { inner }
  }

  pub fn get(&self, key: &str) -> Option<String> {
    match self.inner.get_string(key) {
      Ok(value) => value,
      Err(e) => {
        warn!(key, error = %e, "durable store read failed");
        None
      }
    }
  }

  pub fn set(&self, key: &str, value: &str) {
    if let Err(e) = self.inner.set_string(key, value) {
      warn!(key, error = %e, "durable store write failed");
    }
  }

  pub fn remove(&self, key: &str) {
    if let Err(e) = self.inner.remove_string(key) {
      warn!(key, error = %e, "durable store remove failed");
    }
  }

  /// Booleans are stored as `"1"` / `"0"`.
  pub fn read_bool(&self, key: &str, default: bool) -> bool {
    match self.get(key) {
      Some(value) => value == "1",
      None => default,
    }
  }

  pub fn write_bool(&self, key: &str, value: bool) {
    self.set(key, if value { "1" } else { "0" });
  }

  pub fn read_i64(&self, key: &str) -> Option<i64> {
    self.get(key)?.trim().parse().ok()
  }

  pub fn write_i64(&self, key: &str, value: i64) {
    self.set(key, &value.to_string());
  }

  /// Read a JSON value; corrupt JSON is treated as absent.
  pub fn read_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
    let raw = self.get(key)?;
    match serde_json::from_str(&raw) {
      Ok(value) => Some(value),
      Err(e) => {
        warn!(key, error = %e, "discarding corrupt JSON in durable store");
        None
      }
    }
  }

  pub fn write_json<T: Serialize>(&self, key: &str, value: &T) {
    match serde_json::to_string(value) {
      Ok(raw) => self.set(key, &raw),
      Err(e) => warn!(key, error = %e, "failed to serialize value for durable store"),
    }
  }
}

/// Process-local store. Used when persistence is disabled and in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
  values: Mutex<HashMap<String, String>>,
  fail_writes: bool,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// A store whose writes always fail, as a full quota would.
  #[cfg(test)]
  pub fn read_only() -> Self {
    Self {
      values: Mutex::new(HashMap::new()),
      fail_writes: true,
    }
  }
}

impl KeyValueStore for MemoryStore {
  fn get_string(&self, key: &str) -> Result<Option<String>> {
    let values = self
      .values
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(values.get(key).cloned())
  }

  fn set_string(&self, key: &str, value: &str) -> Result<()> {
    if self.fail_writes {
      return Err(eyre!("Store is read-only"));
    }
    let mut values = self
      .values
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    values.insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove_string(&self, key: &str) -> Result<()> {
    let mut values = self
      .values
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    values.remove(key);
    Ok(())
  }
}
