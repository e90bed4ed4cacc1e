//! Core traits and types for the caching system.

use chrono::{DateTime, Utc};
use color_eyre::Result;

/// Durable string key-value collaborator.
///
/// Implementations are synchronous and may fail; callers go through
/// [`super::DurableStore`], which turns every failure into "absent".
pub trait KeyValueStore: Send + Sync {
  /// Read the value stored under `key`, if any.
  fn get_string(&self, key: &str) -> Result<Option<String>>;

  /// Store `value` under `key`, replacing any previous value.
  fn set_string(&self, key: &str, value: &str) -> Result<()>;

  /// Remove `key`. Removing a missing key is not an error.
  fn remove_string(&self, key: &str) -> Result<()>;
}

/// Result handed back to the presentation layer, with metadata about the source.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from fresh network data.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  /// Create a new cache result from an exact-key cache hit.
  pub fn from_cache(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::CacheFresh,
      cached_at: Some(cached_at),
    }
  }

  /// Create a new cache result borrowed from another board's entry.
  pub fn from_other_board(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::OtherBoard,
      cached_at: Some(cached_at),
    }
  }
}

/// Indicates where returned data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from the portal
  Network,
  /// Cache hit on the exact board-scoped key
  CacheFresh,
  /// Detail-view hit on an entry written while the ticket sat on some board
  OtherBoard,
}

impl CacheSource {
  pub fn label(&self) -> &'static str {
    match self {
      Self::Network => "portal",
      Self::CacheFresh => "cache",
      Self::OtherBoard => "cache (other board)",
    }
  }
}
