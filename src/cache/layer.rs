//! The progress cache: board-scoped TTL entries mirrored to the durable store.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

use super::storage::{keys, DurableStore};
use crate::clock::Clock;
use crate::portal::types::{CacheKey, ProgressRecord};

/// A cached record and when it was fetched (epoch ms).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
  pub data: ProgressRecord,
  pub timestamp: i64,
}

/// Outcome of an exact-key lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
  /// Entry within its TTL
  Fresh(CacheEntry),
  /// An entry existed but was too old; it has been evicted
  Expired,
  /// Nothing cached under this key
  Missing,
}

/// Cache store for progress records.
///
/// Entries are replaced wholesale, never merged. Expired entries are evicted
/// when read. Every write persists the whole map after merging it with what
/// is currently in the durable store, so concurrent writers sharing a store
/// do not drop each other's entries.
pub struct ProgressCache {
  store: DurableStore,
  clock: Arc<dyn Clock>,
  ttl: Duration,
  entries: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl ProgressCache {
  /// Load the persisted snapshot, keeping only entries still within the TTL,
  /// and write the pruned snapshot back.
  pub fn load(store: DurableStore, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
    let cache = Self {
      store,
      clock,
      ttl,
      entries: Mutex::new(HashMap::new()),
    };
    {
      let mut entries = cache.lock();
      *entries = cache.read_snapshot();
      debug!(entries = entries.len(), "progress cache loaded");
      cache.write_snapshot(&entries);
    }
    cache
  }

  /// Record for `key` if it is within the TTL.
  #[cfg(test)]
  pub fn get(&self, key: &CacheKey) -> Option<ProgressRecord> {
    match self.lookup(key) {
      Lookup::Fresh(entry) => Some(entry.data),
      Lookup::Expired | Lookup::Missing => None,
    }
  }

  /// Exact-key lookup that reports whether an expired entry was evicted.
  pub fn lookup(&self, key: &CacheKey) -> Lookup {
    let mut entries = self.lock();
    let Some(entry) = entries.get(key) else {
      return Lookup::Missing;
    };
    if self.is_fresh(entry) {
      return Lookup::Fresh(entry.clone());
    }
    entries.remove(key);
    debug!(%key, "evicted expired cache entry");
    Lookup::Expired
  }

  /// Store `record` under `key` with a fresh timestamp and persist.
  pub fn set(&self, key: CacheKey, record: ProgressRecord) {
    let entry = CacheEntry {
      data: record,
      timestamp: self.clock.now_ms(),
    };
    let mut entries = self.lock();
    entries.insert(key, entry);

    for (stored_key, stored) in self.read_snapshot() {
      let newer = entries
        .get(&stored_key)
        .map_or(true, |current| stored.timestamp > current.timestamp);
      if newer {
        entries.insert(stored_key, stored);
      }
    }
    self.write_snapshot(&entries);
  }

  /// Drop every entry and the persisted snapshot.
  pub fn clear(&self) {
    self.lock().clear();
    self.store.remove(keys::CACHE_SNAPSHOT);
  }

  /// Freshest live entry for the ticket on any board.
  ///
  /// Detail pages may render outside a board, so they accept whichever board
  /// the ticket was last seen on. Matching is on the parsed project and issue,
  /// never on a string suffix.
  pub fn find_any_board_match(&self, project: &str, issue: &str) -> Option<CacheEntry> {
    let entries = self.lock();
    entries
      .iter()
      .filter(|(key, entry)| key.same_ticket(project, issue) && self.is_fresh(entry))
      .max_by_key(|(_, entry)| entry.timestamp)
      .map(|(_, entry)| entry.clone())
  }

  /// Timestamp of the most recently written entry.
  pub fn newest_timestamp(&self) -> Option<i64> {
    self.lock().values().map(|entry| entry.timestamp).max()
  }

  pub fn len(&self) -> usize {
    self.lock().len()
  }

  fn is_fresh(&self, entry: &CacheEntry) -> bool {
    self.clock.now_ms() - entry.timestamp <= self.ttl.num_milliseconds()
  }

  /// Valid, live entries from the durable snapshot. Entries with a bad key or
  /// missing fields are skipped; a corrupt snapshot reads as empty.
  fn read_snapshot(&self) -> HashMap<CacheKey, CacheEntry> {
    let Some(raw) = self.store.read_json::<Map<String, Value>>(keys::CACHE_SNAPSHOT) else {
      return HashMap::new();
    };
    raw
      .into_iter()
      .filter_map(|(key, value)| {
        let key = match key.parse::<CacheKey>() {
          Ok(key) => key,
          Err(e) => {
            warn!(error = %e, "dropping cache entry with unknown key");
            return None;
          }
        };
        match serde_json::from_value::<CacheEntry>(value) {
          Ok(entry) => Some((key, entry)),
          Err(e) => {
            warn!(%key, error = %e, "dropping malformed cache entry");
            None
          }
        }
      })
      .filter(|(_, entry)| self.is_fresh(entry))
      .collect()
  }

  fn write_snapshot(&self, entries: &HashMap<CacheKey, CacheEntry>) {
    let snapshot: Map<String, Value> = entries
      .iter()
      .filter_map(|(key, entry)| {
        serde_json::to_value(entry)
          .ok()
          .map(|value| (key.to_string(), value))
      })
      .collect();
    self.store.write_json(keys::CACHE_SNAPSHOT, &snapshot);
  }

  fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, CacheEntry>> {
    self.entries.lock().unwrap_or_else(|e| e.into_inner())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStore;
  use crate::clock::ManualClock;

  const T0: i64 = 1_700_000_000_000;

  fn setup() -> (Arc<ManualClock>, DurableStore, ProgressCache) {
    let clock = Arc::new(ManualClock::at_ms(T0));
    let store = DurableStore::new(Arc::new(MemoryStore::new()));
    let cache = ProgressCache::load(store.clone(), clock.clone(), Duration::hours(1));
    (clock, store, cache)
  }

  fn record() -> ProgressRecord {
    ProgressRecord::progress("12h", Some("4h".into()))
  }

  #[test]
  fn test_set_then_get_roundtrip() {
    let (_, _, cache) = setup();
    let key = CacheKey::new("3", "42", "7");
    cache.set(key.clone(), record());
    assert_eq!(cache.get(&key), Some(record()));
  }

  #[test]
  fn test_ttl_boundary() {
    let (clock, _, cache) = setup();
    let key = CacheKey::new("3", "42", "7");
    cache.set(key.clone(), record());

    clock.advance(Duration::hours(1) - Duration::milliseconds(1));
    assert_eq!(cache.get(&key), Some(record()));

    clock.advance(Duration::milliseconds(2));
    assert_eq!(cache.lookup(&key), Lookup::Expired);
    assert_eq!(cache.lookup(&key), Lookup::Missing);
  }

  #[test]
  fn test_set_replaces_entry() {
    let (clock, _, cache) = setup();
    let key = CacheKey::new("3", "42", "7");
    cache.set(key.clone(), record());
    clock.advance(Duration::minutes(1));
    cache.set(key.clone(), ProgressRecord::over("1h"));
    assert_eq!(cache.get(&key), Some(ProgressRecord::over("1h")));
    assert_eq!(cache.len(), 1);
  }

  #[test]
  fn test_reload_keeps_only_live_entries() {
    let (clock, store, cache) = setup();
    cache.set(CacheKey::new("3", "42", "1"), record());
    clock.advance(Duration::minutes(50));
    cache.set(CacheKey::new("3", "42", "2"), record());
    clock.advance(Duration::minutes(20));

    let reloaded = ProgressCache::load(store.clone(), clock.clone(), Duration::hours(1));
    assert_eq!(reloaded.len(), 1);
    assert!(reloaded.get(&CacheKey::new("3", "42", "2")).is_some());

    let persisted: Map<String, Value> = store.read_json(keys::CACHE_SNAPSHOT).unwrap();
    assert_eq!(persisted.len(), 1);
  }

  #[test]
  fn test_malformed_entries_are_dropped() {
    let clock = Arc::new(ManualClock::at_ms(T0));
    let store = DurableStore::new(Arc::new(MemoryStore::new()));
    let good = serde_json::json!({ "data": record(), "timestamp": T0 });
    let snapshot = serde_json::json!({
      "board:3|42:1": good,
      "board:3|42:2": { "data": record() },
      "board:3|42:3": { "timestamp": T0 },
      "garbage": good,
    });
    store.write_json(keys::CACHE_SNAPSHOT, &snapshot);

    let cache = ProgressCache::load(store.clone(), clock, Duration::hours(1));
    assert_eq!(cache.len(), 1);
    let persisted: Map<String, Value> = store.read_json(keys::CACHE_SNAPSHOT).unwrap();
    assert_eq!(persisted.keys().collect::<Vec<_>>(), ["board:3|42:1"]);
  }

  #[test]
  fn test_corrupt_snapshot_is_discarded() {
    let clock = Arc::new(ManualClock::at_ms(T0));
    let store = DurableStore::new(Arc::new(MemoryStore::new()));
    store.set(keys::CACHE_SNAPSHOT, "{\"board:3|42:1\": {");
    let cache = ProgressCache::load(store, clock, Duration::hours(1));
    assert_eq!(cache.len(), 0);
  }

  #[test]
  fn test_concurrent_writers_keep_each_others_entries() {
    let clock = Arc::new(ManualClock::at_ms(T0));
    let store = DurableStore::new(Arc::new(MemoryStore::new()));
    let first = ProgressCache::load(store.clone(), clock.clone(), Duration::hours(1));
    let second = ProgressCache::load(store.clone(), clock.clone(), Duration::hours(1));

    first.set(CacheKey::new("3", "42", "1"), record());
    second.set(CacheKey::new("3", "42", "2"), record());

    let reloaded = ProgressCache::load(store, clock, Duration::hours(1));
    assert_eq!(reloaded.len(), 2);
  }

  #[test]
  fn test_clear_removes_snapshot() {
    let (clock, store, cache) = setup();
    cache.set(CacheKey::new("3", "42", "1"), record());
    cache.clear();
    assert_eq!(cache.len(), 0);
    assert_eq!(store.get(keys::CACHE_SNAPSHOT), None);
    assert_eq!(ProgressCache::load(store, clock, Duration::hours(1)).len(), 0);
  }

  #[test]
  fn test_find_any_board_match() {
    let (clock, _, cache) = setup();
    cache.set(CacheKey::new("1", "42", "7"), record());
    clock.advance(Duration::minutes(5));
    cache.set(CacheKey::new("2", "42", "7"), ProgressRecord::over("3h"));
    cache.set(CacheKey::new("2", "142", "7"), ProgressRecord::over("9h"));

    let found = cache.find_any_board_match("42", "7").unwrap();
    assert_eq!(found.data, ProgressRecord::over("3h"));
    assert!(cache.find_any_board_match("2", "7").is_none());

    clock.advance(Duration::minutes(61));
    assert!(cache.find_any_board_match("42", "7").is_none());
  }
}
