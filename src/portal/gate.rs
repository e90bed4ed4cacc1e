//! Session-wide refresh throttle.
//!
//! One successful portal response "refreshes the clock" for every ticket, so
//! entries expiring at slightly different times do not cause a whole board
//! to be re-fetched one card at a time.

use chrono::Duration;
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::cache::{keys, DurableStore};
use crate::clock::Clock;

pub struct RefreshGate {
  store: DurableStore,
  clock: Arc<dyn Clock>,
  interval: Duration,
  last_refresh: Mutex<Option<i64>>,
}

impl RefreshGate {
  /// Load the last refresh time from the durable store.
  pub fn load(store: DurableStore, clock: Arc<dyn Clock>, interval: Duration) -> Self {
    let last_refresh = store.read_i64(keys::LAST_REFRESH);
    Self {
      store,
      clock,
      interval,
      last_refresh: Mutex::new(last_refresh),
    }
  }

  /// Decide whether a ticket should be fetched from the portal.
  pub fn should_fetch(&self, has_cache_entry: bool, force: bool) -> bool {
    if force || !has_cache_entry {
      return true;
    }
    match self.last_refresh() {
      Some(last) => {
        let elapsed = self.clock.now_ms() - last;
        let stale = elapsed > self.interval.num_milliseconds();
        debug!(elapsed_ms = elapsed, stale, "refresh gate");
        stale
      }
      None => true,
    }
  }

  /// Record that the portal answered with 200 just now.
  pub fn mark_refreshed(&self) {
    let now = self.clock.now_ms();
    *self.lock() = Some(now);
    self.store.write_i64(keys::LAST_REFRESH, now);
  }

  /// Forget the last refresh, in memory and in the store.
  pub fn reset(&self) {
    *self.lock() = None;
    self.store.remove(keys::LAST_REFRESH);
  }

  pub fn last_refresh(&self) -> Option<i64> {
    *self.lock()
  }

  /// Whether the whole cache is too old to be trusted at session start.
  ///
  /// Age is measured from the last successful fetch, or from the newest cache
  /// entry when no fetch was ever recorded. An empty, never-refreshed cache is
  /// not stale.
  pub fn is_globally_stale(&self, newest_entry: Option<i64>, ttl: Duration) -> bool {
    let Some(reference) = self.last_refresh().or(newest_entry) else {
      return false;
    };
    self.clock.now_ms() - reference > ttl.num_milliseconds()
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, Option<i64>> {
    self.last_refresh.lock().unwrap_or_else(|e| e.into_inner())
  }
}
