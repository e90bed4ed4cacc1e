//! Per-project circuit breaker.
//!
//! A non-200 answer from a project's portal blocks further requests for that
//! project until the cooldown passes or a request succeeds. Expired blocks are
//! dropped when they are next looked at; there is no timer.

use chrono::Duration;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use crate::clock::Clock;

/// Why and since when a project is blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockState {
  pub status: Option<u16>,
  pub blocked_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
  /// Requests allowed
  Open,
  /// Requests suppressed
  Blocked(BlockState),
}

pub struct CircuitBreaker {
  clock: Arc<dyn Clock>,
  cooldown: Duration,
  blocked: Mutex<HashMap<String, BlockState>>,
}

impl CircuitBreaker {
  pub fn new(clock: Arc<dyn Clock>, cooldown: Duration) -> Self {
    Self {
      clock,
      cooldown,
      blocked: Mutex::new(HashMap::new()),
    }
  }

  /// Current state for `project`, evicting a block older than the cooldown.
  pub fn state(&self, project: &str) -> BreakerState {
    let mut blocked = self.lock();
    let Some(block) = blocked.get(project).copied() else {
      return BreakerState::Open;
    };
    if self.expired(&block, self.clock.now_ms()) {
      blocked.remove(project);
      debug!(project, "block cooled down");
      return BreakerState::Open;
    }
    BreakerState::Blocked(block)
  }

  #[cfg(test)]
  pub fn is_blocked(&self, project: &str) -> bool {
    matches!(self.state(project), BreakerState::Blocked(_))
  }

  /// Block `project` after an abnormal response.
  ///
  /// Returns `true` only on the transition into the blocked state, so callers
  /// notify the user once per block.
  pub fn trip(&self, project: &str, status: Option<u16>) -> bool {
    let now = self.clock.now_ms();
    let mut blocked = self.lock();
    if let Some(block) = blocked.get(project) {
      if !self.expired(block, now) {
        return false;
      }
    }
    blocked.insert(
      project.to_string(),
      BlockState {
        status,
        blocked_at: now,
      },
    );
    info!(project, ?status, "portal requests blocked");
    true
  }

  fn expired(&self, block: &BlockState, now: i64) -> bool {
    now - block.blocked_at > self.cooldown.num_milliseconds()
  }

  /// Unblock `project`, e.g. after a successful fetch or a forced refresh.
  pub fn reset(&self, project: &str) {
    if self.lock().remove(project).is_some() {
      info!(project, "portal requests unblocked");
    }
  }

  pub fn reset_all(&self) {
    self.lock().clear();
  }

  fn lock(&self) -> MutexGuard<'_, HashMap<String, BlockState>> {
    self.blocked.lock().unwrap_or_else(|e| e.into_inner())
  }
}
