use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::hours::extract_hour_number;

/// Default label attached to a booked-hours total when none was detected.
pub const DEFAULT_BOOKED_LABEL: &str = "Booked Hours";

/// Hours data extracted from the portal for one ticket.
///
/// Values keep the portal's unit suffix (`"16.25h"`); numbers are derived on
/// demand.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
  pub spent: Option<String>,
  pub remaining: Option<String>,
  pub over: Option<String>,
  pub booked: Option<String>,
  pub booked_label: Option<String>,
}

impl ProgressRecord {
  /// Normal two-value progress. `remaining` is absent for single-bar widgets.
  pub fn progress(spent: impl Into<String>, remaining: Option<String>) -> Self {
    Self {
      spent: Some(spent.into()),
      remaining,
      ..Self::default()
    }
  }

  /// Over-budget progress, sign already stripped.
  pub fn over(over: impl Into<String>) -> Self {
    Self {
      over: Some(over.into()),
      ..Self::default()
    }
  }

  /// Only a labelled booked total was found.
  pub fn booked(booked: impl Into<String>, label: impl Into<String>) -> Self {
    Self {
      booked: Some(booked.into()),
      booked_label: Some(label.into()),
      ..Self::default()
    }
  }

  /// Attach a booked total as supplementary information.
  pub fn with_booked(mut self, booked: String, label: String) -> Self {
    self.booked = Some(booked);
    self.booked_label = Some(label);
    self
  }

  /// True when only the booked total is known.
  pub fn is_booked_only(&self) -> bool {
    self.booked.is_some() && self.spent.is_none() && self.remaining.is_none() && self.over.is_none()
  }

  pub fn spent_hours(&self) -> Option<f64> {
    self.spent.as_deref().and_then(extract_hour_number)
  }

  pub fn remaining_hours(&self) -> Option<f64> {
    self.remaining.as_deref().and_then(extract_hour_number)
  }

  pub fn over_hours(&self) -> Option<f64> {
    self.over.as_deref().and_then(extract_hour_number)
  }

  pub fn booked_hours(&self) -> Option<f64> {
    self.booked.as_deref().and_then(extract_hour_number)
  }

  /// Share of the bar taken by spent hours, clamped to 5..=95 so both
  /// segments stay visible. Zero when nothing was spent or the total is unknown.
  pub fn spent_percent(&self) -> f64 {
    let (Some(spent), Some(remaining)) = (self.spent_hours(), self.remaining_hours()) else {
      return 0.0;
    };
    let total = spent + remaining;
    if spent <= 0.0 || total <= 0.0 {
      return 0.0;
    }
    (spent / total * 100.0).clamp(5.0, 95.0)
  }

  /// One-line rendering, as shown in the progress badge.
  pub fn summary(&self) -> String {
    if self.is_booked_only() {
      let label = self.booked_label.as_deref().unwrap_or(DEFAULT_BOOKED_LABEL);
      return format!("{}: {}", label, self.booked.as_deref().unwrap_or_default());
    }
    if let Some(over) = &self.over {
      return format!("Over: {}", over);
    }
    format!(
      "{} / {}",
      self.spent.as_deref().unwrap_or("—"),
      self.remaining.as_deref().unwrap_or("—")
    )
  }
}

/// Board-scoped cache identity: `board:<board>|<project>:<issue>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
  pub board: String,
  pub project: String,
  pub issue: String,
}

impl CacheKey {
  pub fn new(board: impl Into<String>, project: impl Into<String>, issue: impl Into<String>) -> Self {
    Self {
      board: board.into(),
      project: project.into(),
      issue: issue.into(),
    }
  }

  /// Same ticket, ignoring which board it was seen on.
  pub fn same_ticket(&self, project: &str, issue: &str) -> bool {
    self.project == project && self.issue == issue
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "board:{}|{}:{}", self.board, self.project, self.issue)
  }
}

impl FromStr for CacheKey {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let rest = s
      .strip_prefix("board:")
      .ok_or_else(|| format!("cache key without board prefix: {}", s))?;
    let (board, ticket) = rest
      .rsplit_once('|')
      .ok_or_else(|| format!("cache key without ticket part: {}", s))?;
    let (project, issue) = ticket
      .rsplit_once(':')
      .ok_or_else(|| format!("cache key without issue id: {}", s))?;
    if project.is_empty() || issue.is_empty() {
      return Err(format!("cache key with empty identity: {}", s));
    }
    Ok(Self::new(board, project, issue))
  }
}
