//! Per-project settings: static config overlaid with values stored at runtime.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;
use url::form_urlencoded::byte_serialize;

use super::location::Location;
use crate::cache::{keys, DurableStore};
use crate::config::Config;

/// Everything needed to ask the portal about a project's tickets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSettings {
  /// `group/project` in GitLab
  pub project_path: String,
  /// `<host>|<project_path>`, the key for stored settings
  pub project_key: String,
  /// Numeric project id in the portal
  pub project_id: Option<String>,
  pub portal_base_url: Option<String>,
}

impl ProjectSettings {
  /// Resolve settings for the project a page belongs to.
  ///
  /// Stored values win over the static config table; the portal base falls
  /// back to the configured default.
  pub fn resolve(location: &Location, config: &Config, stored: &StoredConfigs) -> Option<Self> {
    let Some(project_path) = location.project_path.clone() else {
      warn!(host = %location.host, "could not determine GitLab project path");
      return None;
    };
    let project_key = format!("{}|{}", location.host, project_path);
    let configured = config.projects.get(&project_path);
    let saved = stored.get(&project_key).unwrap_or_default();

    if configured.is_none() && saved == StoredProjectConfig::default() {
      warn!(project = %project_path, "no configuration for project");
    }

    let project_id = saved
      .project_id
      .or_else(|| configured.and_then(|c| c.project_id.clone()));
    let portal_base_url = saved
      .portal_base_url
      .or_else(|| configured.and_then(|c| c.portal_base_url.clone()))
      .or_else(|| config.portal.default_base_url.clone());

    Some(Self {
      project_path,
      project_key,
      project_id,
      portal_base_url,
    })
  }

  /// Normalized portal base for this project.
  pub fn portal_base(&self) -> Option<String> {
    self.portal_base_url.as_deref().and_then(normalize_portal_base_url)
  }

  /// Booking-label page for `issue`, or `None` while id or base is missing.
  pub fn portal_url(&self, issue: &str) -> Option<String> {
    let project_id = self.project_id.as_deref().filter(|id| !id.is_empty())?;
    let base = self.portal_base()?;
    if issue.is_empty() {
      return None;
    }
    Some(format!(
      "{}/management/project/{}/booking-label/%23{}/",
      base,
      encode_component(project_id),
      encode_component(issue)
    ))
  }
}

/// Trim, drop trailing slashes, default to `https://`.
pub fn normalize_portal_base_url(value: &str) -> Option<String> {
  let trimmed = value.trim().trim_end_matches('/');
  if trimmed.is_empty() {
    return None;
  }
  let lower = trimmed.to_ascii_lowercase();
  if lower.starts_with("http://") || lower.starts_with("https://") {
    Some(trimmed.to_string())
  } else {
    Some(format!("https://{}", trimmed))
  }
}

fn encode_component(value: &str) -> String {
  byte_serialize(value.as_bytes())
    .collect::<String>()
    .replace('+', "%20")
}

/// Project settings saved at runtime, as stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredProjectConfig {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub project_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub portal_base_url: Option<String>,
}

/// Runtime project settings keyed by project key, kept as one JSON map.
#[derive(Clone)]
pub struct StoredConfigs {
  store: DurableStore,
}

impl StoredConfigs {
  pub fn new(store: DurableStore) -> Self {
    Self { store }
  }

  pub fn get(&self, project_key: &str) -> Option<StoredProjectConfig> {
    self.read_all().remove(project_key)
  }

  /// Overlay the fields set in `update` onto the stored entry.
  pub fn merge(&self, project_key: &str, update: StoredProjectConfig) {
    let mut all = self.read_all();
    let entry = all.entry(project_key.to_string()).or_default();
    if update.project_id.is_some() {
      entry.project_id = update.project_id;
    }
    if update.portal_base_url.is_some() {
      entry.portal_base_url = update.portal_base_url;
    }
    self.store.write_json(keys::PROJECT_CONFIGS, &all);
  }

  fn read_all(&self) -> BTreeMap<String, StoredProjectConfig> {
    self
      .store
      .read_json(keys::PROJECT_CONFIGS)
      .unwrap_or_default()
  }
}

/// Persisted on/off switches.
#[derive(Clone)]
pub struct FeatureFlags {
  store: DurableStore,
}

impl FeatureFlags {
  pub fn new(store: DurableStore) -> Self {
    Self { store }
  }

  /// Verbose logging. On unless switched off.
  pub fn debug(&self) -> bool {
    self.store.read_bool(keys::DEBUG, true)
  }

  pub fn set_debug(&self, enabled: bool) {
    self.store.write_bool(keys::DEBUG, enabled);
  }

  /// Whether progress is shown, and therefore fetched. On unless switched off.
  pub fn show(&self) -> bool {
    self.store.read_bool(keys::SHOW, true)
  }

  pub fn set_show(&self, enabled: bool) {
    self.store.write_bool(keys::SHOW, enabled);
  }
}
