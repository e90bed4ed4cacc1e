use chrono::Duration;
use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub portal: PortalConfig,
  /// Static per-project settings keyed by GitLab project path (`group/project`)
  #[serde(default)]
  pub projects: BTreeMap<String, ProjectConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortalConfig {
  /// Portal base used for projects that do not set their own
  pub default_base_url: Option<String>,
  /// Maximum age of a cached progress record
  #[serde(default = "default_hour_secs")]
  pub cache_ttl_secs: u64,
  /// Minimum time between two rounds of refetching cached tickets
  #[serde(default = "default_hour_secs")]
  pub refresh_interval_secs: u64,
  /// How long a project stays blocked after a non-200 answer
  #[serde(default = "default_cooldown_secs")]
  pub block_cooldown_secs: u64,
}

impl Default for PortalConfig {
  fn default() -> Self {
    Self {
      default_base_url: None,
      cache_ttl_secs: default_hour_secs(),
      refresh_interval_secs: default_hour_secs(),
      block_cooldown_secs: default_cooldown_secs(),
    }
  }
}

fn default_hour_secs() -> u64 {
  60 * 60
}

fn default_cooldown_secs() -> u64 {
  5 * 60
}

impl PortalConfig {
  pub fn cache_ttl(&self) -> Duration {
    seconds(self.cache_ttl_secs)
  }

  pub fn refresh_interval(&self) -> Duration {
    seconds(self.refresh_interval_secs)
  }

  pub fn block_cooldown(&self) -> Duration {
    seconds(self.block_cooldown_secs)
  }
}

fn seconds(secs: u64) -> Duration {
  Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX / 1_000))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectConfig {
  /// Numeric project id in the portal
  #[serde(default, deserialize_with = "deserialize_project_id")]
  pub project_id: Option<String>,
  pub portal_base_url: Option<String>,
}

/// Accept the project id as a YAML number or string.
fn deserialize_project_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
  D: serde::Deserializer<'de>,
{
  let value: Option<serde_yaml::Value> = Option::deserialize(deserializer)?;
  Ok(match value {
    Some(serde_yaml::Value::Number(n)) => Some(n.to_string()),
    Some(serde_yaml::Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
    _ => None,
  })
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./portal-progress.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/portal-progress/config.yaml
  ///
  /// Without any file the defaults apply; projects can then be configured
  /// through the durable store.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("portal-progress.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("portal-progress").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    Ok(serde_yaml::from_str(contents)?)
  }

  /// Get the portal session cookie from environment variables.
  ///
  /// Checks PORTAL_PROGRESS_COOKIE first, then PORTAL_SESSION_COOKIE as fallback.
  /// Requests go out without credentials when neither is set.
  pub fn get_session_cookie() -> Option<String> {
    std::env::var("PORTAL_PROGRESS_COOKIE")
      .or_else(|_| std::env::var("PORTAL_SESSION_COOKIE"))
      .ok()
      .filter(|cookie| !cookie.trim().is_empty())
  }
}
