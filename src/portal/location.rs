//! What a GitLab page URL tells us: project, board and ticket.

use base64::{
  alphabet,
  engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
  Engine,
};
use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use tracing::debug;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
  pub host: String,
  /// `group/project`, from the first two path segments
  pub project_path: Option<String>,
  /// Board id from `/-/boards/<id>`
  pub board_id: Option<String>,
  /// Ticket shown in a drawer (`?show=`) or on an issue page
  pub issue_id: Option<String>,
}

impl Location {
  pub fn parse(raw: &str) -> Result<Self> {
    let url = Url::parse(raw).map_err(|e| eyre!("Invalid GitLab URL {}: {}", raw, e))?;
    let host = url
      .host_str()
      .ok_or_else(|| eyre!("GitLab URL without host: {}", raw))?
      .to_string();

    let segments: Vec<&str> = url
      .path_segments()
      .map(|segments| segments.filter(|s| !s.is_empty()).collect())
      .unwrap_or_default();

    let project_path = match segments.as_slice() {
      [group, project, ..] => Some(format!("{}/{}", group, project)),
      _ => None,
    };

    let board_id = segments
      .windows(3)
      .find(|w| w[0] == "-" && w[1] == "boards" && is_numeric(w[2]))
      .map(|w| w[2].to_string());

    let issue_id = url
      .query_pairs()
      .find(|(name, _)| name == "show")
      .and_then(|(_, value)| issue_from_show_param(&value))
      .or_else(|| {
        segments
          .windows(2)
          .find(|w| w[0] == "issues" && is_numeric(w[1]))
          .map(|w| w[1].to_string())
      });

    Ok(Self {
      host,
      project_path,
      board_id,
      issue_id,
    })
  }

  /// A ticket page or drawer without any board around it.
  pub fn is_detail_view(&self) -> bool {
    self.issue_id.is_some() && self.board_id.is_none()
  }
}

/// Standard alphabet, padding optional.
const SHOW_PARAM: GeneralPurpose = GeneralPurpose::new(
  &alphabet::STANDARD,
  GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

fn is_numeric(s: &str) -> bool {
  !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// The `show` parameter is base64-encoded JSON carrying an `iid`.
fn issue_from_show_param(value: &str) -> Option<String> {
  // Form decoding turned any unescaped `+` into a space.
  let value = value.trim().replace(' ', "+");
  let decoded = match SHOW_PARAM.decode(&value) {
    Ok(decoded) => decoded,
    Err(e) => {
      debug!(error = %e, "show parameter is not base64");
      return None;
    }
  };
  let parsed: Value = serde_json::from_slice(&decoded).ok()?;
  match parsed.get("iid")? {
    Value::String(iid) if !iid.is_empty() => Some(iid.clone()),
    Value::Number(iid) => Some(iid.to_string()),
    _ => None,
  }
}
