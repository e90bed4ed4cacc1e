//! Hour quantities as the portal prints them: `"16.25h"`, `"72,25 h"`,
//! stacked bookings like `"2.5 1,75"`.

use regex::Regex;
use std::sync::LazyLock;

static HOUR_NUMBER: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"-?[\d.]+").expect("hour number pattern"));

/// Longest `[-]digits[.digits]` prefix of a [`HOUR_NUMBER`] match.
static FLOAT_PREFIX: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^-?(?:[0-9]+\.?[0-9]*|\.[0-9]+)").expect("float prefix pattern"));

/// Standalone hour token; the trailing group stands in for a lookahead.
static HOUR_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"(?-u:\b)([0-9]{1,2}(?:[.,][0-9]{1,2})?)(?:[^0-9.,]|$)").expect("hour token pattern")
});

static GERMAN_LABEL: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(?i)Gebuchte\s+Stunden").expect("german label pattern"));

static ENGLISH_LABEL: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(?i)Booked\s+Hours").expect("english label pattern"));

/// Collapse whitespace runs to single spaces and trim.
pub fn normalize_whitespace(text: &str) -> String {
  text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Pull the first number out of a free-text hour value.
///
/// The first comma is read as a decimal separator. Trailing garbage after the
/// number is ignored (`"1.5.2h"` is `1.5`).
pub fn extract_hour_number(text: &str) -> Option<f64> {
  if text.is_empty() {
    return None;
  }
  let normalized = text.replacen(',', ".", 1);
  let found = HOUR_NUMBER.find(&normalized)?;
  let number = FLOAT_PREFIX.find(found.as_str())?;
  number.as_str().trim_end_matches('.').parse().ok()
}

/// Canonical `<number>h` rendering of an hour quantity.
///
/// Trailing fractional zeros are dropped and negative zero becomes `"0h"`.
pub fn format_hours_value(hours: f64) -> Option<String> {
  if !hours.is_finite() {
    return None;
  }
  let mut rendered = hours.to_string();
  if rendered.contains('.') {
    rendered = rendered.trim_end_matches('0').trim_end_matches('.').to_string();
  }
  if rendered == "-0" {
    rendered = "0".to_string();
  }
  Some(format!("{}h", rendered))
}

/// Reformat any numeric-bearing string into canonical `<number>h`.
pub fn format_hours(text: &str) -> Option<String> {
  extract_hour_number(text).and_then(format_hours_value)
}

/// Sum every standalone hour token (`1-2 digits`, optional `.`/`,` and
/// `1-2 decimals`) in `text`.
///
/// A token must start on a word boundary and must not be followed by another
/// digit, dot or comma, so `"123"`, `"12.345"` and dates like `"01.02.2024"`
/// contribute nothing.
pub fn sum_hour_numbers(text: &str) -> Option<f64> {
  let tokens = hour_tokens(text);
  if tokens.is_empty() {
    return None;
  }
  Some(tokens.iter().sum())
}

fn hour_tokens(text: &str) -> Vec<f64> {
  HOUR_TOKEN
    .captures_iter(text)
    .filter_map(|caps| caps[1].replace(',', ".").parse().ok())
    .collect()
}

/// Recognize a "booked hours" label, German first.
pub fn detect_booked_label(text: &str) -> Option<&'static str> {
  if GERMAN_LABEL.is_match(text) {
    return Some("Gebuchte Stunden");
  }
  if ENGLISH_LABEL.is_match(text) {
    return Some("Booked Hours");
  }
  None
}
