//! Extraction of a [`ProgressRecord`] from the portal's booking-label HTML.
//!
//! The page either carries a progress widget (`div.progress` with one bar per
//! value) or, for tickets without an estimate, only a "booked hours" label
//! somewhere near its value. The label lookup is an ordered list of
//! [`Strategy`] values; the first one that yields a usable hour value wins.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use tracing::debug;

use super::hours::{
  detect_booked_label, format_hours, format_hours_value, normalize_whitespace, sum_hour_numbers,
};
use super::types::{ProgressRecord, DEFAULT_BOOKED_LABEL};

fn selector(css: &str) -> Selector {
  Selector::parse(css).expect("static selector")
}

static PROGRESS_LOWER: LazyLock<Selector> = LazyLock::new(|| selector("div.progress"));
static PROGRESS_UPPER: LazyLock<Selector> = LazyLock::new(|| selector("div.Progress"));
static PROGRESS_BAR: LazyLock<Selector> = LazyLock::new(|| selector("div.progress-bar"));
static ANY_DIV: LazyLock<Selector> = LazyLock::new(|| selector("div"));
static TEXT_BEARING: LazyLock<Selector> =
  LazyLock::new(|| selector("th, td, div, span, p, label"));
static TABLE_ROW: LazyLock<Selector> = LazyLock::new(|| selector("tr"));
static TABLE_CELL: LazyLock<Selector> = LazyLock::new(|| selector("th, td"));
static DATA_CELL: LazyLock<Selector> = LazyLock::new(|| selector("td"));

static INLINE_LABEL: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"(?i)(Gebuchte\s+Stunden|Booked\s+Hours)\s*:\s*(.+)$").expect("inline label pattern")
});

/// A labelled booked-hours total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookedHours {
  pub value: String,
  pub label: &'static str,
}

/// One named way of finding the booked-hours total in a document.
pub struct Strategy {
  pub name: &'static str,
  pub try_extract: fn(&Html) -> Option<BookedHours>,
}

/// Booked-hours strategies in priority order.
pub const BOOKED_STRATEGIES: &[Strategy] = &[
  Strategy {
    name: "inline label",
    try_extract: inline_label_value,
  },
  Strategy {
    name: "table row",
    try_extract: table_row_value,
  },
  Strategy {
    name: "sibling",
    try_extract: sibling_value,
  },
];

/// Parse a booking-label page into a progress record.
///
/// Returns `None` when neither a progress widget nor a booked-hours label
/// with a usable value is present (login pages, tickets without bookings).
pub fn extract(html: &str) -> Option<ProgressRecord> {
  let doc = Html::parse_document(html);

  let Some(container) = doc
    .select(&PROGRESS_LOWER)
    .next()
    .or_else(|| doc.select(&PROGRESS_UPPER).next())
  else {
    debug!("no progress container, falling back to booked hours");
    return booked_only(&doc);
  };

  let segments = segment_texts(container);
  let record = match segments.as_slice() {
    [] => {
      debug!("progress container without text segments, falling back to booked hours");
      return booked_only(&doc);
    }
    [single] => match single.strip_prefix('-') {
      Some(_) => ProgressRecord::over(single.trim_start_matches('-')),
      None => ProgressRecord::progress(single.clone(), None),
    },
    [spent, remaining, ..] => ProgressRecord::progress(spent.clone(), Some(remaining.clone())),
  };

  Some(match find_booked(&doc) {
    Some(booked) => record.with_booked(booked.value, booked.label.to_string()),
    None => record,
  })
}

/// Run the booked-hours strategies in order.
pub fn find_booked(doc: &Html) -> Option<BookedHours> {
  BOOKED_STRATEGIES.iter().find_map(|strategy| {
    let found = (strategy.try_extract)(doc)?;
    debug!(strategy = strategy.name, value = %found.value, label = found.label, "booked hours found");
    Some(found)
  })
}

fn booked_only(doc: &Html) -> Option<ProgressRecord> {
  let booked = find_booked(doc)?;
  Some(ProgressRecord::booked(booked.value, booked.label))
}

/// Non-empty, whitespace-normalized texts of the bar segments.
fn segment_texts(container: ElementRef<'_>) -> Vec<String> {
  let mut bars: Vec<ElementRef<'_>> = container.select(&PROGRESS_BAR).collect();
  if bars.is_empty() {
    bars = container.select(&ANY_DIV).collect();
  }
  bars
    .into_iter()
    .map(|bar| normalize_whitespace(&text_of(bar)))
    .filter(|text| !text.is_empty())
    .collect()
}

fn text_of(el: ElementRef<'_>) -> String {
  el.text().collect()
}

fn has_text(el: ElementRef<'_>) -> bool {
  el.text().any(|t| !t.is_empty())
}

/// `Booked Hours: 16.25h` inside a single element.
fn inline_label_value(doc: &Html) -> Option<BookedHours> {
  for el in doc.select(&TEXT_BEARING) {
    let text = normalize_whitespace(&text_of(el));
    let Some(caps) = INLINE_LABEL.captures(&text) else {
      continue;
    };
    let value = caps.get(2).map(|m| m.as_str().trim()).unwrap_or_default();
    if value.is_empty() {
      continue;
    }
    let label = caps
      .get(1)
      .and_then(|m| detect_booked_label(m.as_str()))
      .unwrap_or(DEFAULT_BOOKED_LABEL);
    match format_hours(value) {
      Some(value) => return Some(BookedHours { value, label }),
      None => debug!(value, "inline booked value has no hour quantity, skipping"),
    }
  }
  None
}

/// A label cell followed, later in the same row, by a cell holding hours.
fn table_row_value(doc: &Html) -> Option<BookedHours> {
  for row in doc.select(&TABLE_ROW) {
    let cells: Vec<ElementRef<'_>> = row.select(&TABLE_CELL).collect();
    for (index, cell) in cells.iter().enumerate() {
      let text = normalize_whitespace(&text_of(*cell));
      let Some(label) = detect_booked_label(&text) else {
        continue;
      };
      for candidate in &cells[index + 1..] {
        if let Some(value) = hour_value_of(*candidate).and_then(format_hours_value) {
          return Some(BookedHours { value, label });
        }
      }
    }
  }
  None
}

/// A label element whose value sits in an adjacent element.
fn sibling_value(doc: &Html) -> Option<BookedHours> {
  for el in doc.select(&TEXT_BEARING) {
    let text = normalize_whitespace(&text_of(el));
    let Some(label) = detect_booked_label(&text) else {
      continue;
    };
    let Some(candidate) = adjacent_value_element(el) else {
      continue;
    };

    if let Some(value) = sum_hour_numbers(&text_of(candidate)).and_then(format_hours_value) {
      return Some(BookedHours { value, label });
    }
    let adjacent = normalize_whitespace(&text_of(candidate));
    match format_hours(&adjacent) {
      Some(value) => return Some(BookedHours { value, label }),
      None => debug!(value = %adjacent, "adjacent value has no hour quantity, skipping"),
    }
  }
  None
}

/// Next sibling element, else the row's first data cell for header cells,
/// else the following element in the parent's child list.
fn adjacent_value_element(el: ElementRef<'_>) -> Option<ElementRef<'_>> {
  if let Some(next) = next_element_sibling(el).filter(|next| has_text(*next)) {
    return Some(next);
  }

  let parent = el.parent().and_then(ElementRef::wrap)?;

  if el.value().name() == "th" {
    if let Some(td) = parent.select(&DATA_CELL).next().filter(|td| has_text(*td)) {
      return Some(td);
    }
  }

  let siblings: Vec<ElementRef<'_>> = parent.children().filter_map(ElementRef::wrap).collect();
  let position = siblings.iter().position(|sibling| sibling.id() == el.id())?;
  siblings
    .get(position + 1)
    .copied()
    .filter(|sibling| has_text(*sibling))
}

fn next_element_sibling(el: ElementRef<'_>) -> Option<ElementRef<'_>> {
  el.next_siblings().find_map(ElementRef::wrap)
}

/// Hours in a cell: the sum over its own text nodes, else over all its text.
fn hour_value_of(el: ElementRef<'_>) -> Option<f64> {
  let direct: Vec<f64> = el
    .children()
    .filter_map(|node| node.value().as_text().map(|text| String::from(&**text)))
    .filter_map(|text| sum_hour_numbers(&text))
    .collect();
  if !direct.is_empty() {
    return Some(direct.iter().sum());
  }
  sum_hour_numbers(&text_of(el))
}
