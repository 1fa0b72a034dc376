//! Half-open validity windows and the interval checks built on them.
//!
//! Every fact in Lineage holds over a window `[start, end)`: `start` is the
//! first day inside, `end` the first day outside. Windows are finite and
//! non-empty by construction.

use std::{fmt, str::FromStr};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::DataQualityError;

const KEY_SEPARATOR: &str = " to ";

/// A half-open date interval `[start, end)` with `start < end`.
///
/// Ordering is by `start`, then `end`; sorting a slice of windows therefore
/// sorts them chronologically.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct Window {
  start: NaiveDate,
  end:   NaiveDate,
}

impl Window {
  pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, DataQualityError> {
    if start >= end {
      return Err(DataQualityError::InvalidWindow { start, end });
    }
    Ok(Self { start, end })
  }

  pub fn start(&self) -> NaiveDate { self.start }

  pub fn end(&self) -> NaiveDate { self.end }

  /// `start <= date < end`.
  pub fn contains(&self, date: NaiveDate) -> bool {
    self.start <= date && date < self.end
  }

  pub fn overlaps(&self, other: &Window) -> bool {
    self.start < other.end && other.start < self.end
  }

  /// True when `other` lies entirely inside `self`.
  pub fn encloses(&self, other: &Window) -> bool {
    self.start <= other.start && other.end <= self.end
  }

  pub fn days(&self) -> i64 { (self.end - self.start).num_days() }
}

impl fmt::Display for Window {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{}{KEY_SEPARATOR}{}",
      self.start.format("%Y-%m-%d"),
      self.end.format("%Y-%m-%d")
    )
  }
}

/// Parses the canonical key form `YYYY-MM-DD to YYYY-MM-DD`.
impl FromStr for Window {
  type Err = DataQualityError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let malformed = || DataQualityError::MalformedWindowKey(s.to_owned());
    let (start, end) = s.split_once(KEY_SEPARATOR).ok_or_else(malformed)?;
    let start = NaiveDate::parse_from_str(start.trim(), "%Y-%m-%d")
      .map_err(|_| malformed())?;
    let end =
      NaiveDate::parse_from_str(end.trim(), "%Y-%m-%d").map_err(|_| malformed())?;
    Self::new(start, end)
  }
}

impl TryFrom<String> for Window {
  type Error = DataQualityError;

  fn try_from(value: String) -> Result<Self, Self::Error> { value.parse() }
}

impl From<Window> for String {
  fn from(value: Window) -> Self { value.to_string() }
}

// ─── Interval checks ─────────────────────────────────────────────────────────

/// Find the first overlapping pair among `windows`, if any.
///
/// After sorting by start, an overlap exists iff some adjacent pair overlaps.
pub fn find_overlap(windows: &[Window]) -> Option<(Window, Window)> {
  let mut sorted = windows.to_vec();
  sorted.sort();
  sorted
    .windows(2)
    .find(|pair| pair[0].overlaps(&pair[1]))
    .map(|pair| (pair[0], pair[1]))
}

/// Collapse overlapping or touching windows into maximal disjoint segments.
pub fn coalesce(windows: &[Window]) -> Vec<Window> {
  let mut sorted = windows.to_vec();
  sorted.sort();

  let mut segments: Vec<Window> = Vec::with_capacity(sorted.len());
  for w in sorted {
    match segments.last_mut() {
      Some(last) if w.start <= last.end => {
        if w.end > last.end {
          last.end = w.end;
        }
      }
      _ => segments.push(w),
    }
  }
  segments
}

/// Why a set of replacement windows fails to tile the window it replaces.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TilingDefect {
  #[error("no replacement windows")]
  Empty,

  #[error("replacement {0} spills outside the original window")]
  Spillover(Window),

  #[error("replacements {0} and {1} overlap")]
  Overlap(Window, Window),

  #[error("gap from {from} to {to}")]
  Gap { from: NaiveDate, to: NaiveDate },
}

/// Check that `parts` cover `whole` exactly: no gap, no overlap, no spillover.
pub fn check_tiling(whole: Window, parts: &[Window]) -> Result<(), TilingDefect> {
  if parts.is_empty() {
    return Err(TilingDefect::Empty);
  }
  if let Some(outside) = parts.iter().find(|p| !whole.encloses(p)) {
    return Err(TilingDefect::Spillover(*outside));
  }
  if let Some((a, b)) = find_overlap(parts) {
    return Err(TilingDefect::Overlap(a, b));
  }

  let mut sorted = parts.to_vec();
  sorted.sort();

  let mut cursor = whole.start;
  for part in &sorted {
    if part.start > cursor {
      return Err(TilingDefect::Gap { from: cursor, to: part.start });
    }
    cursor = part.end;
  }
  if cursor < whole.end {
    return Err(TilingDefect::Gap { from: cursor, to: whole.end });
  }
  Ok(())
}
