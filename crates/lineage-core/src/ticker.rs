//! Ticker — an exchange trading symbol. Not a stable identifier on its own:
//! symbols are reused, renamed and merged over time.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::DataQualityError;

/// A ticker in canonical form: uppercase ASCII letters, digits and `-`, with
/// `.` and `/` class separators mapped to `-`.
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct Ticker(String);

impl Ticker {
  /// Normalise a raw symbol: trim, drop internal whitespace, uppercase, and
  /// map `.` and `/` to `-`.
  pub fn normalize(raw: &str) -> Result<Self, DataQualityError> {
    let cleaned: String = raw
      .chars()
      .filter(|c| !c.is_whitespace())
      .map(|c| match c {
        '.' | '/' => '-',
        c => c.to_ascii_uppercase(),
      })
      .collect();

    if cleaned.is_empty() {
      return Err(DataQualityError::InvalidTicker {
        raw:    raw.to_owned(),
        reason: "empty after normalisation",
      });
    }
    if !cleaned.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
      return Err(DataQualityError::InvalidTicker {
        raw:    raw.to_owned(),
        reason: "only letters, digits and class separators are allowed",
      });
    }
    if cleaned.starts_with('-') || cleaned.ends_with('-') {
      return Err(DataQualityError::InvalidTicker {
        raw:    raw.to_owned(),
        reason: "class separator must sit between symbol parts",
      });
    }
    Ok(Self(cleaned))
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Ticker {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl FromStr for Ticker {
  type Err = DataQualityError;

  fn from_str(s: &str) -> Result<Self, Self::Err> { Self::normalize(s) }
}

impl TryFrom<String> for Ticker {
  type Error = DataQualityError;

  fn try_from(value: String) -> Result<Self, Self::Error> { Self::normalize(&value) }
}

impl From<Ticker> for String {
  fn from(value: Ticker) -> Self { value.0 }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn normalizes_case_whitespace_and_separators() {
    assert_eq!(Ticker::normalize(" brk.b ").unwrap().as_str(), "BRK-B");
    assert_eq!(Ticker::normalize("bf/b").unwrap().as_str(), "BF-B");
    assert_eq!(Ticker::normalize("go og").unwrap().as_str(), "GOOG");
  }

  #[test]
  fn rejects_empty_and_junk() {
    assert!(Ticker::normalize("   ").is_err());
    assert!(Ticker::normalize("AB$C").is_err());
    assert!(Ticker::normalize(".A").is_err());
  }

  #[test]
  fn deserialization_normalizes() {
    let t: Ticker = serde_json::from_str("\"aapl\"").unwrap();
    assert_eq!(t.as_str(), "AAPL");
  }
}
