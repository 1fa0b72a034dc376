//! Entity — the stable registry key of one legal issuer.
//!
//! Keys are fixed-length, zero-padded numeric strings. They are immutable once
//! created and are validated at every write boundary.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::DataQualityError;

/// Number of digits in a canonical entity key.
pub const ENTITY_KEY_LEN: usize = 10;

/// A registry key in canonical form: exactly [`ENTITY_KEY_LEN`] ASCII digits.
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct EntityKey(String);

impl EntityKey {
  /// Accept a key that is already canonical. Anything else is rejected,
  /// including keys that would only need padding.
  pub fn parse(raw: &str) -> Result<Self, DataQualityError> {
    if raw.len() != ENTITY_KEY_LEN {
      return Err(DataQualityError::InvalidEntityKey {
        raw:    raw.to_owned(),
        reason: "must be exactly ten digits",
      });
    }
    if !raw.bytes().all(|b| b.is_ascii_digit()) {
      return Err(DataQualityError::InvalidEntityKey {
        raw:    raw.to_owned(),
        reason: "must contain digits only",
      });
    }
    Ok(Self(raw.to_owned()))
  }

  /// Normalise a numeric key as registries print it (`320193`, `0000320193`)
  /// into canonical zero-padded form.
  pub fn normalize(raw: &str) -> Result<Self, DataQualityError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
      return Err(DataQualityError::InvalidEntityKey {
        raw:    raw.to_owned(),
        reason: "must contain digits only",
      });
    }
    if trimmed.len() > ENTITY_KEY_LEN {
      return Err(DataQualityError::InvalidEntityKey {
        raw:    raw.to_owned(),
        reason: "longer than ten digits",
      });
    }
    Ok(Self(format!("{trimmed:0>width$}", width = ENTITY_KEY_LEN)))
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for EntityKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl FromStr for EntityKey {
  type Err = DataQualityError;

  fn from_str(s: &str) -> Result<Self, Self::Err> { Self::parse(s) }
}

impl TryFrom<String> for EntityKey {
  type Error = DataQualityError;

  fn try_from(value: String) -> Result<Self, Self::Error> { Self::parse(&value) }
}

impl From<EntityKey> for String {
  fn from(value: EntityKey) -> Self { value.0 }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parse_accepts_only_canonical_form() {
    assert_eq!(EntityKey::parse("0000012345").unwrap().as_str(), "0000012345");
    assert!(EntityKey::parse("12345").is_err());
    assert!(EntityKey::parse("00000123a5").is_err());
    assert!(EntityKey::parse("00000123456").is_err());
  }

  #[test]
  fn normalize_zero_pads() {
    assert_eq!(EntityKey::normalize(" 320193 ").unwrap().as_str(), "0000320193");
    assert_eq!(EntityKey::normalize("0000320193").unwrap().as_str(), "0000320193");
    assert!(EntityKey::normalize("").is_err());
    assert!(EntityKey::normalize("12345678901").is_err());
  }
}
