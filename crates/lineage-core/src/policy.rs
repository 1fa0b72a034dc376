//! Filing policy — which filings count as identity evidence and how they rank.
//!
//! Loaded from configuration; every field has a documented default so an
//! empty `[policy]` table reproduces the standard behaviour.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{entity::EntityKey, error::DataQualityError, ticker::Ticker};

/// Rank given to periodic forms missing from [`FilingPolicy::priority`]. Sorts
/// after every configured rank.
pub const UNRANKED: u16 = u8::MAX as u16 + 1;

/// How a filing type participates in candidate features.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilingClass {
  /// Filed only by the registrant itself, on a schedule.
  Periodic,
  /// Signals a structural change (merger, change in control, renaming).
  Event,
  Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilingPolicy {
  /// Periodic report types, amended variants included.
  pub periodic_forms:      BTreeSet<String>,
  /// Event-driven report types.
  pub event_forms:         BTreeSet<String>,
  /// Event sub-items that qualify. Empty means every event filing qualifies.
  pub event_items:         BTreeSet<String>,
  /// Evidence priority for periodic forms; lower ranks are more
  /// authoritative. Ties break on the most recent filing date, then on the
  /// larger evidence id.
  pub priority:            BTreeMap<String, u8>,
  /// Candidates known to be wrong for a ticker, dropped before aggregation.
  /// Keys are tickers, values are entity keys.
  pub excluded_candidates: BTreeMap<String, Vec<String>>,
  /// Tickers whose windows always go to manual review.
  pub manual_only_tickers: BTreeSet<String>,
  /// Corporate and jurisdiction suffixes stripped from company names.
  pub name_suffixes:       Vec<String>,
}

impl Default for FilingPolicy {
  fn default() -> Self {
    let set = |items: &[&str]| items.iter().map(|s| (*s).to_owned()).collect();

    Self {
      periodic_forms:      set(&[
        "10-K", "10-KT", "10-K/A", "10-Q", "10-QT", "10-Q/A", "20-F", "20-F/A",
      ]),
      event_forms:         set(&["8-K", "8-K/A"]),
      event_items:         set(&["1.01", "2.01", "3.03", "5.01", "5.03"]),
      priority:            [
        ("10-K", 0),
        ("20-F", 0),
        ("10-KT", 1),
        ("10-QT", 1),
        ("10-K/A", 1),
        ("20-F/A", 1),
        ("10-Q", 2),
        ("10-Q/A", 3),
      ]
      .into_iter()
      .map(|(form, rank)| (form.to_owned(), rank))
      .collect(),
      excluded_candidates: BTreeMap::new(),
      manual_only_tickers: BTreeSet::new(),
      name_suffixes:       [
        "INC", "INCDE", "INCMD", "INCORPORATED", "CORP", "CORPORATION",
        "INTERNATIONAL", "GROUP", "CO", "COMPANY", "LLC", "LP", "L.P.", "LLLP",
        "LLP", "LTD", "LIMITED", "HOLDINGS", "HLDGS", "HOLDING", "PLC", "DE",
        "MD", "UT", "MO",
      ]
      .into_iter()
      .map(str::to_owned)
      .collect(),
    }
  }
}

fn form_key(filing_type: &str) -> String { filing_type.trim().to_ascii_uppercase() }

impl FilingPolicy {
  /// Reject configuration that names malformed tickers or entity keys.
  pub fn validate(&self) -> Result<(), DataQualityError> {
    for (ticker, keys) in &self.excluded_candidates {
      Ticker::normalize(ticker)?;
      for key in keys {
        EntityKey::normalize(key)?;
      }
    }
    for ticker in &self.manual_only_tickers {
      Ticker::normalize(ticker)?;
    }
    Ok(())
  }

  /// Configured form names match case-insensitively, as in [`Self::rank`].
  pub fn classify(&self, filing_type: &str, items: &[String]) -> FilingClass {
    let form = form_key(filing_type);
    let listed = |forms: &BTreeSet<String>| forms.iter().any(|f| form_key(f) == form);
    if listed(&self.periodic_forms) {
      FilingClass::Periodic
    } else if listed(&self.event_forms)
      && (self.event_items.is_empty()
        || items.iter().any(|i| self.event_items.contains(i.trim())))
    {
      FilingClass::Event
    } else {
      FilingClass::Other
    }
  }

  /// Evidence rank of a periodic form; unlisted forms get [`UNRANKED`].
  /// Configured form names match case-insensitively.
  pub fn rank(&self, filing_type: &str) -> u16 {
    let form = form_key(filing_type);
    self
      .priority
      .iter()
      .find(|(configured, _)| form_key(configured) == form)
      .map_or(UNRANKED, |(_, r)| u16::from(*r))
  }

  pub fn is_excluded(&self, ticker: &Ticker, entity_key: &EntityKey) -> bool {
    self.excluded_candidates.iter().any(|(t, keys)| {
      Ticker::normalize(t).is_ok_and(|t| &t == ticker)
        && keys
          .iter()
          .any(|k| EntityKey::normalize(k).is_ok_and(|k| &k == entity_key))
    })
  }

  pub fn is_manual_only(&self, ticker: &Ticker) -> bool {
    self
      .manual_only_tickers
      .iter()
      .any(|t| Ticker::normalize(t).is_ok_and(|t| &t == ticker))
  }
}
