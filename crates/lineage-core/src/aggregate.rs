//! Candidate aggregator — gathers every entity proposed for a ticker window
//! and counts the filings that support each one.
//!
//! Aggregation is a pure function of records already persisted: no network,
//! no clock. Running it twice over the same store contents yields the same
//! [`CandidateSet`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  entity::EntityKey,
  evidence::{Candidate, Evidence},
  policy::{FilingClass, FilingPolicy},
  ticker::Ticker,
  window::Window,
};

/// Per-candidate support counts. Only counts feed the decision rules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureVector {
  /// Qualifying periodic filings dated inside the window.
  pub periodic_filings: u32,
  /// Qualifying event filings dated inside the window.
  pub event_filings:    u32,
}

/// A periodic filing eligible to justify an accepted mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodicFiling {
  pub evidence_id: Uuid,
  pub filing_type: String,
  pub filed_at:    DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSupport {
  pub features:     FeatureVector,
  pub periodic:     Vec<PeriodicFiling>,
  /// Proposed by an archive snapshot.
  pub from_archive: bool,
  /// Appears on at least one evidence record for the window.
  pub from_filings: bool,
}

/// Every candidate entity for one `(ticker, window)` with its support.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSet {
  pub ticker:     Ticker,
  pub window:     Window,
  pub candidates: BTreeMap<EntityKey, CandidateSupport>,
}

impl CandidateSet {
  pub fn is_empty(&self) -> bool { self.candidates.is_empty() }

  pub fn len(&self) -> usize { self.candidates.len() }

  pub fn features(&self) -> BTreeMap<EntityKey, FeatureVector> {
    self
      .candidates
      .iter()
      .map(|(key, support)| (key.clone(), support.features))
      .collect()
  }
}

/// Build the candidate set for `(ticker, window)`.
///
/// Records for other tickers or windows are ignored, so callers may pass a
/// broader slice than the window needs. Evidence counts only when its filing
/// date lies inside the window. Candidates the policy excludes for this
/// ticker are dropped before anything is counted.
pub fn aggregate_candidates(
  ticker: &Ticker,
  window: Window,
  candidates: &[Candidate],
  evidence: &[Evidence],
  policy: &FilingPolicy,
) -> CandidateSet {
  let mut set: BTreeMap<EntityKey, CandidateSupport> = BTreeMap::new();

  for candidate in candidates
    .iter()
    .filter(|c| &c.ticker == ticker && c.window == window)
    .filter(|c| !policy.is_excluded(ticker, &c.entity_key))
  {
    set.entry(candidate.entity_key.clone()).or_default().from_archive = true;
  }

  for ev in evidence
    .iter()
    .filter(|e| &e.ticker == ticker && e.window == window)
    .filter(|e| window.contains(e.filed_at.date_naive()))
    .filter(|e| !policy.is_excluded(ticker, &e.entity_key))
  {
    let support = set.entry(ev.entity_key.clone()).or_default();
    support.from_filings = true;

    match policy.classify(&ev.filing_type, &ev.items) {
      FilingClass::Periodic => {
        support.features.periodic_filings += 1;
        support.periodic.push(PeriodicFiling {
          evidence_id: ev.evidence_id,
          filing_type: ev.filing_type.clone(),
          filed_at:    ev.filed_at,
        });
      }
      FilingClass::Event => support.features.event_filings += 1,
      FilingClass::Other => {}
    }
  }

  CandidateSet { ticker: ticker.clone(), window, candidates: set }
}

#[cfg(test)]
mod tests {
  use chrono::{NaiveDate, TimeZone};

  use super::*;
  use crate::evidence::NewEvidence;

  fn d(s: &str) -> NaiveDate { NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap() }

  fn window() -> Window { Window::new(d("2010-01-01"), d("2015-01-01")).unwrap() }

  fn ticker() -> Ticker { Ticker::normalize("ABCD").unwrap() }

  fn key(k: &str) -> EntityKey { EntityKey::parse(k).unwrap() }

  fn candidate(k: &str) -> Candidate {
    let seen = Utc.with_ymd_and_hms(2011, 5, 1, 0, 0, 0).unwrap();
    Candidate {
      ticker:         ticker(),
      window:         window(),
      entity_key:     key(k),
      first_seen_at:  seen,
      last_seen_at:   seen,
      first_seen_url: "https://web.archive.org/web/2011/abcd".into(),
      last_seen_url:  "https://web.archive.org/web/2011/abcd".into(),
    }
  }

  fn filing(k: &str, form: &str, year: i32, items: &[&str]) -> Evidence {
    NewEvidence {
      ticker:       ticker(),
      entity_key:   key(k),
      window:       window(),
      filed_at:     Utc.with_ymd_and_hms(year, 3, 1, 0, 0, 0).unwrap(),
      filing_type:  form.into(),
      items:        items.iter().map(|s| (*s).to_owned()).collect(),
      accession:    None,
      source:       "edgar_fts".into(),
      raw_payload:  serde_json::Value::Null,
      company_name: "ABCD Inc".into(),
    }
    .into_evidence()
    .unwrap()
  }

  #[test]
  fn counts_periodic_and_event_filings_per_candidate() {
    let evidence = vec![
      filing("0000012345", "10-K", 2011, &[]),
      filing("0000012345", "10-Q", 2012, &[]),
      filing("0000012345", "8-K", 2013, &["2.01"]),
      filing("0000012345", "8-K", 2013, &["9.01"]),
      filing("0000099999", "4", 2012, &[]),
    ];
    let set = aggregate_candidates(
      &ticker(),
      window(),
      &[candidate("0000099999")],
      &evidence,
      &FilingPolicy::default(),
    );

    assert_eq!(set.len(), 2);
    let strong = &set.candidates[&key("0000012345")];
    assert_eq!(strong.features, FeatureVector { periodic_filings: 2, event_filings: 1 });
    assert!(strong.from_filings && !strong.from_archive);

    let weak = &set.candidates[&key("0000099999")];
    assert_eq!(weak.features, FeatureVector::default());
    assert!(weak.from_archive && weak.from_filings);
  }

  #[test]
  fn archive_only_candidate_has_zero_features() {
    let set = aggregate_candidates(
      &ticker(),
      window(),
      &[candidate("0000012345")],
      &[],
      &FilingPolicy::default(),
    );
    assert_eq!(set.candidates[&key("0000012345")].features, FeatureVector::default());
  }

  #[test]
  fn excluded_candidates_are_dropped() {
    let mut policy = FilingPolicy::default();
    policy.excluded_candidates.insert("ABCD".into(), vec!["99999".into()]);
    let set = aggregate_candidates(
      &ticker(),
      window(),
      &[candidate("0000099999"), candidate("0000012345")],
      &[filing("0000099999", "10-K", 2012, &[])],
      &policy,
    );
    assert_eq!(set.candidates.keys().collect::<Vec<_>>(), vec![&key("0000012345")]);
  }

  #[test]
  fn records_for_other_windows_are_ignored() {
    let mut other = candidate("0000012345");
    other.window = Window::new(d("2015-01-01"), d("2016-01-01")).unwrap();
    let set =
      aggregate_candidates(&ticker(), window(), &[other], &[], &FilingPolicy::default());
    assert!(set.is_empty());
  }
}
