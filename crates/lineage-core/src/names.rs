//! Name history — canonical legal names per entity over time.
//!
//! Observed filing names are canonicalised (punctuation and corporate or
//! jurisdiction suffixes stripped, spaces removed) and runs of identical
//! canonical names become [`NameEpisode`]s. Name episodes are limited to the
//! time the entity is covered by mapping episodes, and never overlap.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  entity::EntityKey,
  error::MergeInvariantViolation,
  evidence::{Evidence, content_id},
  merge::{MappingEpisode, NameCorrection},
  policy::FilingPolicy,
  window::{Window, coalesce, find_overlap},
};

const STRIPPED_PUNCTUATION: &[char] = &[',', '&', '-', '/', '.'];

fn strip_punctuation(s: &str) -> String {
  s.chars().filter(|c| !STRIPPED_PUNCTUATION.contains(c)).collect()
}

/// Canonical form of a company name.
///
/// `"Apple Computer, Inc."` and `"APPLE COMPUTER INC"` both become
/// `"APPLECOMPUTER"`. A name made only of suffixes keeps them rather than
/// canonicalising to nothing. Blank input yields an empty string.
pub fn canonicalize_name(raw: &str, suffixes: &[String]) -> String {
  let cleaned = strip_punctuation(&raw.trim().to_uppercase());
  let suffixes: Vec<String> =
    suffixes.iter().map(|s| strip_punctuation(&s.trim().to_uppercase())).collect();

  let kept: String = cleaned
    .split_whitespace()
    .filter(|word| !suffixes.iter().any(|s| s.as_str() == *word))
    .collect();
  if kept.is_empty() {
    cleaned.split_whitespace().collect()
  } else {
    kept
  }
}

/// A curated `(entity, window, canonical name)` triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameEpisode {
  pub entity_key:     EntityKey,
  pub window:         Window,
  pub canonical_name: String,
  /// The name as printed on the filing that opened the episode.
  pub observed_name:  String,
  pub evidence_id:    Uuid,
  /// Set when a reviewer's alias-rewrite supplied the name.
  pub corrected_by:   Option<Uuid>,
}

impl NameEpisode {
  pub fn episode_id(&self) -> Uuid {
    content_id(&serde_json::json!({
      "entity_key":     self.entity_key.as_str(),
      "window":         self.window.to_string(),
      "canonical_name": self.canonical_name,
      "evidence_id":    self.evidence_id.to_string(),
      "corrected_by":   self.corrected_by.map(|id| id.to_string()),
    }))
  }
}

struct NamedFiling<'a> {
  evidence:     &'a Evidence,
  name:         String,
  corrected_by: Option<Uuid>,
}

struct Run<'a, 'b> {
  start:     NaiveDate,
  opened_on: NaiveDate,
  filing:    &'b NamedFiling<'a>,
}

/// Build the name history of one entity.
///
/// Coverage is the union of the entity's mapping episodes. Within each
/// covered segment, filings are walked in filing order and every change of
/// canonical name opens a new episode on the filing's date; the first
/// episode of a segment starts at the segment start, the last ends at the
/// segment end. A correction applies to filings dated inside its window when
/// the entity held the corrected ticker on that date.
pub fn build_name_episodes(
  entity_key: &EntityKey,
  episodes: &[MappingEpisode],
  evidence: &[Evidence],
  corrections: &[NameCorrection],
  policy: &FilingPolicy,
) -> Result<Vec<NameEpisode>, MergeInvariantViolation> {
  let held: Vec<&MappingEpisode> =
    episodes.iter().filter(|e| &e.entity_key == entity_key).collect();
  let coverage = coalesce(&held.iter().map(|e| e.window).collect::<Vec<_>>());

  let filings: BTreeMap<Uuid, &Evidence> = evidence
    .iter()
    .filter(|e| &e.entity_key == entity_key)
    .map(|e| (e.evidence_id, e))
    .collect();

  let name_of = |ev: &Evidence| -> Option<(String, Option<Uuid>)> {
    let date = ev.filed_at.date_naive();
    let correction = corrections.iter().find(|c| {
      c.window.contains(date)
        && held.iter().any(|e| e.ticker == c.ticker && e.window.contains(date))
    });
    if let Some(c) = correction {
      return Some((c.canonical_name.trim().to_uppercase(), Some(c.adjudication_id)));
    }
    let name = canonicalize_name(&ev.company_name, &policy.name_suffixes);
    (!name.is_empty()).then_some((name, None))
  };

  let mut out = Vec::new();
  for segment in coverage {
    let mut named: Vec<NamedFiling<'_>> = filings
      .values()
      .copied()
      .filter(|e| segment.contains(e.filed_at.date_naive()))
      .filter_map(|e| {
        name_of(e).map(|(name, corrected_by)| NamedFiling { evidence: e, name, corrected_by })
      })
      .collect();
    named.sort_by_key(|f| (f.evidence.filed_at, f.evidence.evidence_id));

    // Each run lasts until the next run's start. The first run of a segment
    // starts at the segment start, so runs are collapsed on the date of the
    // filing that opened them rather than on their start.
    let mut runs: Vec<Run<'_, '_>> = Vec::new();
    for filing in &named {
      let date = filing.evidence.filed_at.date_naive();
      if runs.last().is_some_and(|last| last.filing.name == filing.name) {
        continue;
      }
      if runs.last().is_some_and(|last| last.opened_on == date) {
        runs.pop();
        if runs.last().is_some_and(|last| last.filing.name == filing.name) {
          continue;
        }
      }
      let start = if runs.is_empty() { segment.start() } else { date };
      runs.push(Run { start, opened_on: date, filing });
    }

    for (i, Run { start, filing, .. }) in runs.iter().enumerate() {
      let end = runs.get(i + 1).map_or(segment.end(), |next| next.start);
      let window = Window::new(*start, end).map_err(|_| MergeInvariantViolation::NameOverlap {
        entity_key: entity_key.clone(),
        first:      segment,
        second:     segment,
      })?;
      out.push(NameEpisode {
        entity_key: entity_key.clone(),
        window,
        canonical_name: filing.name.clone(),
        observed_name: filing.evidence.company_name.clone(),
        evidence_id: filing.evidence.evidence_id,
        corrected_by: filing.corrected_by,
      });
    }
  }

  let windows: Vec<Window> = out.iter().map(|e| e.window).collect();
  if let Some((first, second)) = find_overlap(&windows) {
    return Err(MergeInvariantViolation::NameOverlap {
      entity_key: entity_key.clone(),
      first,
      second,
    });
  }
  Ok(out)
}

/// A name episode's evidence must exist, name the same entity, and be filed
/// inside the episode's window.
pub fn check_name_provenance(
  episode: &NameEpisode,
  evidence: Option<&Evidence>,
) -> Result<(), MergeInvariantViolation> {
  let fail = |reason| MergeInvariantViolation::NameProvenance {
    entity_key: episode.entity_key.clone(),
    window: episode.window,
    evidence_id: episode.evidence_id,
    reason,
  };

  let ev = evidence.ok_or_else(|| fail("does not resolve to an evidence record"))?;
  if ev.entity_key != episode.entity_key {
    return Err(fail("belongs to another entity"));
  }
  if !episode.window.contains(ev.filed_at.date_naive()) {
    return Err(fail("was filed outside the episode window"));
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use chrono::{NaiveDate, TimeZone, Utc};

  use super::*;
  use crate::{merge::Justification, ticker::Ticker};

  fn d(s: &str) -> NaiveDate { NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap() }

  fn w(a: &str, b: &str) -> Window { Window::new(d(a), d(b)).unwrap() }

  fn key() -> EntityKey { EntityKey::parse("0000320193").unwrap() }

  fn ticker() -> Ticker { Ticker::normalize("AAPL").unwrap() }

  fn suffixes() -> Vec<String> { FilingPolicy::default().name_suffixes }

  fn mapping(window: Window) -> MappingEpisode {
    MappingEpisode {
      ticker: ticker(),
      entity_key: key(),
      window,
      evidence_id: Uuid::from_u128(1),
      justification: Justification::SingleCandidatePeriodic,
      adjudication_id: None,
    }
  }

  fn filing(id: u128, filed: &str, name: &str) -> Evidence {
    Evidence {
      evidence_id:  Uuid::from_u128(id),
      ticker:       ticker(),
      entity_key:   key(),
      window:       w("2000-01-01", "2020-01-01"),
      filed_at:     Utc.from_utc_datetime(&d(filed).and_hms_opt(9, 0, 0).unwrap()),
      filing_type:  "10-K".into(),
      items:        vec![],
      accession:    None,
      source:       "edgar_fts".into(),
      raw_payload:  serde_json::Value::Null,
      company_name: name.into(),
    }
  }

  #[test]
  fn strips_punctuation_and_suffixes() {
    assert_eq!(canonicalize_name("Apple Computer, Inc.", &suffixes()), "APPLECOMPUTER");
    assert_eq!(canonicalize_name("APPLE COMPUTER INC", &suffixes()), "APPLECOMPUTER");
    assert_eq!(canonicalize_name("Kinder Morgan, L.P.", &suffixes()), "KINDERMORGAN");
    assert_eq!(canonicalize_name("AT&T Corp /DE/", &suffixes()), "ATT");
    assert_eq!(canonicalize_name("Incyte Corp", &suffixes()), "INCYTE");
  }

  #[test]
  fn name_of_suffixes_only_is_kept() {
    assert_eq!(canonicalize_name("Holding Co", &suffixes()), "HOLDINGCO");
    assert_eq!(canonicalize_name("   ", &suffixes()), "");
  }

  #[test]
  fn groups_identical_names_and_splits_on_change() {
    let evidence = vec![
      filing(10, "2001-03-01", "Apple Computer Inc"),
      filing(11, "2004-03-01", "APPLE COMPUTER, INC."),
      filing(12, "2007-11-01", "Apple Inc."),
      filing(13, "2009-11-01", "Apple Inc"),
    ];
    let names = build_name_episodes(
      &key(),
      &[mapping(w("2000-01-01", "2012-01-01"))],
      &evidence,
      &[],
      &FilingPolicy::default(),
    )
    .unwrap();

    assert_eq!(names.len(), 2);
    assert_eq!(names[0].canonical_name, "APPLECOMPUTER");
    assert_eq!(names[0].window, w("2000-01-01", "2007-11-01"));
    assert_eq!(names[1].canonical_name, "APPLE");
    assert_eq!(names[1].window, w("2007-11-01", "2012-01-01"));
    assert_eq!(names[1].evidence_id, Uuid::from_u128(12));
  }

  #[test]
  fn episodes_follow_mapping_coverage_gaps() {
    let evidence = vec![
      filing(10, "2001-03-01", "Apple Computer Inc"),
      filing(11, "2006-03-01", "Apple Computer Inc"),
    ];
    let names = build_name_episodes(
      &key(),
      &[mapping(w("2000-01-01", "2003-01-01")), mapping(w("2005-01-01", "2008-01-01"))],
      &evidence,
      &[],
      &FilingPolicy::default(),
    )
    .unwrap();
    assert_eq!(
      names.iter().map(|n| n.window).collect::<Vec<_>>(),
      vec![w("2000-01-01", "2003-01-01"), w("2005-01-01", "2008-01-01")]
    );
  }

  #[test]
  fn alias_rewrite_overrides_observed_name() {
    let evidence = vec![
      filing(10, "2001-03-01", "Apple Computer Inc"),
      filing(11, "2004-03-01", "Apple Cmptr Inc"),
    ];
    let correction = NameCorrection {
      ticker:          ticker(),
      window:          w("2004-01-01", "2005-01-01"),
      canonical_name:  "APPLECOMPUTER".into(),
      evidence_id:     Uuid::from_u128(11),
      adjudication_id: Uuid::from_u128(99),
    };
    let names = build_name_episodes(
      &key(),
      &[mapping(w("2000-01-01", "2006-01-01"))],
      &evidence,
      &[correction],
      &FilingPolicy::default(),
    )
    .unwrap();
    assert_eq!(names.len(), 1);
    assert_eq!(names[0].canonical_name, "APPLECOMPUTER");
  }

  #[test]
  fn same_day_rename_keeps_the_later_name() {
    let evidence = vec![
      filing(10, "2001-03-01", "Old Name Inc"),
      filing(11, "2004-03-01", "Middle Name Inc"),
      filing(12, "2004-03-01", "New Name Inc"),
    ];
    let names = build_name_episodes(
      &key(),
      &[mapping(w("2000-01-01", "2006-01-01"))],
      &evidence,
      &[],
      &FilingPolicy::default(),
    )
    .unwrap();
    assert_eq!(
      names.iter().map(|n| n.canonical_name.as_str()).collect::<Vec<_>>(),
      vec!["OLDNAME", "NEWNAME"]
    );
    assert_eq!(names[1].window.start(), d("2004-03-01"));
  }

  #[test]
  fn rename_on_the_first_filing_day_opens_the_segment() {
    let evidence = vec![
      filing(10, "2001-03-01", "Old Name Inc"),
      filing(11, "2001-03-01", "New Name Inc"),
      filing(12, "2003-03-01", "New Name Inc"),
    ];
    let names = build_name_episodes(
      &key(),
      &[mapping(w("2000-01-01", "2006-01-01"))],
      &evidence,
      &[],
      &FilingPolicy::default(),
    )
    .unwrap();

    assert_eq!(names.len(), 1);
    assert_eq!(names[0].canonical_name, "NEWNAME");
    assert_eq!(names[0].window, w("2000-01-01", "2006-01-01"));
    assert_eq!(names[0].evidence_id, Uuid::from_u128(11));
    for name in &names {
      let ev = evidence.iter().find(|e| e.evidence_id == name.evidence_id);
      check_name_provenance(name, ev).unwrap();
    }
  }

  #[test]
  fn name_provenance_requires_a_filing_inside_the_episode() {
    let ev = filing(10, "2001-03-01", "Apple Computer Inc");
    let episode = NameEpisode {
      entity_key:     key(),
      window:         w("2000-01-01", "2003-01-01"),
      canonical_name: "APPLECOMPUTER".into(),
      observed_name:  ev.company_name.clone(),
      evidence_id:    ev.evidence_id,
      corrected_by:   None,
    };
    check_name_provenance(&episode, Some(&ev)).unwrap();
    assert!(check_name_provenance(&episode, None).is_err());

    let late = NameEpisode { window: w("2002-01-01", "2003-01-01"), ..episode };
    assert!(matches!(
      check_name_provenance(&late, Some(&ev)),
      Err(MergeInvariantViolation::NameProvenance { .. })
    ));
  }
}
