//! Episode merger — combines rule-engine decisions and ledger entries for one
//! ticker into the final, non-overlapping mapping episodes.
//!
//! Precedence is simple: if a reviewer ruled on a window, that ruling wins,
//! whatever the rules said. A window-split replaces one tracked window with
//! finer windows that must tile it exactly. Alias-rewrites never produce a
//! mapping; they are passed through as [`NameCorrection`]s for the name
//! history.
//!
//! Every invariant is checked before anything is returned, so a caller that
//! commits only `Ok` outcomes never persists a partial merge.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::{
  adjudication::{Adjudication, AdjudicationAction},
  entity::EntityKey,
  error::MergeInvariantViolation,
  evidence::{Evidence, content_id},
  lifecycle::{WindowReport, WindowStage},
  rules::{AcceptRule, Decision},
  ticker::Ticker,
  window::{Window, check_tiling, find_overlap},
};

/// Why an episode exists.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Justification {
  SingleCandidatePeriodic,
  SinglePeriodicHolder,
  SeedWithEntity,
  ManualOverride,
  WindowSplit,
}

impl Justification {
  pub fn is_manual(self) -> bool {
    matches!(self, Self::SeedWithEntity | Self::ManualOverride | Self::WindowSplit)
  }
}

impl From<AcceptRule> for Justification {
  fn from(rule: AcceptRule) -> Self {
    match rule {
      AcceptRule::SingleCandidatePeriodic => Self::SingleCandidatePeriodic,
      AcceptRule::SinglePeriodicHolder => Self::SinglePeriodicHolder,
    }
  }
}

/// A curated `(ticker, entity, window)` mapping with its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MappingEpisode {
  pub ticker:          Ticker,
  pub entity_key:      EntityKey,
  pub window:          Window,
  pub evidence_id:     Uuid,
  pub justification:   Justification,
  /// The ledger entry behind a manual episode.
  pub adjudication_id: Option<Uuid>,
}

impl MappingEpisode {
  /// Content-derived id. Re-merging unchanged inputs reproduces it.
  pub fn episode_id(&self) -> Uuid {
    content_id(&serde_json::json!({
      "ticker":          self.ticker.as_str(),
      "entity_key":      self.entity_key.as_str(),
      "window":          self.window.to_string(),
      "evidence_id":     self.evidence_id.to_string(),
      "justification":   self.justification.as_ref(),
      "adjudication_id": self.adjudication_id.map(|id| id.to_string()),
    }))
  }
}

/// A reviewer's canonical-name correction for a ticker window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameCorrection {
  pub ticker:          Ticker,
  pub window:          Window,
  pub canonical_name:  String,
  pub evidence_id:     Uuid,
  pub adjudication_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOutcome {
  pub ticker:      Ticker,
  /// Sorted by window.
  pub episodes:    Vec<MappingEpisode>,
  /// One per tracked window, in window order.
  pub reports:     Vec<WindowReport>,
  pub corrections: Vec<NameCorrection>,
}

impl MergeOutcome {
  pub fn pending(&self) -> impl Iterator<Item = &WindowReport> + '_ {
    self.reports.iter().filter(|r| r.stage().is_open())
  }
}

fn entity_of(
  ticker: &Ticker,
  adjudication: &Adjudication,
) -> Result<EntityKey, MergeInvariantViolation> {
  adjudication.entity_key.clone().ok_or_else(|| MergeInvariantViolation::MissingEntity {
    ticker:          ticker.clone(),
    adjudication_id: adjudication.adjudication_id,
  })
}

fn manual_episode(
  ticker: &Ticker,
  adjudication: &Adjudication,
  window: Window,
  justification: Justification,
) -> Result<MappingEpisode, MergeInvariantViolation> {
  Ok(MappingEpisode {
    ticker: ticker.clone(),
    entity_key: entity_of(ticker, adjudication)?,
    window,
    evidence_id: adjudication.evidence_id,
    justification,
    adjudication_id: Some(adjudication.adjudication_id),
  })
}

/// Merge one ticker.
///
/// - `windows` are the ticker's tracked membership windows.
/// - `decisions` holds the rule engine's output for windows that had
///   candidates; a tracked window missing from it is awaiting evidence.
/// - `adjudications` is the ticker's ledger; entries for other tickers are
///   ignored.
/// - `evidence` must resolve every evidence id an episode may cite.
pub fn merge_episodes(
  ticker: &Ticker,
  windows: &[Window],
  decisions: &BTreeMap<Window, Decision>,
  adjudications: &[Adjudication],
  evidence: &BTreeMap<Uuid, Evidence>,
) -> Result<MergeOutcome, MergeInvariantViolation> {
  let ledger: Vec<&Adjudication> =
    adjudications.iter().filter(|a| &a.ticker == ticker).collect();

  let mut tracked = windows.to_vec();
  tracked.sort();
  tracked.dedup();
  if let Some((first, second)) = find_overlap(&tracked) {
    return Err(MergeInvariantViolation::Overlap { ticker: ticker.clone(), first, second });
  }

  let mut episodes = Vec::new();
  let mut reports = Vec::with_capacity(tracked.len());
  let mut consumed: BTreeSet<Uuid> = BTreeSet::new();

  for &window in &tracked {
    let mut trace = match decisions.get(&window) {
      None => vec![WindowStage::AwaitingEvidence],
      Some(Decision::Accept { .. }) => {
        vec![WindowStage::CandidatesGathered, WindowStage::AutoAccepted]
      }
      Some(Decision::NeedsAdjudication { .. }) => vec![
        WindowStage::CandidatesGathered,
        WindowStage::NeedsAdjudication,
        WindowStage::PendingReview,
      ],
    };

    let splits: Vec<&Adjudication> = ledger
      .iter()
      .copied()
      .filter(|a| a.action == AdjudicationAction::WindowSplit && a.window.overlaps(&window))
      .collect();
    let directs: Vec<&Adjudication> = ledger
      .iter()
      .copied()
      .filter(|a| {
        matches!(a.action, AdjudicationAction::SeedWithEntity | AdjudicationAction::ManualOverride)
          && a.window == window
      })
      .collect();

    if !splits.is_empty() && !directs.is_empty() {
      return Err(MergeInvariantViolation::ConflictingAdjudications {
        ticker: ticker.clone(),
        window,
        adjudication_ids: splits.iter().chain(&directs).map(|a| a.adjudication_id).collect(),
      });
    }

    if !splits.is_empty() {
      let parts: Vec<Window> = splits.iter().map(|a| a.window).collect();
      check_tiling(window, &parts).map_err(|defect| MergeInvariantViolation::NonTiling {
        ticker: ticker.clone(),
        window,
        defect,
      })?;
      for split in &splits {
        episodes.push(manual_episode(ticker, split, split.window, Justification::WindowSplit)?);
        consumed.insert(split.adjudication_id);
      }
      trace.extend([WindowStage::Adjudicated, WindowStage::MergedIntoEpisode]);
    } else if !directs.is_empty() {
      let entities: BTreeSet<Option<&EntityKey>> =
        directs.iter().map(|a| a.entity_key.as_ref()).collect();
      if entities.len() > 1 {
        return Err(MergeInvariantViolation::ConflictingAdjudications {
          ticker: ticker.clone(),
          window,
          adjudication_ids: directs.iter().map(|a| a.adjudication_id).collect(),
        });
      }
      let Some(ruling) = directs.iter().max_by_key(|a| (a.recorded_at, a.adjudication_id))
      else {
        continue;
      };
      let justification = match ruling.action {
        AdjudicationAction::ManualOverride => Justification::ManualOverride,
        _ => Justification::SeedWithEntity,
      };
      episodes.push(manual_episode(ticker, ruling, window, justification)?);
      consumed.extend(directs.iter().map(|a| a.adjudication_id));
      trace.extend([WindowStage::Adjudicated, WindowStage::MergedIntoEpisode]);
    } else if let Some(Decision::Accept { entity_key, evidence_id, rule }) =
      decisions.get(&window)
    {
      episodes.push(MappingEpisode {
        ticker: ticker.clone(),
        entity_key: entity_key.clone(),
        window,
        evidence_id: *evidence_id,
        justification: (*rule).into(),
        adjudication_id: None,
      });
      trace.push(WindowStage::MergedIntoEpisode);
    }

    reports.push(WindowReport { ticker: ticker.clone(), window, trace });
  }

  if let Some(orphan) = ledger
    .iter()
    .find(|a| a.action.requires_entity() && !consumed.contains(&a.adjudication_id))
  {
    return Err(MergeInvariantViolation::OrphanAdjudication {
      ticker:          ticker.clone(),
      window:          orphan.window,
      adjudication_id: orphan.adjudication_id,
    });
  }

  for episode in &episodes {
    check_provenance(episode, evidence.get(&episode.evidence_id))?;
  }

  episodes.sort_by_key(|e| e.window);
  let episode_windows: Vec<Window> = episodes.iter().map(|e| e.window).collect();
  if let Some((first, second)) = find_overlap(&episode_windows) {
    return Err(MergeInvariantViolation::Overlap { ticker: ticker.clone(), first, second });
  }

  let corrections = name_corrections(ticker, adjudications);

  Ok(MergeOutcome { ticker: ticker.clone(), episodes, reports, corrections })
}

/// The alias-rewrite corrections a ticker's ledger registers.
pub fn name_corrections(ticker: &Ticker, adjudications: &[Adjudication]) -> Vec<NameCorrection> {
  adjudications
    .iter()
    .filter(|a| &a.ticker == ticker && a.action == AdjudicationAction::AliasRewrite)
    .filter_map(|a| {
      a.canonical_name.as_ref().map(|name| NameCorrection {
        ticker:          ticker.clone(),
        window:          a.window,
        canonical_name:  name.clone(),
        evidence_id:     a.evidence_id,
        adjudication_id: a.adjudication_id,
      })
    })
    .collect()
}

/// An episode's evidence must exist, belong to the same ticker and entity,
/// and be filed inside the episode's window.
pub fn check_provenance(
  episode: &MappingEpisode,
  evidence: Option<&Evidence>,
) -> Result<(), MergeInvariantViolation> {
  let fail = |reason| MergeInvariantViolation::Provenance {
    ticker: episode.ticker.clone(),
    entity_key: episode.entity_key.clone(),
    window: episode.window,
    evidence_id: episode.evidence_id,
    reason,
  };

  let ev = evidence.ok_or_else(|| fail("does not resolve to an evidence record"))?;
  if ev.ticker != episode.ticker {
    return Err(fail("belongs to another ticker"));
  }
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
  use chrono::{DateTime, NaiveDate, TimeZone, Utc};

  use super::*;
  use crate::{rules::ReviewReason, window::TilingDefect};

  fn d(s: &str) -> NaiveDate { NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap() }

  fn w(a: &str, b: &str) -> Window { Window::new(d(a), d(b)).unwrap() }

  fn t() -> Ticker { Ticker::normalize("ABCD").unwrap() }

  fn key(k: &str) -> EntityKey { EntityKey::parse(k).unwrap() }

  fn at(date: &str) -> DateTime<Utc> {
    Utc.from_utc_datetime(&d(date).and_hms_opt(12, 0, 0).unwrap())
  }

  fn evidence(id: u128, entity: &str, window: Window, filed: &str) -> Evidence {
    Evidence {
      evidence_id:  Uuid::from_u128(id),
      ticker:       t(),
      entity_key:   key(entity),
      window,
      filed_at:     at(filed),
      filing_type:  "10-K".into(),
      items:        vec![],
      accession:    None,
      source:       "edgar_fts".into(),
      raw_payload:  serde_json::Value::Null,
      company_name: "ABCD Inc".into(),
    }
  }

  fn adjudication(
    id: u128,
    action: AdjudicationAction,
    window: Window,
    entity: Option<&str>,
    evidence_id: u128,
  ) -> Adjudication {
    Adjudication {
      adjudication_id: Uuid::from_u128(id),
      ticker: t(),
      window,
      entity_key: entity.map(key),
      action,
      rationale: "reviewed".into(),
      sources: vec!["https://www.sec.gov/".into()],
      evidence_id: Uuid::from_u128(evidence_id),
      canonical_name: None,
      recorded_at: at("2024-01-01"),
    }
  }

  fn pool(records: Vec<Evidence>) -> BTreeMap<Uuid, Evidence> {
    records.into_iter().map(|e| (e.evidence_id, e)).collect()
  }

  fn accept(entity: &str, evidence_id: u128) -> Decision {
    Decision::Accept {
      entity_key:  key(entity),
      evidence_id: Uuid::from_u128(evidence_id),
      rule:        AcceptRule::SingleCandidatePeriodic,
    }
  }

  #[test]
  fn auto_accepts_become_episodes() {
    let win = w("2010-01-01", "2015-01-01");
    let decisions = BTreeMap::from([(win, accept("0000012345", 1))]);
    let ev = pool(vec![evidence(1, "0000012345", win, "2012-03-01")]);

    let out = merge_episodes(&t(), &[win], &decisions, &[], &ev).unwrap();
    assert_eq!(out.episodes.len(), 1);
    assert_eq!(out.episodes[0].justification, Justification::SingleCandidatePeriodic);
    assert_eq!(out.reports[0].stage(), WindowStage::MergedIntoEpisode);
  }

  #[test]
  fn adjudication_takes_precedence_over_rules() {
    let win = w("2010-01-01", "2015-01-01");
    let decisions = BTreeMap::from([(win, accept("0000012345", 1))]);
    let ev = pool(vec![
      evidence(1, "0000012345", win, "2012-03-01"),
      evidence(2, "0000099999", win, "2013-03-01"),
    ]);
    let ledger = vec![adjudication(
      10,
      AdjudicationAction::ManualOverride,
      win,
      Some("0000099999"),
      2,
    )];

    let out = merge_episodes(&t(), &[win], &decisions, &ledger, &ev).unwrap();
    assert_eq!(out.episodes.len(), 1);
    assert_eq!(out.episodes[0].entity_key, key("0000099999"));
    assert_eq!(out.episodes[0].justification, Justification::ManualOverride);
    assert_eq!(out.episodes[0].adjudication_id, Some(Uuid::from_u128(10)));
  }

  #[test]
  fn split_that_tiles_produces_finer_episodes() {
    let win = w("2010-01-01", "2015-01-01");
    let (a, b) = (w("2010-01-01", "2012-03-01"), w("2012-03-01", "2015-01-01"));
    let ev = pool(vec![
      evidence(1, "0000012345", a, "2011-03-01"),
      evidence(2, "0000099999", b, "2013-03-01"),
    ]);
    let ledger = vec![
      adjudication(10, AdjudicationAction::WindowSplit, a, Some("0000012345"), 1),
      adjudication(11, AdjudicationAction::WindowSplit, b, Some("0000099999"), 2),
    ];
    let decisions = BTreeMap::from([(win, Decision::NeedsAdjudication {
      reason:     ReviewReason::NoPeriodicEvidence,
      candidates: BTreeMap::new(),
    })]);

    let out = merge_episodes(&t(), &[win], &decisions, &ledger, &ev).unwrap();
    assert_eq!(
      out.episodes.iter().map(|e| e.window).collect::<Vec<_>>(),
      vec![a, b]
    );
    assert_eq!(out.reports[0].trace, vec![
      WindowStage::CandidatesGathered,
      WindowStage::NeedsAdjudication,
      WindowStage::PendingReview,
      WindowStage::Adjudicated,
      WindowStage::MergedIntoEpisode,
    ]);
  }

  #[test]
  fn split_with_one_day_gap_is_rejected() {
    let win = w("2010-01-01", "2015-01-01");
    let (a, b) = (w("2010-01-01", "2012-03-01"), w("2012-03-02", "2015-01-01"));
    let ev = pool(vec![
      evidence(1, "0000012345", a, "2011-03-01"),
      evidence(2, "0000099999", b, "2013-03-01"),
    ]);
    let ledger = vec![
      adjudication(10, AdjudicationAction::WindowSplit, a, Some("0000012345"), 1),
      adjudication(11, AdjudicationAction::WindowSplit, b, Some("0000099999"), 2),
    ];

    let err = merge_episodes(&t(), &[win], &BTreeMap::new(), &ledger, &ev).unwrap_err();
    assert_eq!(err, MergeInvariantViolation::NonTiling {
      ticker: t(),
      window: win,
      defect: TilingDefect::Gap { from: d("2012-03-01"), to: d("2012-03-02") },
    });
  }

  #[test]
  fn disagreeing_rulings_conflict() {
    let win = w("2010-01-01", "2015-01-01");
    let ev = pool(vec![
      evidence(1, "0000012345", win, "2011-03-01"),
      evidence(2, "0000099999", win, "2013-03-01"),
    ]);
    let ledger = vec![
      adjudication(10, AdjudicationAction::SeedWithEntity, win, Some("0000012345"), 1),
      adjudication(11, AdjudicationAction::ManualOverride, win, Some("0000099999"), 2),
    ];
    let err = merge_episodes(&t(), &[win], &BTreeMap::new(), &ledger, &ev).unwrap_err();
    assert!(matches!(err, MergeInvariantViolation::ConflictingAdjudications { .. }));
  }

  #[test]
  fn ruling_on_an_untracked_window_is_orphaned() {
    let win = w("2010-01-01", "2015-01-01");
    let stray = w("2016-01-01", "2017-01-01");
    let ledger = vec![adjudication(
      10,
      AdjudicationAction::SeedWithEntity,
      stray,
      Some("0000012345"),
      1,
    )];
    let err = merge_episodes(&t(), &[win], &BTreeMap::new(), &ledger, &BTreeMap::new())
      .unwrap_err();
    assert!(matches!(err, MergeInvariantViolation::OrphanAdjudication { .. }));
  }

  #[test]
  fn unresolvable_or_foreign_evidence_fails_provenance() {
    let win = w("2010-01-01", "2015-01-01");
    let decisions = BTreeMap::from([(win, accept("0000012345", 1))]);

    let err = merge_episodes(&t(), &[win], &decisions, &[], &BTreeMap::new()).unwrap_err();
    assert!(matches!(err, MergeInvariantViolation::Provenance { .. }));

    let ev = pool(vec![evidence(1, "0000099999", win, "2012-03-01")]);
    let err = merge_episodes(&t(), &[win], &decisions, &[], &ev).unwrap_err();
    assert!(matches!(
      err,
      MergeInvariantViolation::Provenance { reason: "belongs to another entity", .. }
    ));
  }

  #[test]
  fn open_windows_are_reported_without_episodes() {
    let (a, b) = (w("2010-01-01", "2012-01-01"), w("2013-01-01", "2015-01-01"));
    let decisions = BTreeMap::from([(a, Decision::NeedsAdjudication {
      reason:     ReviewReason::NoPeriodicEvidence,
      candidates: BTreeMap::new(),
    })]);
    let out = merge_episodes(&t(), &[b, a], &decisions, &[], &BTreeMap::new()).unwrap();
    assert!(out.episodes.is_empty());
    let stages: Vec<_> = out.reports.iter().map(WindowReport::stage).collect();
    assert_eq!(stages, vec![WindowStage::PendingReview, WindowStage::AwaitingEvidence]);
    assert_eq!(out.pending().count(), 2);
  }

  #[test]
  fn alias_rewrites_pass_through_as_corrections() {
    let win = w("2010-01-01", "2015-01-01");
    let mut alias = adjudication(10, AdjudicationAction::AliasRewrite, win, None, 1);
    alias.canonical_name = Some("ABCDHOLDINGS".into());
    let out = merge_episodes(&t(), &[win], &BTreeMap::new(), &[alias], &BTreeMap::new())
      .unwrap();
    assert!(out.episodes.is_empty());
    assert_eq!(out.corrections.len(), 1);
    assert_eq!(out.corrections[0].canonical_name, "ABCDHOLDINGS");
  }

  #[test]
  fn merging_twice_is_identical() {
    let win = w("2010-01-01", "2015-01-01");
    let decisions = BTreeMap::from([(win, accept("0000012345", 1))]);
    let ev = pool(vec![evidence(1, "0000012345", win, "2012-03-01")]);
    let a = merge_episodes(&t(), &[win], &decisions, &[], &ev).unwrap();
    let b = merge_episodes(&t(), &[win], &decisions, &[], &ev).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.episodes[0].episode_id(), b.episodes[0].episode_id());
  }
}
