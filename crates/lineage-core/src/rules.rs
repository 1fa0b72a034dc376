//! Auto-accept rule engine.
//!
//! Maps a [`CandidateSet`] to exactly one [`Decision`]. The rules look only
//! at per-candidate counts, never at the order candidates were found in, and
//! are evaluated first-match-wins:
//!
//! 1. one candidate, and it holds periodic filings: accept it;
//! 2. several candidates, exactly one holds periodic filings: accept that one;
//! 3. anything else goes to manual review.
//!
//! Periodic reports are filed only by the registrant, which is why a single
//! holder is treated as near-conclusive.

use std::{cmp::Reverse, collections::BTreeMap};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  aggregate::{CandidateSet, FeatureVector, PeriodicFiling},
  entity::EntityKey,
  error::EmptyCandidateSet,
  policy::FilingPolicy,
};

/// Which rule produced an acceptance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AcceptRule {
  SingleCandidatePeriodic,
  SinglePeriodicHolder,
}

/// Why a window could not be decided automatically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ReviewReason {
  /// Several candidates hold periodic filings; a likely issuer split.
  MultiplePeriodicHolders { holders: Vec<EntityKey> },
  /// No candidate holds a single periodic filing.
  NoPeriodicEvidence,
  /// The ticker is configured for manual review only.
  ManualOnlyTicker,
  /// A holder's periodic count is set but none of its filings are attached.
  MissingJustification { entity_key: EntityKey },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum Decision {
  Accept {
    entity_key:  EntityKey,
    /// The highest-priority periodic filing of the accepted candidate.
    evidence_id: Uuid,
    rule:        AcceptRule,
  },
  NeedsAdjudication {
    reason:     ReviewReason,
    /// The full candidate set, for the reviewer.
    candidates: BTreeMap<EntityKey, FeatureVector>,
  },
}

impl Decision {
  pub fn is_accept(&self) -> bool { matches!(self, Self::Accept { .. }) }
}

/// Decide a candidate set.
///
/// Total over non-empty input. An empty set means upstream evidence is
/// missing and is returned as an error rather than routed to review.
pub fn decide(
  set: &CandidateSet,
  policy: &FilingPolicy,
) -> Result<Decision, EmptyCandidateSet> {
  if set.is_empty() {
    return Err(EmptyCandidateSet { ticker: set.ticker.clone(), window: set.window });
  }

  let review = |reason| Decision::NeedsAdjudication { reason, candidates: set.features() };

  if policy.is_manual_only(&set.ticker) {
    return Ok(review(ReviewReason::ManualOnlyTicker));
  }

  let holders: Vec<&EntityKey> = set
    .candidates
    .iter()
    .filter(|(_, support)| support.features.periodic_filings >= 1)
    .map(|(key, _)| key)
    .collect();

  let &[holder] = holders.as_slice() else {
    let reason = if holders.is_empty() {
      ReviewReason::NoPeriodicEvidence
    } else {
      ReviewReason::MultiplePeriodicHolders {
        holders: holders.into_iter().cloned().collect(),
      }
    };
    return Ok(review(reason));
  };

  let rule = if set.len() == 1 {
    AcceptRule::SingleCandidatePeriodic
  } else {
    AcceptRule::SinglePeriodicHolder
  };

  let support = &set.candidates[holder];
  Ok(match canonical_evidence(&support.periodic, policy) {
    Some(filing) => Decision::Accept {
      entity_key: holder.clone(),
      evidence_id: filing.evidence_id,
      rule,
    },
    None => review(ReviewReason::MissingJustification { entity_key: holder.clone() }),
  })
}

/// Pick the filing that justifies an acceptance: lowest policy rank, then
/// most recent filing, then the larger evidence id.
pub fn canonical_evidence<'a>(
  filings: &'a [PeriodicFiling],
  policy: &FilingPolicy,
) -> Option<&'a PeriodicFiling> {
  filings.iter().min_by_key(|f| {
    (policy.rank(&f.filing_type), Reverse(f.filed_at), Reverse(f.evidence_id))
  })
}
