//! Candidates and evidence records — the raw input of the decision engine.
//!
//! Both are produced by external evidence producers (archive scrapes, filing
//! searches) and are append-only: never mutated, retained for audit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
  entity::EntityKey, error::DataQualityError, ticker::Ticker, window::Window,
};

/// Namespace for every deterministic id Lineage derives. Never rotate it:
/// changing it changes every stored id.
pub const LINEAGE_NAMESPACE: Uuid =
  Uuid::from_u128(0x5b2f_91c4_7d0e_4a63_9f1b_c08e_36d2_a7e5);

/// Derive a stable id from a JSON identity document. Object keys serialise
/// in sorted order, so equal documents always hash equally.
pub(crate) fn content_id(identity: &serde_json::Value) -> Uuid {
  let digest = Sha256::digest(identity.to_string().as_bytes());
  Uuid::new_v5(&LINEAGE_NAMESPACE, hex::encode(digest).as_bytes())
}

// ─── Candidate ───────────────────────────────────────────────────────────────

/// An entity proposed for a ticker window by an archive snapshot scrape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
  pub ticker:         Ticker,
  pub window:         Window,
  pub entity_key:     EntityKey,
  pub first_seen_at:  DateTime<Utc>,
  pub last_seen_at:   DateTime<Utc>,
  pub first_seen_url: String,
  pub last_seen_url:  String,
}

impl Candidate {
  pub fn validate(&self) -> Result<(), DataQualityError> {
    if self.last_seen_at < self.first_seen_at {
      return Err(DataQualityError::CandidateSeenOrder {
        ticker:     self.ticker.clone(),
        entity_key: self.entity_key.clone(),
      });
    }
    Ok(())
  }
}

// ─── Evidence ────────────────────────────────────────────────────────────────

/// One dated, sourced filing supporting a `(ticker, entity)` claim inside a
/// window. Once written, no field is ever updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
  pub evidence_id:  Uuid,
  pub ticker:       Ticker,
  pub entity_key:   EntityKey,
  pub window:       Window,
  pub filed_at:     DateTime<Utc>,
  pub filing_type:  String,
  /// Event sub-items listed on the filing, if any. Not part of the identity.
  pub items:        Vec<String>,
  pub accession:    Option<String>,
  pub source:       String,
  /// The producer's raw record, kept verbatim for audit.
  pub raw_payload:  serde_json::Value,
  /// Company name as printed on the filing.
  pub company_name: String,
}

/// Input to evidence ingestion. The id is derived, never accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEvidence {
  pub ticker:       Ticker,
  pub entity_key:   EntityKey,
  pub window:       Window,
  pub filed_at:     DateTime<Utc>,
  pub filing_type:  String,
  #[serde(default)]
  pub items:        Vec<String>,
  #[serde(default)]
  pub accession:    Option<String>,
  pub source:       String,
  #[serde(default)]
  pub raw_payload:  serde_json::Value,
  pub company_name: String,
}

impl NewEvidence {
  /// Check that the filing falls inside its window and assign the
  /// deterministic evidence id.
  pub fn into_evidence(self) -> Result<Evidence, DataQualityError> {
    let evidence_id = evidence_id(
      &self.ticker,
      &self.entity_key,
      self.filed_at,
      self.accession.as_deref(),
      &self.filing_type,
    );
    let filed_on = self.filed_at.date_naive();
    if !self.window.contains(filed_on) {
      return Err(DataQualityError::EvidenceOutsideWindow {
        evidence_id,
        filed_on,
        window: self.window,
      });
    }

    Ok(Evidence {
      evidence_id,
      ticker: self.ticker,
      entity_key: self.entity_key,
      window: self.window,
      filed_at: self.filed_at,
      filing_type: self.filing_type.trim().to_ascii_uppercase(),
      items: self.items,
      accession: self.accession,
      source: self.source,
      raw_payload: self.raw_payload,
      company_name: self.company_name,
    })
  }
}

/// Deterministic evidence id over the stable filing attributes.
///
/// The window is deliberately absent: the same filing found through two
/// windows is the same evidence.
pub fn evidence_id(
  ticker: &Ticker,
  entity_key: &EntityKey,
  filed_at: DateTime<Utc>,
  accession: Option<&str>,
  filing_type: &str,
) -> Uuid {
  let mut additional_info = filed_at.to_rfc3339();
  if let Some(accession) = accession.filter(|a| !a.is_empty()) {
    additional_info.push('+');
    additional_info.push_str(accession);
  }
  let form = filing_type.trim().to_ascii_uppercase();
  if !form.is_empty() {
    additional_info.push('+');
    additional_info.push_str(&form);
  }

  content_id(&serde_json::json!({
    "ticker":          ticker.as_str(),
    "entity_key":      entity_key.as_str(),
    "additional_info": additional_info,
  }))
}

// ─── Harvest checkpoints ─────────────────────────────────────────────────────

/// One `(ticker, window, candidate)` triple an evidence producer has fully
/// harvested, or that a reviewer excluded from harvesting.
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct HarvestKey {
  pub ticker:     Ticker,
  pub window:     Window,
  pub entity_key: EntityKey,
}

/// A completed harvest, written in the same transaction as its evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestRun {
  pub key:        HarvestKey,
  pub run_id:     Uuid,
  pub started_at: DateTime<Utc>,
}

impl HarvestRun {
  /// Reject evidence that does not belong to this harvest's triple.
  pub fn check_owns(&self, evidence: &Evidence) -> Result<(), DataQualityError> {
    let key = &self.key;
    if evidence.ticker != key.ticker
      || evidence.window != key.window
      || evidence.entity_key != key.entity_key
    {
      return Err(DataQualityError::ForeignEvidence {
        ticker:      key.ticker.clone(),
        entity_key:  key.entity_key.clone(),
        window:      key.window,
        evidence_id: evidence.evidence_id,
      });
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use chrono::{NaiveDate, TimeZone};

  use super::*;

  fn new_evidence(filed: (i32, u32, u32)) -> NewEvidence {
    let start = NaiveDate::from_ymd_opt(2010, 1, 1).unwrap();
    let end = NaiveDate::from_ymd_opt(2015, 1, 1).unwrap();
    NewEvidence {
      ticker:       Ticker::normalize("ABCD").unwrap(),
      entity_key:   EntityKey::parse("0000012345").unwrap(),
      window:       Window::new(start, end).unwrap(),
      filed_at:     Utc.with_ymd_and_hms(filed.0, filed.1, filed.2, 16, 5, 0).unwrap(),
      filing_type:  "10-k".into(),
      items:        vec![],
      accession:    Some("000001234512000007".into()),
      source:       "edgar_fts".into(),
      raw_payload:  serde_json::json!({ "page": 1 }),
      company_name: "ABCD Holdings Inc.".into(),
    }
  }

  #[test]
  fn evidence_id_is_deterministic_and_ignores_enrichment() {
    let a = new_evidence((2012, 3, 1)).into_evidence().unwrap();
    let mut other = new_evidence((2012, 3, 1));
    other.items = vec!["2.01".into()];
    other.raw_payload = serde_json::json!({ "page": 9 });
    let b = other.into_evidence().unwrap();
    assert_eq!(a.evidence_id, b.evidence_id);
    assert_eq!(a.filing_type, "10-K");
  }

  #[test]
  fn evidence_id_changes_with_identity_fields() {
    let a = new_evidence((2012, 3, 1)).into_evidence().unwrap();
    let b = new_evidence((2013, 3, 1)).into_evidence().unwrap();
    let mut c = new_evidence((2012, 3, 1));
    c.accession = None;
    let c = c.into_evidence().unwrap();
    assert_ne!(a.evidence_id, b.evidence_id);
    assert_ne!(a.evidence_id, c.evidence_id);
  }

  #[test]
  fn filing_outside_window_is_rejected() {
    let err = new_evidence((2015, 1, 1)).into_evidence().unwrap_err();
    assert!(matches!(err, DataQualityError::EvidenceOutsideWindow { .. }));
  }
}
