//! Error types for `lineage-core`.
//!
//! Every error here is deterministic: the same input always produces the same
//! error. None of them are retried inside the core.

use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use crate::{entity::EntityKey, ticker::Ticker, window::{TilingDefect, Window}};

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  DataQuality(#[from] DataQualityError),

  #[error(transparent)]
  EmptyCandidateSet(#[from] EmptyCandidateSet),

  #[error(transparent)]
  Validation(#[from] ValidationError),

  #[error(transparent)]
  MergeInvariant(#[from] MergeInvariantViolation),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

// ─── Data quality ────────────────────────────────────────────────────────────

/// Malformed or inconsistent upstream input. Fatal for the offending record;
/// never silently repaired.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataQualityError {
  #[error("invalid ticker {raw:?}: {reason}")]
  InvalidTicker { raw: String, reason: &'static str },

  #[error("invalid entity key {raw:?}: {reason}")]
  InvalidEntityKey { raw: String, reason: &'static str },

  #[error("invalid window [{start}, {end}): start must precede end")]
  InvalidWindow { start: NaiveDate, end: NaiveDate },

  #[error("malformed window key {0:?}, expected 'YYYY-MM-DD to YYYY-MM-DD'")]
  MalformedWindowKey(String),

  #[error("{ticker}: observation dated {date} precedes earlier observation dated {previous}")]
  NonMonotonic {
    ticker:   Ticker,
    previous: NaiveDate,
    date:     NaiveDate,
  },

  #[error("{ticker}: conflicting membership flags on {date}")]
  ConflictingObservation { ticker: Ticker, date: NaiveDate },

  #[error("{ticker}: observation dated {date} falls after horizon end {horizon_end}")]
  OutsideHorizon {
    ticker:      Ticker,
    date:        NaiveDate,
    horizon_end: NaiveDate,
  },

  #[error("evidence {evidence_id}: filed on {filed_on}, outside window {window}")]
  EvidenceOutsideWindow {
    evidence_id: Uuid,
    filed_on:    NaiveDate,
    window:      Window,
  },

  #[error("candidate {entity_key} for {ticker}: last seen before first seen")]
  CandidateSeenOrder { ticker: Ticker, entity_key: EntityKey },

  #[error("{ticker}: window {window} overlaps stored window {existing}")]
  WindowConflict {
    ticker:   Ticker,
    window:   Window,
    existing: Window,
  },

  #[error("{ticker}: window {window} is not tracked")]
  UntrackedWindow { ticker: Ticker, window: Window },

  #[error("harvest for {ticker}/{entity_key} {window} received foreign evidence {evidence_id}")]
  ForeignEvidence {
    ticker:      Ticker,
    entity_key:  EntityKey,
    window:      Window,
    evidence_id: Uuid,
  },
}

// ─── Empty candidate set ─────────────────────────────────────────────────────

/// The rule engine was handed a window with no candidates at all. This means
/// an evidence producer or the window builder failed upstream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{ticker} {window}: candidate set is empty; upstream evidence is missing")]
pub struct EmptyCandidateSet {
  pub ticker: Ticker,
  pub window: Window,
}

// ─── Validation ──────────────────────────────────────────────────────────────

/// Rejection of a human-entered adjudication. Each variant names the rule and
/// the field that failed so the reviewer can correct the input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
  #[error("field `action`: {action:?} rejected: {reason}")]
  BadAction { action: String, reason: String },

  #[error("field `sources`: at least one non-blank source citation is required")]
  MissingCitation,

  #[error(
    "field `window`: {window} overlaps adjudication {existing_id} ({existing}) for {ticker}/{}",
    .entity_key.as_ref().map_or("<no entity>", EntityKey::as_str)
  )]
  WindowOverlap {
    ticker:      Ticker,
    entity_key:  Option<EntityKey>,
    window:      Window,
    existing:    Window,
    existing_id: Uuid,
  },

  #[error("field `{field}`: {reason}")]
  FormatViolation { field: &'static str, reason: String },
}

impl ValidationError {
  pub(crate) fn format(field: &'static str, reason: impl Into<String>) -> Self {
    Self::FormatViolation { field, reason: reason.into() }
  }

  /// The input field the reviewer has to fix.
  pub fn field(&self) -> &'static str {
    match self {
      Self::BadAction { .. } => "action",
      Self::MissingCitation => "sources",
      Self::WindowOverlap { .. } => "window",
      Self::FormatViolation { field, .. } => *field,
    }
  }
}

// ─── Merge invariants ────────────────────────────────────────────────────────

/// A proposed merge would break episode invariants. Nothing is committed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeInvariantViolation {
  #[error("{ticker}: episodes {first} and {second} overlap")]
  Overlap {
    ticker: Ticker,
    first:  Window,
    second: Window,
  },

  #[error("{ticker}: window-split of {window} does not tile it: {defect}")]
  NonTiling {
    ticker: Ticker,
    window: Window,
    defect: TilingDefect,
  },

  #[error("{ticker}: adjudications for {window} disagree")]
  ConflictingAdjudications {
    ticker:           Ticker,
    window:           Window,
    adjudication_ids: Vec<Uuid>,
  },

  #[error("{ticker}: adjudication {adjudication_id} for {window} matches no tracked window")]
  OrphanAdjudication {
    ticker:          Ticker,
    window:          Window,
    adjudication_id: Uuid,
  },

  #[error("{ticker}: adjudication {adjudication_id} carries no entity key")]
  MissingEntity { ticker: Ticker, adjudication_id: Uuid },

  #[error("{ticker}/{entity_key} {window}: evidence {evidence_id} {reason}")]
  Provenance {
    ticker:      Ticker,
    entity_key:  EntityKey,
    window:      Window,
    evidence_id: Uuid,
    reason:      &'static str,
  },

  #[error("{entity_key} {window}: name evidence {evidence_id} {reason}")]
  NameProvenance {
    entity_key:  EntityKey,
    window:      Window,
    evidence_id: Uuid,
    reason:      &'static str,
  },

  #[error("{entity_key}: name episodes {first} and {second} overlap")]
  NameOverlap {
    entity_key: EntityKey,
    first:      Window,
    second:     Window,
  },
}
