//! Adjudication ledger — validation of human decisions.
//!
//! Reviewers submit decisions as loosely typed [`NewAdjudication`] records
//! (typically JSON). [`validate_adjudication`] turns one into a typed
//! [`Adjudication`] or rejects it with a [`ValidationError`] naming the rule
//! and field that failed. The ledger is append-only: a stored decision is
//! never edited, and nothing here produces episodes.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString, VariantNames};
use uuid::Uuid;

use crate::{
  entity::EntityKey,
  error::ValidationError,
  evidence::{Evidence, content_id},
  ticker::Ticker,
  window::Window,
};

/// The fixed action vocabulary.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
  VariantNames,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum AdjudicationAction {
  /// Map the window to an entity the rules could not pick.
  SeedWithEntity,
  /// Replace whatever the rules produced with the reviewer's entity.
  ManualOverride,
  /// One of several finer windows that together replace a coarse window.
  WindowSplit,
  /// Correct the canonical name used for the window. Carries no entity.
  AliasRewrite,
}

impl AdjudicationAction {
  /// Every action except alias-rewrite names an entity and yields a mapping.
  pub fn requires_entity(self) -> bool { !matches!(self, Self::AliasRewrite) }
}

/// A decision as entered by a reviewer, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewAdjudication {
  pub ticker:         String,
  /// `YYYY-MM-DD`, inclusive.
  pub window_start:   String,
  /// `YYYY-MM-DD`, exclusive.
  pub window_end:     String,
  #[serde(default)]
  pub entity_key:     Option<String>,
  pub action:         String,
  pub rationale:      String,
  #[serde(default)]
  pub sources:        Vec<String>,
  #[serde(default)]
  pub evidence_id:    Option<String>,
  /// Required for alias-rewrite, forbidden otherwise.
  #[serde(default)]
  pub canonical_name: Option<String>,
}

/// A validated, immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adjudication {
  /// Derived from the decision's content, so re-recording an identical
  /// decision yields the same id.
  pub adjudication_id: Uuid,
  pub ticker:          Ticker,
  pub window:          Window,
  pub entity_key:      Option<EntityKey>,
  pub action:          AdjudicationAction,
  pub rationale:       String,
  pub sources:         Vec<String>,
  /// Representative evidence record backing the decision.
  pub evidence_id:     Uuid,
  pub canonical_name:  Option<String>,
  pub recorded_at:     DateTime<Utc>,
}

/// Result of validating against the existing ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
  /// Not yet in the ledger; persist it.
  Fresh(Adjudication),
  /// Already recorded; the stored entry is returned unchanged.
  Duplicate(Adjudication),
}

impl Admission {
  pub fn into_inner(self) -> Adjudication {
    match self {
      Self::Fresh(a) | Self::Duplicate(a) => a,
    }
  }
}

fn parse_date(field: &'static str, raw: &str) -> Result<NaiveDate, ValidationError> {
  NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
    .map_err(|_| ValidationError::format(field, format!("{raw:?} is not a YYYY-MM-DD date")))
}

fn non_blank(raw: Option<&str>) -> Option<&str> {
  raw.map(str::trim).filter(|s| !s.is_empty())
}

/// Validate a reviewer's decision against the ledger's current contents for
/// the same ticker.
///
/// Checks run in a fixed order and the first failure is returned:
/// action vocabulary, ticker and window format, entity presence and format,
/// rationale, citations, evidence pointer, canonical name, and finally
/// window exclusion against `existing` decisions. A decision may not
/// overlap another for the same `(ticker, entity)` pair, and two
/// entity-bearing decisions for a ticker may not overlap at all: the ledger
/// is append-only, so a second ruling on a window could never be merged.
pub fn validate_adjudication(
  input: &NewAdjudication,
  existing: &[Adjudication],
  recorded_at: DateTime<Utc>,
) -> Result<Admission, ValidationError> {
  let action: AdjudicationAction =
    input.action.trim().parse().map_err(|_| ValidationError::BadAction {
      action: input.action.clone(),
      reason: format!("expected one of {}", AdjudicationAction::VARIANTS.join(", ")),
    })?;

  let ticker = Ticker::normalize(&input.ticker)
    .map_err(|e| ValidationError::format("ticker", e.to_string()))?;
  let start = parse_date("window_start", &input.window_start)?;
  let end = parse_date("window_end", &input.window_end)?;
  let window =
    Window::new(start, end).map_err(|e| ValidationError::format("window", e.to_string()))?;

  let entity_key = match (action.requires_entity(), non_blank(input.entity_key.as_deref())) {
    (false, None) => None,
    (false, Some(_)) => {
      return Err(ValidationError::BadAction {
        action: action.to_string(),
        reason: "alias-rewrite must not carry an entity key".into(),
      });
    }
    (true, None) => {
      return Err(ValidationError::format(
        "entity_key",
        format!("required for {action}"),
      ));
    }
    (true, Some(raw)) => Some(
      EntityKey::parse(raw).map_err(|e| ValidationError::format("entity_key", e.to_string()))?,
    ),
  };

  let rationale = input.rationale.trim();
  if rationale.is_empty() {
    return Err(ValidationError::format("rationale", "must not be blank"));
  }

  let sources: Vec<String> = input
    .sources
    .iter()
    .map(|s| s.trim())
    .filter(|s| !s.is_empty())
    .map(str::to_owned)
    .collect();
  if sources.is_empty() {
    return Err(ValidationError::MissingCitation);
  }

  let evidence_id = non_blank(input.evidence_id.as_deref()).ok_or_else(|| {
    ValidationError::format("evidence_id", "a representative evidence id is required")
  })?;
  let evidence_id = Uuid::parse_str(evidence_id)
    .map_err(|e| ValidationError::format("evidence_id", e.to_string()))?;

  let canonical_name = non_blank(input.canonical_name.as_deref()).map(str::to_owned);
  match (action, &canonical_name) {
    (AdjudicationAction::AliasRewrite, None) => {
      return Err(ValidationError::format(
        "canonical_name",
        "required for alias-rewrite",
      ));
    }
    (a, Some(_)) if a != AdjudicationAction::AliasRewrite => {
      return Err(ValidationError::format(
        "canonical_name",
        "only alias-rewrite decisions carry a canonical name",
      ));
    }
    _ => {}
  }

  let adjudication_id = content_id(&serde_json::json!({
    "ticker":         ticker.as_str(),
    "window":         window.to_string(),
    "entity_key":     entity_key.as_ref().map(EntityKey::as_str),
    "action":         action.as_ref(),
    "rationale":      rationale,
    "sources":        sources,
    "evidence_id":    evidence_id.to_string(),
    "canonical_name": canonical_name,
  }));

  if let Some(stored) = existing.iter().find(|a| a.adjudication_id == adjudication_id) {
    return Ok(Admission::Duplicate(stored.clone()));
  }

  if let Some(clash) = existing.iter().find(|a| {
    a.ticker == ticker
      && a.window.overlaps(&window)
      && (a.entity_key == entity_key || (a.action.requires_entity() && action.requires_entity()))
  }) {
    return Err(ValidationError::WindowOverlap {
      ticker,
      entity_key,
      window,
      existing: clash.window,
      existing_id: clash.adjudication_id,
    });
  }

  Ok(Admission::Fresh(Adjudication {
    adjudication_id,
    ticker,
    window,
    entity_key,
    action,
    rationale: rationale.to_owned(),
    sources,
    evidence_id,
    canonical_name,
    recorded_at,
  }))
}

/// Check that a decision lands on the ticker's tracked windows.
///
/// Seeds and overrides must name a tracked window exactly; a split must lie
/// inside a single tracked window. Alias-rewrites only touch names and may
/// cover any period.
pub fn check_tracked_window(
  adjudication: &Adjudication,
  tracked: &[Window],
) -> Result<(), ValidationError> {
  let window = adjudication.window;
  let placed = match adjudication.action {
    AdjudicationAction::SeedWithEntity | AdjudicationAction::ManualOverride => {
      tracked.contains(&window)
    }
    AdjudicationAction::WindowSplit => {
      tracked.iter().filter(|t| t.start() <= window.start() && window.end() <= t.end()).count()
        == 1
    }
    AdjudicationAction::AliasRewrite => true,
  };
  if placed {
    return Ok(());
  }
  let expected = match adjudication.action {
    AdjudicationAction::WindowSplit => "lie inside one",
    _ => "equal a",
  };
  Err(ValidationError::format(
    "window",
    format!(
      "{} for {} must {expected} tracked window of the ticker",
      window, adjudication.action
    ),
  ))
}

/// Check that a decision's evidence pointer resolves to a record for the
/// same ticker (and entity, when the decision names one) filed inside the
/// decision's window.
pub fn check_evidence_pointer(
  adjudication: &Adjudication,
  evidence: Option<&Evidence>,
) -> Result<(), ValidationError> {
  let id = adjudication.evidence_id;
  let Some(ev) = evidence else {
    return Err(ValidationError::format(
      "evidence_id",
      format!("no evidence record {id}"),
    ));
  };
  if ev.ticker != adjudication.ticker {
    return Err(ValidationError::format(
      "evidence_id",
      format!("evidence {id} belongs to ticker {}", ev.ticker),
    ));
  }
  if adjudication.entity_key.as_ref().is_some_and(|key| key != &ev.entity_key) {
    return Err(ValidationError::format(
      "evidence_id",
      format!("evidence {id} belongs to entity {}", ev.entity_key),
    ));
  }
  if !adjudication.window.contains(ev.filed_at.date_naive()) {
    return Err(ValidationError::format(
      "evidence_id",
      format!(
        "evidence {id} was filed on {}, outside {}",
        ev.filed_at.date_naive(),
        adjudication.window
      ),
    ));
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  const EVIDENCE: &str = "6f1c2d3e-4b5a-5c6d-8e7f-a0b1c2d3e4f5";

  fn now() -> DateTime<Utc> { Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() }

  fn seed() -> NewAdjudication {
    NewAdjudication {
      ticker:         "ABCD".into(),
      window_start:   "2010-01-01".into(),
      window_end:     "2015-01-01".into(),
      entity_key:     Some("0000012345".into()),
      action:         "seed-with-entity".into(),
      rationale:      "Issuer named on the 2011 annual report cover page".into(),
      sources:        vec!["https://www.sec.gov/Archives/edgar/data/12345/".into()],
      evidence_id:    Some(EVIDENCE.into()),
      canonical_name: None,
    }
  }

  fn admit(input: &NewAdjudication, existing: &[Adjudication]) -> Adjudication {
    match validate_adjudication(input, existing, now()).unwrap() {
      Admission::Fresh(a) => a,
      other => panic!("expected fresh, got {other:?}"),
    }
  }

  #[test]
  fn accepts_a_well_formed_seed() {
    let adj = admit(&seed(), &[]);
    assert_eq!(adj.action, AdjudicationAction::SeedWithEntity);
    assert_eq!(adj.entity_key.unwrap().as_str(), "0000012345");
    assert_eq!(adj.window.to_string(), "2010-01-01 to 2015-01-01");
  }

  #[test]
  fn unknown_action_is_bad_action() {
    let mut input = seed();
    input.action = "merge".into();
    let err = validate_adjudication(&input, &[], now()).unwrap_err();
    assert!(matches!(err, ValidationError::BadAction { .. }));
    assert_eq!(err.field(), "action");
    assert!(err.to_string().contains("seed-with-entity"));
  }

  #[test]
  fn alias_rewrite_with_entity_is_rejected() {
    let mut input = seed();
    input.action = "alias-rewrite".into();
    input.canonical_name = Some("ABCDHOLDINGS".into());
    let err = validate_adjudication(&input, &[], now()).unwrap_err();
    assert!(matches!(err, ValidationError::BadAction { .. }));

    input.entity_key = None;
    let adj = admit(&input, &[]);
    assert_eq!(adj.entity_key, None);
    assert_eq!(adj.canonical_name.as_deref(), Some("ABCDHOLDINGS"));
  }

  #[test]
  fn entity_key_must_be_canonical() {
    let mut input = seed();
    input.entity_key = Some("12345".into());
    let err = validate_adjudication(&input, &[], now()).unwrap_err();
    assert_eq!(err.field(), "entity_key");

    input.entity_key = None;
    let err = validate_adjudication(&input, &[], now()).unwrap_err();
    assert_eq!(err.field(), "entity_key");
  }

  #[test]
  fn blank_citations_are_missing() {
    let mut input = seed();
    input.sources = vec!["  ".into()];
    assert_eq!(
      validate_adjudication(&input, &[], now()).unwrap_err(),
      ValidationError::MissingCitation
    );
  }

  #[test]
  fn malformed_window_is_a_format_violation() {
    let mut input = seed();
    input.window_end = "2010-01-01".into();
    assert_eq!(validate_adjudication(&input, &[], now()).unwrap_err().field(), "window");

    input.window_end = "01/01/2015".into();
    assert_eq!(
      validate_adjudication(&input, &[], now()).unwrap_err().field(),
      "window_end"
    );
  }

  #[test]
  fn overlapping_window_for_same_pair_is_rejected() {
    let first = admit(&seed(), &[]);

    let mut input = seed();
    input.window_start = "2014-06-01".into();
    input.window_end = "2016-01-01".into();
    let err = validate_adjudication(&input, &[first.clone()], now()).unwrap_err();
    assert!(matches!(err, ValidationError::WindowOverlap { existing_id, .. } if existing_id == first.adjudication_id));

    // Adjacent windows do not overlap.
    input.window_start = "2015-01-01".into();
    admit(&input, &[first.clone()]);

    // A second entity on an already-ruled window could never be merged.
    let mut other = seed();
    other.entity_key = Some("0000099999".into());
    other.action = "manual-override".into();
    let err = validate_adjudication(&other, &[first.clone()], now()).unwrap_err();
    assert!(matches!(err, ValidationError::WindowOverlap { .. }));
    assert_eq!(err.field(), "window");

    // An alias-rewrite on the same window carries no entity and is fine.
    let mut alias = seed();
    alias.action = "alias-rewrite".into();
    alias.entity_key = None;
    alias.canonical_name = Some("ABCDHOLDINGS".into());
    admit(&alias, &[first]);
  }

  #[test]
  fn rulings_must_land_on_tracked_windows() {
    let seeded = admit(&seed(), &[]);
    let tracked = [seeded.window];
    check_tracked_window(&seeded, &tracked).unwrap();

    let mut narrow = seed();
    narrow.window_end = "2014-01-01".into();
    let narrow = admit(&narrow, &[]);
    let err = check_tracked_window(&narrow, &tracked).unwrap_err();
    assert_eq!(err.field(), "window");

    let mut split = seed();
    split.action = "window-split".into();
    split.window_end = "2012-07-01".into();
    check_tracked_window(&admit(&split, &[]), &tracked).unwrap();

    split.window_end = "2016-01-01".into();
    assert_eq!(
      check_tracked_window(&admit(&split, &[]), &tracked).unwrap_err().field(),
      "window"
    );
  }

  #[test]
  fn identical_decision_is_a_duplicate() {
    let first = admit(&seed(), &[]);
    let again = validate_adjudication(&seed(), &[first.clone()], now()).unwrap();
    assert_eq!(again, Admission::Duplicate(first));
  }

  #[test]
  fn canonical_name_only_on_alias_rewrite() {
    let mut input = seed();
    input.canonical_name = Some("ABCD".into());
    assert_eq!(
      validate_adjudication(&input, &[], now()).unwrap_err().field(),
      "canonical_name"
    );
  }
}
