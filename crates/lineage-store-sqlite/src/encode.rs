//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings, dates `YYYY-MM-DD`. Lists and producer
//! payloads are compact JSON. UUIDs are hyphenated lowercase strings. Tickers
//! and entity keys are re-validated on the way out.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use lineage_core::{
  EntityKey, Ticker, Window,
  adjudication::{Adjudication, AdjudicationAction},
  evidence::{Candidate, Evidence},
  lifecycle::{EpisodeStatus, Resolved, WindowReport, WindowStage},
  merge::{Justification, MappingEpisode},
  names::NameEpisode,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::DateParse(e.to_string()))
}

/// `(window_start, window_end)` column pair.
pub fn encode_window(w: Window) -> (String, String) {
  (encode_date(w.start()), encode_date(w.end()))
}

pub fn decode_window(start: &str, end: &str) -> Result<Window> {
  Ok(Window::new(decode_date(start)?, decode_date(end)?)?)
}

pub fn decode_ticker(s: &str) -> Result<Ticker> { Ok(Ticker::normalize(s)?) }

pub fn decode_entity(s: &str) -> Result<EntityKey> { Ok(EntityKey::parse(s)?) }

/// Parse a kebab-case enum column.
pub fn decode_enum<T: FromStr>(column: &'static str, s: &str) -> Result<T> {
  s.parse()
    .map_err(|_| Error::UnknownValue { column, value: s.to_owned() })
}

pub fn encode_strings(items: &[String]) -> Result<String> {
  Ok(serde_json::to_string(items)?)
}

pub fn decode_strings(s: &str) -> Result<Vec<String>> { Ok(serde_json::from_str(s)?) }

// ─── Lifecycle ───────────────────────────────────────────────────────────────

pub const SUPERSEDED: &str = "superseded";
pub const REINSTATED: &str = "reinstated";

pub fn decode_status(
  last_event: Option<String>,
  last_event_at: Option<String>,
) -> Result<EpisodeStatus> {
  match (last_event.as_deref(), last_event_at) {
    (Some(SUPERSEDED), Some(at)) => Ok(EpisodeStatus::Superseded { at: decode_dt(&at)? }),
    (None | Some(REINSTATED), _) => Ok(EpisodeStatus::Active),
    (Some(other), _) => Err(Error::UnknownValue {
      column: "event",
      value:  other.to_owned(),
    }),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `candidate` row.
pub struct RawCandidate {
  pub ticker:         String,
  pub window_start:   String,
  pub window_end:     String,
  pub entity_key:     String,
  pub first_seen_at:  String,
  pub last_seen_at:   String,
  pub first_seen_url: String,
  pub last_seen_url:  String,
}

impl RawCandidate {
  pub const COLUMNS: &'static str = "ticker, window_start, window_end, entity_key, \
     first_seen_at, last_seen_at, first_seen_url, last_seen_url";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      ticker:         row.get(0)?,
      window_start:   row.get(1)?,
      window_end:     row.get(2)?,
      entity_key:     row.get(3)?,
      first_seen_at:  row.get(4)?,
      last_seen_at:   row.get(5)?,
      first_seen_url: row.get(6)?,
      last_seen_url:  row.get(7)?,
    })
  }

  pub fn into_candidate(self) -> Result<Candidate> {
    Ok(Candidate {
      ticker:         decode_ticker(&self.ticker)?,
      window:         decode_window(&self.window_start, &self.window_end)?,
      entity_key:     decode_entity(&self.entity_key)?,
      first_seen_at:  decode_dt(&self.first_seen_at)?,
      last_seen_at:   decode_dt(&self.last_seen_at)?,
      first_seen_url: self.first_seen_url,
      last_seen_url:  self.last_seen_url,
    })
  }
}

/// Raw strings read directly from an `evidence` row.
pub struct RawEvidence {
  pub evidence_id:  String,
  pub ticker:       String,
  pub entity_key:   String,
  pub window_start: String,
  pub window_end:   String,
  pub filed_at:     String,
  pub filing_type:  String,
  pub items:        String,
  pub accession:    Option<String>,
  pub source:       String,
  pub raw_payload:  String,
  pub company_name: String,
}

impl RawEvidence {
  pub const COLUMNS: &'static str = "evidence_id, ticker, entity_key, window_start, \
     window_end, filed_at, filing_type, items, accession, source, raw_payload, company_name";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      evidence_id:  row.get(0)?,
      ticker:       row.get(1)?,
      entity_key:   row.get(2)?,
      window_start: row.get(3)?,
      window_end:   row.get(4)?,
      filed_at:     row.get(5)?,
      filing_type:  row.get(6)?,
      items:        row.get(7)?,
      accession:    row.get(8)?,
      source:       row.get(9)?,
      raw_payload:  row.get(10)?,
      company_name: row.get(11)?,
    })
  }

  pub fn into_evidence(self) -> Result<Evidence> {
    Ok(Evidence {
      evidence_id:  decode_uuid(&self.evidence_id)?,
      ticker:       decode_ticker(&self.ticker)?,
      entity_key:   decode_entity(&self.entity_key)?,
      window:       decode_window(&self.window_start, &self.window_end)?,
      filed_at:     decode_dt(&self.filed_at)?,
      filing_type:  self.filing_type,
      items:        decode_strings(&self.items)?,
      accession:    self.accession,
      source:       self.source,
      raw_payload:  serde_json::from_str(&self.raw_payload)?,
      company_name: self.company_name,
    })
  }
}

/// Raw strings read directly from an `adjudication` row.
pub struct RawAdjudication {
  pub adjudication_id: String,
  pub ticker:          String,
  pub window_start:    String,
  pub window_end:      String,
  pub entity_key:      Option<String>,
  pub action:          String,
  pub rationale:       String,
  pub sources:         String,
  pub evidence_id:     String,
  pub canonical_name:  Option<String>,
  pub recorded_at:     String,
}

impl RawAdjudication {
  pub const COLUMNS: &'static str = "adjudication_id, ticker, window_start, window_end, \
     entity_key, action, rationale, sources, evidence_id, canonical_name, recorded_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      adjudication_id: row.get(0)?,
      ticker:          row.get(1)?,
      window_start:    row.get(2)?,
      window_end:      row.get(3)?,
      entity_key:      row.get(4)?,
      action:          row.get(5)?,
      rationale:       row.get(6)?,
      sources:         row.get(7)?,
      evidence_id:     row.get(8)?,
      canonical_name:  row.get(9)?,
      recorded_at:     row.get(10)?,
    })
  }

  pub fn into_adjudication(self) -> Result<Adjudication> {
    Ok(Adjudication {
      adjudication_id: decode_uuid(&self.adjudication_id)?,
      ticker:          decode_ticker(&self.ticker)?,
      window:          decode_window(&self.window_start, &self.window_end)?,
      entity_key:      self.entity_key.as_deref().map(decode_entity).transpose()?,
      action:          decode_enum::<AdjudicationAction>("action", &self.action)?,
      rationale:       self.rationale,
      sources:         decode_strings(&self.sources)?,
      evidence_id:     decode_uuid(&self.evidence_id)?,
      canonical_name:  self.canonical_name,
      recorded_at:     decode_dt(&self.recorded_at)?,
    })
  }
}

/// Raw strings read from the `mapping_status` view.
pub struct RawMapping {
  pub ticker:             String,
  pub entity_key:         String,
  pub window_start:       String,
  pub window_end:         String,
  pub evidence_id:        String,
  pub justification_type: String,
  pub adjudication_id:    Option<String>,
  pub recorded_at:        String,
  pub last_event:         Option<String>,
  pub last_event_at:      Option<String>,
}

impl RawMapping {
  pub const COLUMNS: &'static str = "ticker, entity_key, window_start, window_end, \
     evidence_id, justification_type, adjudication_id, recorded_at, last_event, last_event_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      ticker:             row.get(0)?,
      entity_key:         row.get(1)?,
      window_start:       row.get(2)?,
      window_end:         row.get(3)?,
      evidence_id:        row.get(4)?,
      justification_type: row.get(5)?,
      adjudication_id:    row.get(6)?,
      recorded_at:        row.get(7)?,
      last_event:         row.get(8)?,
      last_event_at:      row.get(9)?,
    })
  }

  pub fn into_resolved(self) -> Result<Resolved<MappingEpisode>> {
    let episode = MappingEpisode {
      ticker:          decode_ticker(&self.ticker)?,
      entity_key:      decode_entity(&self.entity_key)?,
      window:          decode_window(&self.window_start, &self.window_end)?,
      evidence_id:     decode_uuid(&self.evidence_id)?,
      justification:   decode_enum::<Justification>(
        "justification_type",
        &self.justification_type,
      )?,
      adjudication_id: self.adjudication_id.as_deref().map(decode_uuid).transpose()?,
    };
    Ok(Resolved {
      episode,
      status: decode_status(self.last_event, self.last_event_at)?,
      recorded_at: decode_dt(&self.recorded_at)?,
    })
  }
}

/// Raw strings read from the `name_status` view.
pub struct RawName {
  pub entity_key:     String,
  pub window_start:   String,
  pub window_end:     String,
  pub canonical_name: String,
  pub observed_name:  String,
  pub evidence_id:    String,
  pub corrected_by:   Option<String>,
  pub recorded_at:    String,
  pub last_event:     Option<String>,
  pub last_event_at:  Option<String>,
}

impl RawName {
  pub const COLUMNS: &'static str = "entity_key, window_start, window_end, canonical_name, \
     observed_name, evidence_id, corrected_by, recorded_at, last_event, last_event_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      entity_key:     row.get(0)?,
      window_start:   row.get(1)?,
      window_end:     row.get(2)?,
      canonical_name: row.get(3)?,
      observed_name:  row.get(4)?,
      evidence_id:    row.get(5)?,
      corrected_by:   row.get(6)?,
      recorded_at:    row.get(7)?,
      last_event:     row.get(8)?,
      last_event_at:  row.get(9)?,
    })
  }

  pub fn into_resolved(self) -> Result<Resolved<NameEpisode>> {
    let episode = NameEpisode {
      entity_key:     decode_entity(&self.entity_key)?,
      window:         decode_window(&self.window_start, &self.window_end)?,
      canonical_name: self.canonical_name,
      observed_name:  self.observed_name,
      evidence_id:    decode_uuid(&self.evidence_id)?,
      corrected_by:   self.corrected_by.as_deref().map(decode_uuid).transpose()?,
    };
    Ok(Resolved {
      episode,
      status: decode_status(self.last_event, self.last_event_at)?,
      recorded_at: decode_dt(&self.recorded_at)?,
    })
  }
}

/// Raw strings read directly from a `window_report` row.
pub struct RawReport {
  pub ticker:       String,
  pub window_start: String,
  pub window_end:   String,
  pub trace:        String,
}

impl RawReport {
  pub fn into_report(self) -> Result<WindowReport> {
    let trace = decode_strings(&self.trace)?
      .iter()
      .map(|s| decode_enum::<WindowStage>("trace", s))
      .collect::<Result<_>>()?;
    Ok(WindowReport {
      ticker: decode_ticker(&self.ticker)?,
      window: decode_window(&self.window_start, &self.window_end)?,
      trace,
    })
  }
}
