//! [`SqliteStore`] — the SQLite implementation of [`EvidenceStore`].

use std::{
  collections::{BTreeMap, BTreeSet},
  path::Path,
};

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use lineage_core::{
  DataQualityError, EntityKey, MergeInvariantViolation, Ticker, Window,
  adjudication::{
    Adjudication, Admission, NewAdjudication, check_evidence_pointer, check_tracked_window,
    validate_adjudication,
  },
  evidence::{Candidate, Evidence, HarvestKey, HarvestRun, NewEvidence},
  lifecycle::{CommitSummary, Resolved, WindowReport, WindowStage},
  merge::{MappingEpisode, check_provenance},
  names::{NameEpisode, check_name_provenance},
  store::EvidenceStore,
  window::find_overlap,
};

use crate::{
  Error, Result,
  encode::{
    REINSTATED, RawAdjudication, RawCandidate, RawEvidence, RawMapping, RawName, RawReport,
    SUPERSEDED, decode_entity, decode_ticker, decode_window, encode_dt, encode_strings,
    encode_uuid, encode_window,
  },
  schema::SCHEMA,
};

/// Lifecycle events leave an episode active unless the newest one is a
/// supersession.
const ACTIVE: &str = "(last_event IS NULL OR last_event = 'reinstated')";

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Lineage evidence and episode store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run `f` inside a `BEGIN IMMEDIATE` transaction. The transaction commits
  /// only when `f` succeeds; any error rolls everything back.
  async fn write<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&rusqlite::Transaction<'_>) -> Result<T> + Send + 'static,
  {
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        match f(&tx) {
          Ok(value) => {
            tx.commit()?;
            Ok(Ok(value))
          }
          Err(e) => Ok(Err(e)),
        }
      })
      .await?
  }

  async fn read<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&rusqlite::Connection) -> Result<T> + Send + 'static,
  {
    self.conn.call(move |conn| Ok(f(conn))).await?
  }
}

// ─── Row access ──────────────────────────────────────────────────────────────

fn select_windows(conn: &rusqlite::Connection, ticker: &str) -> Result<Vec<Window>> {
  let mut stmt = conn.prepare(
    "SELECT window_start, window_end FROM ticker_window
     WHERE ticker = ?1
     ORDER BY window_start",
  )?;
  let raws = stmt
    .query_map(rusqlite::params![ticker], |row| {
      Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.iter().map(|(start, end)| decode_window(start, end)).collect()
}

fn select_evidence(
  conn: &rusqlite::Connection,
  filter: &str,
  params: impl rusqlite::Params,
) -> Result<Vec<Evidence>> {
  let sql = format!(
    "SELECT {} FROM evidence WHERE {filter} ORDER BY filed_at, evidence_id",
    RawEvidence::COLUMNS
  );
  let mut stmt = conn.prepare(&sql)?;
  let raws = stmt
    .query_map(params, RawEvidence::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawEvidence::into_evidence).collect()
}

fn evidence_by_id(conn: &rusqlite::Connection, id: Uuid) -> Result<Option<Evidence>> {
  let sql = format!("SELECT {} FROM evidence WHERE evidence_id = ?1", RawEvidence::COLUMNS);
  conn
    .query_row(&sql, rusqlite::params![encode_uuid(id)], RawEvidence::from_row)
    .optional()?
    .map(RawEvidence::into_evidence)
    .transpose()
}

fn select_adjudications(conn: &rusqlite::Connection, ticker: &str) -> Result<Vec<Adjudication>> {
  let sql = format!(
    "SELECT {} FROM adjudication
     WHERE ticker = ?1
     ORDER BY window_start, recorded_at, adjudication_id",
    RawAdjudication::COLUMNS
  );
  let mut stmt = conn.prepare(&sql)?;
  let raws = stmt
    .query_map(rusqlite::params![ticker], RawAdjudication::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawAdjudication::into_adjudication).collect()
}

fn insert_adjudication(conn: &rusqlite::Connection, adj: &Adjudication) -> Result<()> {
  let (start, end) = encode_window(adj.window);
  conn.execute(
    "INSERT INTO adjudication (
       adjudication_id, ticker, window_start, window_end, entity_key, action,
       rationale, sources, evidence_id, canonical_name, recorded_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
    rusqlite::params![
      encode_uuid(adj.adjudication_id),
      adj.ticker.as_str(),
      start,
      end,
      adj.entity_key.as_ref().map(EntityKey::as_str),
      adj.action.as_ref(),
      adj.rationale,
      encode_strings(&adj.sources)?,
      encode_uuid(adj.evidence_id),
      adj.canonical_name,
      encode_dt(adj.recorded_at),
    ],
  )?;
  Ok(())
}

fn insert_evidence(conn: &rusqlite::Connection, ev: &Evidence) -> Result<()> {
  let (start, end) = encode_window(ev.window);
  conn.execute(
    "INSERT OR IGNORE INTO evidence (
       evidence_id, ticker, entity_key, window_start, window_end, filed_at,
       filing_type, items, accession, source, raw_payload, company_name
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
    rusqlite::params![
      encode_uuid(ev.evidence_id),
      ev.ticker.as_str(),
      ev.entity_key.as_str(),
      start,
      end,
      encode_dt(ev.filed_at),
      ev.filing_type,
      encode_strings(&ev.items)?,
      ev.accession,
      ev.source,
      ev.raw_payload.to_string(),
      ev.company_name,
    ],
  )?;
  Ok(())
}

// ─── Episode lifecycle ───────────────────────────────────────────────────────

/// Where one kind of episode keeps its rows and lifecycle events.
struct Lifecycle {
  status_view: &'static str,
  key_column:  &'static str,
  events:      &'static str,
}

const MAPPINGS: Lifecycle = Lifecycle {
  status_view: "mapping_status",
  key_column:  "ticker",
  events:      "mapping_lifecycle",
};

const NAMES: Lifecycle = Lifecycle {
  status_view: "name_status",
  key_column:  "entity_key",
  events:      "name_lifecycle",
};

impl Lifecycle {
  /// Make `episodes` the active set under `key`. Unknown ids are handed to
  /// `insert`, superseded ones are reinstated, and active ones missing from
  /// `episodes` are superseded.
  fn commit<E>(
    &self,
    conn: &rusqlite::Connection,
    key: &str,
    episodes: &[(Uuid, E)],
    mut insert: impl FnMut(&str, &E) -> Result<()>,
  ) -> Result<CommitSummary> {
    let sql = format!(
      "SELECT episode_id, last_event FROM {} WHERE {} = ?1",
      self.status_view, self.key_column
    );
    let mut stmt = conn.prepare(&sql)?;
    let stored = stmt
      .query_map(rusqlite::params![key], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
      })?
      .collect::<rusqlite::Result<BTreeMap<_, _>>>()?;

    let event_sql = format!(
      "INSERT INTO {} (episode_id, event, recorded_at) VALUES (?1, ?2, ?3)",
      self.events
    );
    let now = encode_dt(Utc::now());
    let mut summary = CommitSummary::default();
    let mut incoming = BTreeSet::new();

    for (id, episode) in episodes {
      let id = encode_uuid(*id);
      match stored.get(&id).map(Option::as_deref) {
        None => {
          insert(&id, episode)?;
          summary.inserted += 1;
        }
        Some(Some(SUPERSEDED)) => {
          conn.execute(&event_sql, rusqlite::params![id, REINSTATED, now])?;
          summary.reinstated += 1;
        }
        Some(_) => summary.unchanged += 1,
      }
      incoming.insert(id);
    }

    for (id, last_event) in &stored {
      if !incoming.contains(id) && last_event.as_deref() != Some(SUPERSEDED) {
        conn.execute(&event_sql, rusqlite::params![id, SUPERSEDED, now])?;
        summary.superseded += 1;
      }
    }

    Ok(summary)
  }
}

// ─── EvidenceStore impl ──────────────────────────────────────────────────────

impl EvidenceStore for SqliteStore {
  type Error = Error;

  // ── Ticker windows ────────────────────────────────────────────────────────

  async fn record_windows(&self, ticker: Ticker, windows: Vec<Window>) -> Result<usize> {
    self
      .write(move |tx| {
        let mut known = select_windows(tx, ticker.as_str())?;
        let mut inserted = 0;
        for window in windows {
          if known.contains(&window) {
            continue;
          }
          if let Some(existing) = known.iter().find(|w| w.overlaps(&window)) {
            return Err(
              DataQualityError::WindowConflict {
                ticker: ticker.clone(),
                window,
                existing: *existing,
              }
              .into(),
            );
          }
          let (start, end) = encode_window(window);
          tx.execute(
            "INSERT INTO ticker_window (ticker, window_start, window_end) VALUES (?1, ?2, ?3)",
            rusqlite::params![ticker.as_str(), start, end],
          )?;
          known.push(window);
          inserted += 1;
        }
        Ok(inserted)
      })
      .await
  }

  async fn list_tickers(&self) -> Result<Vec<Ticker>> {
    self
      .read(|conn| {
        let mut stmt = conn.prepare("SELECT DISTINCT ticker FROM ticker_window ORDER BY ticker")?;
        let raws = stmt
          .query_map([], |row| row.get::<_, String>(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        raws.iter().map(|s| decode_ticker(s)).collect()
      })
      .await
  }

  async fn windows(&self, ticker: Ticker) -> Result<Vec<Window>> {
    self.read(move |conn| select_windows(conn, ticker.as_str())).await
  }

  // ── Candidates and evidence ───────────────────────────────────────────────

  async fn record_candidates(&self, candidates: Vec<Candidate>) -> Result<usize> {
    for candidate in &candidates {
      candidate.validate()?;
    }

    self
      .write(move |tx| {
        let mut inserted = 0;
        for c in &candidates {
          let (start, end) = encode_window(c.window);
          inserted += tx.execute(
            &format!(
              "INSERT OR IGNORE INTO candidate ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
              RawCandidate::COLUMNS
            ),
            rusqlite::params![
              c.ticker.as_str(),
              start,
              end,
              c.entity_key.as_str(),
              encode_dt(c.first_seen_at),
              encode_dt(c.last_seen_at),
              c.first_seen_url,
              c.last_seen_url,
            ],
          )?;
        }
        Ok(inserted)
      })
      .await
  }

  async fn candidates(&self, ticker: Ticker, window: Window) -> Result<Vec<Candidate>> {
    let (start, end) = encode_window(window);
    self
      .read(move |conn| {
        let sql = format!(
          "SELECT {} FROM candidate
           WHERE ticker = ?1 AND window_start = ?2 AND window_end = ?3
           ORDER BY entity_key",
          RawCandidate::COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let raws = stmt
          .query_map(rusqlite::params![ticker.as_str(), start, end], RawCandidate::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        raws.into_iter().map(RawCandidate::into_candidate).collect()
      })
      .await
  }

  async fn ingest_evidence(
    &self,
    run: HarvestRun,
    evidence: Vec<NewEvidence>,
  ) -> Result<Vec<Evidence>> {
    let records = evidence
      .into_iter()
      .map(|input| -> Result<Evidence> {
        let ev = input.into_evidence()?;
        run.check_owns(&ev)?;
        Ok(ev)
      })
      .collect::<Result<Vec<_>>>()?;

    self
      .write(move |tx| {
        let mut stored = Vec::with_capacity(records.len());
        for ev in &records {
          insert_evidence(tx, ev)?;
          if let Some(row) = evidence_by_id(tx, ev.evidence_id)? {
            stored.push(row);
          }
        }

        let key = &run.key;
        let (start, end) = encode_window(key.window);
        tx.execute(
          "INSERT OR IGNORE INTO harvest_registry (
             ticker, window_start, window_end, entity_key, run_id, started_at, completed_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            key.ticker.as_str(),
            start,
            end,
            key.entity_key.as_str(),
            encode_uuid(run.run_id),
            encode_dt(run.started_at),
            encode_dt(Utc::now()),
          ],
        )?;
        Ok(stored)
      })
      .await
  }

  async fn completed_harvests(&self, ticker: Ticker) -> Result<BTreeSet<HarvestKey>> {
    self
      .read(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT ticker, window_start, window_end, entity_key
             FROM harvest_registry
            WHERE ticker = ?1
           UNION
           SELECT c.ticker, c.window_start, c.window_end, c.entity_key
             FROM candidate c
             JOIN adjudication a
               ON a.ticker = c.ticker
              AND a.window_start = c.window_start
              AND a.window_end = c.window_end
            WHERE c.ticker = ?1
              AND a.action = 'manual-override'
              AND a.entity_key != c.entity_key",
        )?;
        let raws = stmt
          .query_map(rusqlite::params![ticker.as_str()], |row| {
            Ok((
              row.get::<_, String>(0)?,
              row.get::<_, String>(1)?,
              row.get::<_, String>(2)?,
              row.get::<_, String>(3)?,
            ))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        raws
          .iter()
          .map(|(ticker, start, end, entity)| -> Result<HarvestKey> {
            Ok(HarvestKey {
              ticker:     decode_ticker(ticker)?,
              window:     decode_window(start, end)?,
              entity_key: decode_entity(entity)?,
            })
          })
          .collect()
      })
      .await
  }

  async fn window_evidence(&self, ticker: Ticker, window: Window) -> Result<Vec<Evidence>> {
    let (start, end) = encode_window(window);
    self
      .read(move |conn| {
        select_evidence(
          conn,
          "ticker = ?1 AND window_start = ?2 AND window_end = ?3",
          rusqlite::params![ticker.as_str(), start, end],
        )
      })
      .await
  }

  async fn entity_evidence(&self, entity_key: EntityKey) -> Result<Vec<Evidence>> {
    self
      .read(move |conn| {
        select_evidence(conn, "entity_key = ?1", rusqlite::params![entity_key.as_str()])
      })
      .await
  }

  async fn get_evidence(&self, evidence_id: Uuid) -> Result<Option<Evidence>> {
    self.read(move |conn| evidence_by_id(conn, evidence_id)).await
  }

  // ── Adjudication ledger ───────────────────────────────────────────────────

  async fn record_adjudication(&self, input: NewAdjudication) -> Result<Adjudication> {
    // A malformed ticker is reported by validation with the field name.
    let ticker = Ticker::normalize(&input.ticker).ok();

    self
      .write(move |tx| {
        let existing = match &ticker {
          Some(t) => select_adjudications(tx, t.as_str())?,
          None => Vec::new(),
        };
        match validate_adjudication(&input, &existing, Utc::now())? {
          Admission::Duplicate(stored) => Ok(stored),
          Admission::Fresh(adj) => {
            check_tracked_window(&adj, &select_windows(tx, adj.ticker.as_str())?)?;
            let evidence = evidence_by_id(tx, adj.evidence_id)?;
            check_evidence_pointer(&adj, evidence.as_ref())?;
            insert_adjudication(tx, &adj)?;
            Ok(adj)
          }
        }
      })
      .await
  }

  async fn adjudications(&self, ticker: Ticker) -> Result<Vec<Adjudication>> {
    self.read(move |conn| select_adjudications(conn, ticker.as_str())).await
  }

  // ── Episodes ──────────────────────────────────────────────────────────────

  async fn commit_mappings(
    &self,
    ticker: Ticker,
    episodes: Vec<MappingEpisode>,
  ) -> Result<CommitSummary> {
    if let Some(foreign) = episodes.iter().find(|e| e.ticker != ticker) {
      return Err(Error::ForeignEpisode {
        expected: ticker.to_string(),
        found:    foreign.ticker.to_string(),
      });
    }
    let windows: Vec<Window> = episodes.iter().map(|e| e.window).collect();
    if let Some((first, second)) = find_overlap(&windows) {
      return Err(MergeInvariantViolation::Overlap { ticker, first, second }.into());
    }
    let keyed: Vec<(Uuid, MappingEpisode)> =
      episodes.into_iter().map(|e| (e.episode_id(), e)).collect();

    self
      .write(move |tx| {
        for (_, episode) in &keyed {
          check_provenance(episode, evidence_by_id(tx, episode.evidence_id)?.as_ref())?;
        }

        let recorded_at = encode_dt(Utc::now());
        MAPPINGS.commit(tx, ticker.as_str(), &keyed, |id, e| {
          let (start, end) = encode_window(e.window);
          tx.execute(
            "INSERT INTO accepted_mapping (
               episode_id, ticker, entity_key, window_start, window_end,
               evidence_id, justification_type, adjudication_id, recorded_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
              id,
              e.ticker.as_str(),
              e.entity_key.as_str(),
              start,
              end,
              encode_uuid(e.evidence_id),
              e.justification.as_ref(),
              e.adjudication_id.map(encode_uuid),
              recorded_at,
            ],
          )?;
          Ok(())
        })
      })
      .await
  }

  async fn mappings(
    &self,
    ticker: Ticker,
    include_superseded: bool,
  ) -> Result<Vec<Resolved<MappingEpisode>>> {
    let raws: Vec<RawMapping> = self
      .read(move |conn| {
        let sql = format!(
          "SELECT {} FROM mapping_status
           WHERE ticker = ?1 AND (?2 OR {ACTIVE})
           ORDER BY window_start, recorded_at",
          RawMapping::COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![ticker.as_str(), include_superseded], RawMapping::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawMapping::into_resolved).collect()
  }

  async fn entity_mappings(&self, entity_key: EntityKey) -> Result<Vec<MappingEpisode>> {
    let raws: Vec<RawMapping> = self
      .read(move |conn| {
        let sql = format!(
          "SELECT {} FROM mapping_status
           WHERE entity_key = ?1 AND {ACTIVE}
           ORDER BY window_start, ticker",
          RawMapping::COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![entity_key.as_str()], RawMapping::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(|raw| raw.into_resolved().map(|r| r.episode))
      .collect()
  }

  async fn list_entities(&self) -> Result<Vec<EntityKey>> {
    self
      .read(|conn| {
        let sql = format!(
          "SELECT DISTINCT entity_key FROM mapping_status WHERE {ACTIVE} ORDER BY entity_key"
        );
        let mut stmt = conn.prepare(&sql)?;
        let raws = stmt
          .query_map([], |row| row.get::<_, String>(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        raws.iter().map(|s| decode_entity(s)).collect()
      })
      .await
  }

  async fn commit_names(
    &self,
    entity_key: EntityKey,
    episodes: Vec<NameEpisode>,
  ) -> Result<CommitSummary> {
    if let Some(foreign) = episodes.iter().find(|e| e.entity_key != entity_key) {
      return Err(Error::ForeignEpisode {
        expected: entity_key.to_string(),
        found:    foreign.entity_key.to_string(),
      });
    }
    let windows: Vec<Window> = episodes.iter().map(|e| e.window).collect();
    if let Some((first, second)) = find_overlap(&windows) {
      return Err(MergeInvariantViolation::NameOverlap { entity_key, first, second }.into());
    }
    let keyed: Vec<(Uuid, NameEpisode)> =
      episodes.into_iter().map(|e| (e.episode_id(), e)).collect();

    self
      .write(move |tx| {
        for (_, episode) in &keyed {
          check_name_provenance(episode, evidence_by_id(tx, episode.evidence_id)?.as_ref())?;
        }

        let recorded_at = encode_dt(Utc::now());
        NAMES.commit(tx, entity_key.as_str(), &keyed, |id, e| {
          let (start, end) = encode_window(e.window);
          tx.execute(
            "INSERT INTO name_episode (
               episode_id, entity_key, window_start, window_end, canonical_name,
               observed_name, evidence_id, corrected_by, recorded_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
              id,
              e.entity_key.as_str(),
              start,
              end,
              e.canonical_name,
              e.observed_name,
              encode_uuid(e.evidence_id),
              e.corrected_by.map(encode_uuid),
              recorded_at,
            ],
          )?;
          Ok(())
        })
      })
      .await
  }

  async fn names(
    &self,
    entity_key: EntityKey,
    include_superseded: bool,
  ) -> Result<Vec<Resolved<NameEpisode>>> {
    let raws: Vec<RawName> = self
      .read(move |conn| {
        let sql = format!(
          "SELECT {} FROM name_status
           WHERE entity_key = ?1 AND (?2 OR {ACTIVE})
           ORDER BY window_start, recorded_at",
          RawName::COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![entity_key.as_str(), include_superseded], RawName::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawName::into_resolved).collect()
  }

  // ── Window reports ────────────────────────────────────────────────────────

  async fn record_reports(&self, ticker: Ticker, reports: Vec<WindowReport>) -> Result<()> {
    if let Some(foreign) = reports.iter().find(|r| r.ticker != ticker) {
      return Err(Error::ForeignReport { expected: ticker, found: foreign.ticker.clone() });
    }

    self
      .write(move |tx| {
        tx.execute(
          "DELETE FROM window_report WHERE ticker = ?1",
          rusqlite::params![ticker.as_str()],
        )?;
        let recorded_at = encode_dt(Utc::now());
        for report in &reports {
          let (start, end) = encode_window(report.window);
          let trace: Vec<String> = report.trace.iter().map(|s| s.to_string()).collect();
          tx.execute(
            "INSERT INTO window_report (ticker, window_start, window_end, stage, trace, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
              ticker.as_str(),
              start,
              end,
              report.stage().as_ref(),
              encode_strings(&trace)?,
              recorded_at,
            ],
          )?;
        }
        Ok(())
      })
      .await
  }

  async fn window_reports(&self, stage: Option<WindowStage>) -> Result<Vec<WindowReport>> {
    let stage = stage.map(|s| s.to_string());
    let raws: Vec<RawReport> = self
      .read(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT ticker, window_start, window_end, trace FROM window_report
           WHERE ?1 IS NULL OR stage = ?1
           ORDER BY ticker, window_start",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![stage], |row| {
            Ok(RawReport {
              ticker:       row.get(0)?,
              window_start: row.get(1)?,
              window_end:   row.get(2)?,
              trace:        row.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawReport::into_report).collect()
  }
}
