//! The `EvidenceStore` trait.
//!
//! Implemented by storage backends (e.g. `lineage-store-sqlite`). The
//! pipeline depends on this abstraction, not on any concrete backend.

use std::{collections::BTreeSet, future::Future};

use uuid::Uuid;

use crate::{
  adjudication::{Adjudication, NewAdjudication},
  entity::EntityKey,
  evidence::{Candidate, Evidence, HarvestKey, HarvestRun, NewEvidence},
  lifecycle::{CommitSummary, Resolved, WindowReport, WindowStage},
  merge::MappingEpisode,
  names::NameEpisode,
  ticker::Ticker,
  window::Window,
};

/// Abstraction over a Lineage evidence and episode store.
///
/// Candidates, evidence, adjudications and episodes are append-only. Every
/// write is keyed by a deterministic identifier, so retried or concurrent
/// writes of the same record converge instead of duplicating. Window
/// exclusion (no overlapping windows per key) is enforced inside the write
/// transaction.
///
/// All methods return `Send` futures so the store can be shared across tokio
/// worker tasks.
pub trait EvidenceStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Ticker windows ────────────────────────────────────────────────────

  /// Persist membership windows for a ticker. Windows already stored are
  /// skipped; a window overlapping a different stored window is rejected
  /// and nothing is written. Returns the number of windows inserted.
  fn record_windows(
    &self,
    ticker: Ticker,
    windows: Vec<Window>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  fn list_tickers(&self) -> impl Future<Output = Result<Vec<Ticker>, Self::Error>> + Send + '_;

  /// The ticker's windows in chronological order.
  fn windows(
    &self,
    ticker: Ticker,
  ) -> impl Future<Output = Result<Vec<Window>, Self::Error>> + Send + '_;

  // ── Candidates and evidence ───────────────────────────────────────────

  /// Persist archive-snapshot candidates. Existing `(ticker, window,
  /// entity)` rows are left untouched. Returns the number inserted.
  fn record_candidates(
    &self,
    candidates: Vec<Candidate>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  fn candidates(
    &self,
    ticker: Ticker,
    window: Window,
  ) -> impl Future<Output = Result<Vec<Candidate>, Self::Error>> + Send + '_;

  /// Persist one harvest's evidence together with its checkpoint, in a
  /// single transaction. Every record must belong to the harvest's triple.
  fn ingest_evidence(
    &self,
    run: HarvestRun,
    evidence: Vec<NewEvidence>,
  ) -> impl Future<Output = Result<Vec<Evidence>, Self::Error>> + Send + '_;

  /// Triples producers may skip for a ticker: completed harvests plus the
  /// candidates a manual-override ruled out.
  fn completed_harvests(
    &self,
    ticker: Ticker,
  ) -> impl Future<Output = Result<BTreeSet<HarvestKey>, Self::Error>> + Send + '_;

  fn window_evidence(
    &self,
    ticker: Ticker,
    window: Window,
  ) -> impl Future<Output = Result<Vec<Evidence>, Self::Error>> + Send + '_;

  /// All evidence naming an entity, across tickers.
  fn entity_evidence(
    &self,
    entity_key: EntityKey,
  ) -> impl Future<Output = Result<Vec<Evidence>, Self::Error>> + Send + '_;

  fn get_evidence(
    &self,
    evidence_id: Uuid,
  ) -> impl Future<Output = Result<Option<Evidence>, Self::Error>> + Send + '_;

  // ── Adjudication ledger ───────────────────────────────────────────────

  /// Validate and persist a reviewer's decision. Recording an identical
  /// decision again returns the stored entry.
  fn record_adjudication(
    &self,
    input: NewAdjudication,
  ) -> impl Future<Output = Result<Adjudication, Self::Error>> + Send + '_;

  fn adjudications(
    &self,
    ticker: Ticker,
  ) -> impl Future<Output = Result<Vec<Adjudication>, Self::Error>> + Send + '_;

  // ── Episodes ──────────────────────────────────────────────────────────

  /// Make `episodes` the ticker's active mapping set. Stale episodes are
  /// superseded, previously superseded ones that reappear are reinstated.
  /// The new set is checked for overlap before anything is written.
  fn commit_mappings(
    &self,
    ticker: Ticker,
    episodes: Vec<MappingEpisode>,
  ) -> impl Future<Output = Result<CommitSummary, Self::Error>> + Send + '_;

  fn mappings(
    &self,
    ticker: Ticker,
    include_superseded: bool,
  ) -> impl Future<Output = Result<Vec<Resolved<MappingEpisode>>, Self::Error>> + Send + '_;

  /// Active mapping episodes naming an entity, across tickers.
  fn entity_mappings(
    &self,
    entity_key: EntityKey,
  ) -> impl Future<Output = Result<Vec<MappingEpisode>, Self::Error>> + Send + '_;

  /// Entities with at least one active mapping episode.
  fn list_entities(
    &self,
  ) -> impl Future<Output = Result<Vec<EntityKey>, Self::Error>> + Send + '_;

  /// Name-history counterpart of [`commit_mappings`](Self::commit_mappings).
  fn commit_names(
    &self,
    entity_key: EntityKey,
    episodes: Vec<NameEpisode>,
  ) -> impl Future<Output = Result<CommitSummary, Self::Error>> + Send + '_;

  fn names(
    &self,
    entity_key: EntityKey,
    include_superseded: bool,
  ) -> impl Future<Output = Result<Vec<Resolved<NameEpisode>>, Self::Error>> + Send + '_;

  // ── Window reports ────────────────────────────────────────────────────

  /// Replace the ticker's window reports with those of the latest run.
  fn record_reports(
    &self,
    ticker: Ticker,
    reports: Vec<WindowReport>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Latest reports across tickers, optionally restricted to one stage.
  fn window_reports(
    &self,
    stage: Option<WindowStage>,
  ) -> impl Future<Output = Result<Vec<WindowReport>, Self::Error>> + Send + '_;
}
