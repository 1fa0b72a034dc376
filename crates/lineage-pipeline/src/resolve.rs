//! Per-ticker resolution and the worker pool that drives it.
//!
//! Every ticker is resolved independently: its windows are aggregated and
//! decided, the decisions are merged with the ticker's ledger, and the
//! resulting episodes are committed in one write. Name histories are rebuilt
//! per entity once all tickers are done, since an entity may have held
//! several tickers.

use std::{
  collections::{BTreeMap, BTreeSet},
  sync::Arc,
};

use lineage_core::{
  EntityKey, Ticker, Window,
  aggregate::aggregate_candidates,
  evidence::Evidence,
  lifecycle::{CommitSummary, WindowReport},
  merge::{merge_episodes, name_corrections},
  names::build_name_episodes,
  policy::FilingPolicy,
  rules::decide,
  store::EvidenceStore,
};
use tokio::{sync::Semaphore, task::JoinSet};
use tracing::Instrument as _;
use uuid::Uuid;

use crate::{PipelineError, Result};

/// What one ticker's resolution committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickerOutcome {
  pub ticker:  Ticker,
  pub commit:  CommitSummary,
  /// One per tracked window, in window order.
  pub reports: Vec<WindowReport>,
}

impl TickerOutcome {
  /// Windows left without an episode: awaiting evidence or pending review.
  pub fn pending(&self) -> usize {
    self.reports.iter().filter(|r| r.stage().is_open()).count()
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
  pub tickers:         usize,
  pub mappings:        CommitSummary,
  pub pending:         usize,
  pub entities:        usize,
  pub names:           CommitSummary,
  pub failed_tickers:  Vec<(Ticker, String)>,
  pub failed_entities: Vec<(EntityKey, String)>,
}

impl RunSummary {
  pub fn is_clean(&self) -> bool {
    self.failed_tickers.is_empty() && self.failed_entities.is_empty()
  }
}

// ─── Tickers ────────────────────────────────────────────────────────────────

/// Resolve every window of `ticker` and commit the merged episodes.
///
/// A window nothing was delivered for yet is reported as awaiting evidence.
/// A window whose producers did deliver but left no usable candidate fails
/// the ticker with [`EmptyCandidateSet`](lineage_core::EmptyCandidateSet),
/// unless a reviewer already assigned the window an entity. Nothing is
/// written when any window or the merge fails.
pub async fn resolve_ticker<S>(
  store: &S,
  ticker: &Ticker,
  policy: &FilingPolicy,
) -> Result<TickerOutcome>
where
  S: EvidenceStore,
{
  let windows = store.windows(ticker.clone()).await.map_err(PipelineError::store)?;
  let adjudications =
    store.adjudications(ticker.clone()).await.map_err(PipelineError::store)?;
  let harvested: BTreeSet<Window> = store
    .completed_harvests(ticker.clone())
    .await
    .map_err(PipelineError::store)?
    .into_iter()
    .map(|key| key.window)
    .collect();

  let mut decisions = BTreeMap::new();
  let mut evidence: BTreeMap<Uuid, Evidence> = BTreeMap::new();

  for &window in &windows {
    let candidates =
      store.candidates(ticker.clone(), window).await.map_err(PipelineError::store)?;
    let filings =
      store.window_evidence(ticker.clone(), window).await.map_err(PipelineError::store)?;

    let set = aggregate_candidates(ticker, window, &candidates, &filings, policy);
    let delivered =
      harvested.contains(&window) || !candidates.is_empty() || !filings.is_empty();
    evidence.extend(filings.into_iter().map(|ev| (ev.evidence_id, ev)));

    if set.is_empty() {
      let ruled = adjudications
        .iter()
        .any(|a| a.action.requires_entity() && a.window.overlaps(&window));
      if ruled || !delivered {
        tracing::debug!(ticker = %ticker, window = %window, ruled, "no candidates");
        continue;
      }
    }

    let decision = decide(&set, policy)?;
    tracing::debug!(
      ticker = %ticker,
      window = %window,
      candidates = set.len(),
      accepted = decision.is_accept(),
      "window decided"
    );
    decisions.insert(window, decision);
  }

  // Manual episodes cite evidence that may sit outside any tracked window.
  for adjudication in &adjudications {
    if evidence.contains_key(&adjudication.evidence_id) {
      continue;
    }
    if let Some(ev) = store
      .get_evidence(adjudication.evidence_id)
      .await
      .map_err(PipelineError::store)?
    {
      evidence.insert(ev.evidence_id, ev);
    }
  }

  let outcome = merge_episodes(ticker, &windows, &decisions, &adjudications, &evidence)?;
  for report in outcome.pending() {
    tracing::info!(
      ticker = %ticker,
      window = %report.window,
      stage = %report.stage(),
      "window open"
    );
  }

  let commit = store
    .commit_mappings(ticker.clone(), outcome.episodes)
    .await
    .map_err(PipelineError::store)?;
  store
    .record_reports(ticker.clone(), outcome.reports.clone())
    .await
    .map_err(PipelineError::store)?;

  tracing::info!(
    ticker = %ticker,
    inserted = commit.inserted,
    superseded = commit.superseded,
    reinstated = commit.reinstated,
    "ticker resolved"
  );

  Ok(TickerOutcome { ticker: ticker.clone(), commit, reports: outcome.reports })
}

// ─── Entities ───────────────────────────────────────────────────────────────

/// Rebuild and commit the name history of `entity_key` from its active
/// mappings, its filings and the alias-rewrite corrections of every ticker
/// it held.
pub async fn resolve_names<S>(
  store: &S,
  entity_key: &EntityKey,
  policy: &FilingPolicy,
) -> Result<CommitSummary>
where
  S: EvidenceStore,
{
  let episodes =
    store.entity_mappings(entity_key.clone()).await.map_err(PipelineError::store)?;
  let evidence =
    store.entity_evidence(entity_key.clone()).await.map_err(PipelineError::store)?;

  let tickers: BTreeSet<Ticker> = episodes.iter().map(|e| e.ticker.clone()).collect();
  let mut corrections = Vec::new();
  for ticker in tickers {
    let ledger = store.adjudications(ticker.clone()).await.map_err(PipelineError::store)?;
    corrections.extend(name_corrections(&ticker, &ledger));
  }

  let names = build_name_episodes(entity_key, &episodes, &evidence, &corrections, policy)?;
  let count = names.len();
  let commit = store
    .commit_names(entity_key.clone(), names)
    .await
    .map_err(PipelineError::store)?;
  tracing::debug!(entity_key = %entity_key, episodes = count, inserted = commit.inserted, "names resolved");

  Ok(commit)
}

// ─── Worker pool ────────────────────────────────────────────────────────────

/// Resolve every stored ticker, then every entity with an active mapping,
/// with at most `workers` tasks in flight.
///
/// A failing ticker or entity is logged and recorded in the summary; the
/// others still commit. Only store failures while listing work, and panics
/// in a worker, abort the run.
pub async fn run<S>(store: Arc<S>, policy: Arc<FilingPolicy>, workers: usize) -> Result<RunSummary>
where
  S: EvidenceStore + 'static,
{
  let limit = Arc::new(Semaphore::new(workers.max(1)));
  let mut summary = RunSummary::default();

  let tickers = store.list_tickers().await.map_err(PipelineError::store)?;
  let mut tasks = JoinSet::new();
  for ticker in tickers {
    let (store, policy, limit) = (Arc::clone(&store), Arc::clone(&policy), Arc::clone(&limit));
    let span = tracing::info_span!("ticker", ticker = %ticker);
    tasks.spawn(
      async move {
        let _permit = limit.acquire_owned().await;
        let result = resolve_ticker(store.as_ref(), &ticker, &policy).await;
        (ticker, result)
      }
      .instrument(span),
    );
  }
  while let Some(joined) = tasks.join_next().await {
    let (ticker, result) = joined?;
    summary.tickers += 1;
    match result {
      Ok(outcome) => {
        summary.pending += outcome.pending();
        summary.mappings += outcome.commit;
      }
      Err(e) => {
        tracing::error!(ticker = %ticker, error = %e, "ticker failed; nothing committed");
        summary.failed_tickers.push((ticker, e.to_string()));
      }
    }
  }

  let entities = store.list_entities().await.map_err(PipelineError::store)?;
  let mut tasks = JoinSet::new();
  for entity_key in entities {
    let (store, policy, limit) = (Arc::clone(&store), Arc::clone(&policy), Arc::clone(&limit));
    let span = tracing::info_span!("entity", entity_key = %entity_key);
    tasks.spawn(
      async move {
        let _permit = limit.acquire_owned().await;
        let result = resolve_names(store.as_ref(), &entity_key, &policy).await;
        (entity_key, result)
      }
      .instrument(span),
    );
  }
  while let Some(joined) = tasks.join_next().await {
    let (entity_key, result) = joined?;
    summary.entities += 1;
    match result {
      Ok(commit) => summary.names += commit,
      Err(e) => {
        tracing::error!(entity_key = %entity_key, error = %e, "name history failed");
        summary.failed_entities.push((entity_key, e.to_string()));
      }
    }
  }

  tracing::info!(
    tickers = summary.tickers,
    entities = summary.entities,
    pending = summary.pending,
    failed = summary.failed_tickers.len() + summary.failed_entities.len(),
    "run finished"
  );
  Ok(summary)
}
