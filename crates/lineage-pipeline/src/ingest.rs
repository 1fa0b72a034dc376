//! Producer output to stored candidates and evidence.
//!
//! Archive scrapers deliver candidates; filing searches deliver one harvest
//! per `(ticker, window, candidate)`. Harvests the store already marks as
//! complete are skipped, so a producer batch can be replayed safely.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use lineage_core::{
  DataQualityError, EntityKey, Ticker, Window,
  evidence::{Candidate, HarvestKey, HarvestRun, NewEvidence},
  store::EvidenceStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{PipelineError, Result};

/// All evidence a filing search found for one candidate in one window.
#[derive(Debug, Clone, Deserialize)]
pub struct Harvest {
  pub ticker:     Ticker,
  pub window:     Window,
  pub entity_key: EntityKey,
  #[serde(default)]
  pub evidence:   Vec<NewEvidence>,
}

impl Harvest {
  pub fn key(&self) -> HarvestKey {
    HarvestKey {
      ticker:     self.ticker.clone(),
      window:     self.window,
      entity_key: self.entity_key.clone(),
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProducerBatch {
  #[serde(default)]
  pub candidates: Vec<Candidate>,
  #[serde(default)]
  pub harvests:   Vec<Harvest>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
  pub candidates: usize,
  pub harvests:   usize,
  pub skipped:    usize,
  /// Candidates and harvests dropped as malformed or foreign.
  pub rejected:   usize,
  pub evidence:   usize,
}

/// Windows the store tracks, loaded once per ticker.
#[derive(Default)]
struct Tracked(BTreeMap<Ticker, BTreeSet<Window>>);

impl Tracked {
  async fn check<S>(
    &mut self,
    store: &S,
    ticker: &Ticker,
    window: Window,
  ) -> Result<Result<(), DataQualityError>>
  where
    S: EvidenceStore,
  {
    if !self.0.contains_key(ticker) {
      let windows = store.windows(ticker.clone()).await.map_err(PipelineError::store)?;
      self.0.insert(ticker.clone(), windows.into_iter().collect());
    }
    if self.0.get(ticker).is_some_and(|known| known.contains(&window)) {
      Ok(Ok(()))
    } else {
      Ok(Err(DataQualityError::UntrackedWindow { ticker: ticker.clone(), window }))
    }
  }
}

/// Store a producer batch. Candidates and harvests that are malformed, carry
/// foreign evidence, or name a window the store does not track are logged
/// and counted as rejected; the rest of the batch is still written.
pub async fn ingest_batch<S>(store: &S, batch: ProducerBatch) -> Result<IngestSummary>
where
  S: EvidenceStore,
{
  let mut summary = IngestSummary::default();
  let mut tracked = Tracked::default();

  let mut candidates = Vec::with_capacity(batch.candidates.len());
  for candidate in batch.candidates {
    let checked = match candidate.validate() {
      Ok(()) => tracked.check(store, &candidate.ticker, candidate.window).await?,
      Err(e) => Err(e),
    };
    match checked {
      Ok(()) => candidates.push(candidate),
      Err(e) => {
        tracing::warn!(ticker = %candidate.ticker, window = %candidate.window, error = %e, "candidate rejected");
        summary.rejected += 1;
      }
    }
  }
  if !candidates.is_empty() {
    summary.candidates = store
      .record_candidates(candidates)
      .await
      .map_err(PipelineError::store)?;
  }

  let mut done: BTreeMap<Ticker, BTreeSet<HarvestKey>> = BTreeMap::new();
  for harvest in batch.harvests {
    let key = harvest.key();
    if !done.contains_key(&key.ticker) {
      let completed = store
        .completed_harvests(key.ticker.clone())
        .await
        .map_err(PipelineError::store)?;
      done.insert(key.ticker.clone(), completed);
    }
    if done.get(&key.ticker).is_some_and(|keys| keys.contains(&key)) {
      tracing::debug!(
        ticker = %key.ticker,
        window = %key.window,
        entity_key = %key.entity_key,
        "harvest already complete"
      );
      summary.skipped += 1;
      continue;
    }

    let run = HarvestRun { key: key.clone(), run_id: Uuid::new_v4(), started_at: Utc::now() };
    let invalid = match tracked.check(store, &key.ticker, key.window).await? {
      Err(e) => Some(e),
      Ok(()) => harvest.evidence.iter().cloned().find_map(|input| {
        match input.into_evidence() {
          Ok(ev) => run.check_owns(&ev).err(),
          Err(e) => Some(e),
        }
      }),
    };
    if let Some(e) = invalid {
      tracing::warn!(
        ticker = %key.ticker,
        window = %key.window,
        entity_key = %key.entity_key,
        error = %e,
        "harvest rejected"
      );
      summary.rejected += 1;
      continue;
    }

    let stored = store
      .ingest_evidence(run, harvest.evidence)
      .await
      .map_err(PipelineError::store)?;
    summary.harvests += 1;
    summary.evidence += stored.len();
    done.entry(key.ticker.clone()).or_default().insert(key);
  }

  Ok(summary)
}
