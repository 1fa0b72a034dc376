//! Membership feeds to stored ticker windows.

use chrono::NaiveDate;
use lineage_core::{
  DataQualityError,
  membership::{MembershipObservation, MembershipSnapshot, TickerAlias, build_windows, expand_snapshots},
  store::EvidenceStore,
};
use serde::Deserialize;

use crate::{PipelineError, Result};

/// A membership feed as delivered by the index provider. Snapshots and
/// explicit observations may be mixed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MembershipFeed {
  #[serde(default)]
  pub snapshots:    Vec<MembershipSnapshot>,
  #[serde(default)]
  pub observations: Vec<MembershipObservation>,
  #[serde(default)]
  pub aliases:      Vec<TickerAlias>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowLoad {
  pub tickers:  usize,
  pub recorded: usize,
  pub rejected: usize,
}

/// Build member windows from `feed` and persist them.
///
/// Rejected records and tickers whose windows conflict with stored ones are
/// logged and skipped; the rest of the feed is still recorded.
pub async fn record_membership<S>(
  store: &S,
  feed: MembershipFeed,
  horizon_end: NaiveDate,
) -> Result<WindowLoad>
where
  S: EvidenceStore,
{
  let mut observations = expand_snapshots(&feed.snapshots, &feed.aliases);
  observations.extend(feed.observations);

  let built = build_windows(observations, &feed.aliases, horizon_end);
  let mut load = WindowLoad { rejected: built.rejected.len(), ..WindowLoad::default() };
  for rejection in &built.rejected {
    tracing::warn!(error = %rejection, "membership record rejected");
  }

  for ticker in built.runs.keys() {
    let windows = built.member_windows(ticker);
    if windows.is_empty() {
      continue;
    }

    let stored = store.windows(ticker.clone()).await.map_err(PipelineError::store)?;
    let conflict = windows.iter().find_map(|w| {
      stored
        .iter()
        .find(|s| *s != w && s.overlaps(w))
        .map(|s| DataQualityError::WindowConflict {
          ticker:   ticker.clone(),
          window:   *w,
          existing: *s,
        })
    });
    if let Some(conflict) = conflict {
      tracing::warn!(ticker = %ticker, error = %conflict, "windows rejected");
      load.rejected += 1;
      continue;
    }

    let inserted = store
      .record_windows(ticker.clone(), windows)
      .await
      .map_err(PipelineError::store)?;
    tracing::debug!(ticker = %ticker, inserted, "windows recorded");
    load.tickers += 1;
    load.recorded += inserted;
  }

  Ok(load)
}
