//! Window builder — turns raw index-membership observations into half-open
//! windows per ticker.
//!
//! Each ticker's observations are split into maximal runs of constant
//! membership. Runs are contiguous from the first observation to the end of
//! the research horizon; the windows where the ticker was a member are the
//! ticker windows every later stage keys on.
//!
//! Bad input is rejected, never repaired. A malformed record is dropped on
//! its own; an out-of-order or contradictory sequence rejects the whole
//! ticker, since any windows derived from it would be wrong.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::{error::DataQualityError, ticker::Ticker, window::Window};

/// One `(ticker, as-of date, member?)` observation from a membership feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipObservation {
  /// Raw symbol as the feed printed it; normalised by the builder.
  pub ticker: String,
  pub as_of:  NaiveDate,
  pub member: bool,
}

/// The full member list of the index on one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipSnapshot {
  pub as_of:   NaiveDate,
  pub members: Vec<String>,
}

/// A date-bounded symbol rewrite: inside `window`, `alias` is reported as
/// `canonical`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickerAlias {
  pub alias:     Ticker,
  pub canonical: Ticker,
  pub window:    Window,
}

fn rewrite(ticker: Ticker, as_of: NaiveDate, aliases: &[TickerAlias]) -> Ticker {
  aliases
    .iter()
    .find(|a| a.alias == ticker && a.window.contains(as_of))
    .map_or(ticker, |a| a.canonical.clone())
}

/// A maximal run of constant membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipRun {
  pub window: Window,
  pub member: bool,
}

/// Output of [`build_windows`].
#[derive(Debug, Clone, Default)]
pub struct Windows {
  pub runs:     BTreeMap<Ticker, Vec<MembershipRun>>,
  /// Everything that was rejected, in input order.
  pub rejected: Vec<DataQualityError>,
}

impl Windows {
  /// The windows over which `ticker` was a member, in chronological order.
  pub fn member_windows(&self, ticker: &Ticker) -> Vec<Window> {
    self
      .runs
      .get(ticker)
      .into_iter()
      .flatten()
      .filter(|r| r.member)
      .map(|r| r.window)
      .collect()
  }

  /// Every `(ticker, member window)` pair.
  pub fn iter_member_windows(&self) -> impl Iterator<Item = (&Ticker, Window)> + '_ {
    self.runs.iter().flat_map(|(ticker, runs)| {
      runs.iter().filter(|r| r.member).map(move |r| (ticker, r.window))
    })
  }
}

/// Expand daily member lists into observations. Once a ticker has appeared,
/// every later snapshot reports it, as a non-member if it is absent.
pub fn expand_snapshots(
  snapshots: &[MembershipSnapshot],
  aliases: &[TickerAlias],
) -> Vec<MembershipObservation> {
  let mut seen: BTreeSet<String> = BTreeSet::new();
  let mut observations = Vec::new();

  for snapshot in snapshots {
    let members: BTreeSet<String> = snapshot
      .members
      .iter()
      .map(|raw| raw.trim())
      .filter(|raw| !raw.is_empty())
      .map(|raw| match Ticker::normalize(raw) {
        Ok(t) => rewrite(t, snapshot.as_of, aliases).into(),
        // Kept raw so the builder reports it.
        Err(_) => raw.to_owned(),
      })
      .collect();

    seen.extend(members.iter().cloned());
    observations.extend(seen.iter().map(|ticker| MembershipObservation {
      ticker: ticker.clone(),
      as_of:  snapshot.as_of,
      member: members.contains(ticker),
    }));
  }
  observations
}

/// Build membership windows from a stream of observations.
///
/// `horizon_end` is the last day of the research horizon; the final run of
/// every ticker closes at `horizon_end + 1 day`. The output depends only on
/// the input, so re-running on the same feed yields identical windows.
pub fn build_windows(
  observations: impl IntoIterator<Item = MembershipObservation>,
  aliases: &[TickerAlias],
  horizon_end: NaiveDate,
) -> Windows {
  let mut out = Windows::default();
  let mut series: BTreeMap<Ticker, Vec<(NaiveDate, bool)>> = BTreeMap::new();

  for obs in observations {
    let ticker = match Ticker::normalize(&obs.ticker) {
      Ok(t) => rewrite(t, obs.as_of, aliases),
      Err(e) => {
        out.rejected.push(e);
        continue;
      }
    };
    if obs.as_of > horizon_end {
      out.rejected.push(DataQualityError::OutsideHorizon {
        ticker,
        date: obs.as_of,
        horizon_end,
      });
      continue;
    }
    series.entry(ticker).or_default().push((obs.as_of, obs.member));
  }

  for (ticker, points) in series {
    match runs_for(&ticker, &points, horizon_end) {
      Ok(runs) => {
        out.runs.insert(ticker, runs);
      }
      Err(e) => out.rejected.push(e),
    }
  }
  out
}

fn runs_for(
  ticker: &Ticker,
  points: &[(NaiveDate, bool)],
  horizon_end: NaiveDate,
) -> Result<Vec<MembershipRun>, DataQualityError> {
  let Some(&(first_date, first_flag)) = points.first() else {
    return Ok(Vec::new());
  };

  let mut runs = Vec::new();
  let (mut run_start, mut status) = (first_date, first_flag);
  let mut previous = first_date;

  for &(date, flag) in &points[1..] {
    if date < previous {
      return Err(DataQualityError::NonMonotonic {
        ticker: ticker.clone(),
        previous,
        date,
      });
    }
    if date == previous {
      if flag != status {
        return Err(DataQualityError::ConflictingObservation {
          ticker: ticker.clone(),
          date,
        });
      }
      continue;
    }
    if flag != status {
      runs.push(MembershipRun { window: Window::new(run_start, date)?, member: status });
      run_start = date;
      status = flag;
    }
    previous = date;
  }

  let close = horizon_end
    .checked_add_days(Days::new(1))
    .ok_or(DataQualityError::InvalidWindow { start: run_start, end: horizon_end })?;
  runs.push(MembershipRun { window: Window::new(run_start, close)?, member: status });
  Ok(runs)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn d(s: &str) -> NaiveDate { NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap() }

  fn obs(ticker: &str, date: &str, member: bool) -> MembershipObservation {
    MembershipObservation { ticker: ticker.into(), as_of: d(date), member }
  }

  fn t(s: &str) -> Ticker { Ticker::normalize(s).unwrap() }

  #[test]
  fn builds_contiguous_runs_and_member_windows() {
    let feed = vec![
      obs("abcd", "2010-01-01", true),
      obs("ABCD", "2011-06-01", true),
      obs("ABCD", "2012-01-01", false),
      obs("ABCD", "2013-01-01", true),
    ];
    let built = build_windows(feed, &[], d("2014-12-31"));
    assert!(built.rejected.is_empty());

    let runs = &built.runs[&t("ABCD")];
    assert_eq!(runs.len(), 3);
    assert_eq!(runs[0].window.end(), runs[1].window.start());
    assert_eq!(runs[1].window.end(), runs[2].window.start());
    assert_eq!(
      built.member_windows(&t("ABCD")),
      vec![
        Window::new(d("2010-01-01"), d("2012-01-01")).unwrap(),
        Window::new(d("2013-01-01"), d("2015-01-01")).unwrap(),
      ]
    );
  }

  #[test]
  fn non_monotonic_feed_rejects_the_ticker_only() {
    let feed = vec![
      obs("ABCD", "2012-01-01", true),
      obs("WXYZ", "2012-01-01", true),
      obs("ABCD", "2011-01-01", true),
    ];
    let built = build_windows(feed, &[], d("2014-12-31"));
    assert!(!built.runs.contains_key(&t("ABCD")));
    assert!(built.runs.contains_key(&t("WXYZ")));
    assert!(matches!(built.rejected[..], [DataQualityError::NonMonotonic { .. }]));
  }

  #[test]
  fn conflicting_flags_on_one_day_are_rejected() {
    let feed = vec![obs("ABCD", "2012-01-01", true), obs("ABCD", "2012-01-01", false)];
    let built = build_windows(feed, &[], d("2014-12-31"));
    assert!(matches!(
      built.rejected[..],
      [DataQualityError::ConflictingObservation { .. }]
    ));
  }

  #[test]
  fn malformed_and_out_of_horizon_records_are_skipped() {
    let feed = vec![
      obs("AB$", "2012-01-01", true),
      obs("ABCD", "2012-01-01", true),
      obs("ABCD", "2016-01-01", false),
    ];
    let built = build_windows(feed, &[], d("2014-12-31"));
    assert_eq!(built.rejected.len(), 2);
    assert_eq!(built.member_windows(&t("ABCD")).len(), 1);
  }

  #[test]
  fn rebuilding_is_idempotent() {
    let feed = vec![obs("ABCD", "2010-01-01", true), obs("ABCD", "2012-01-01", false)];
    let a = build_windows(feed.clone(), &[], d("2014-12-31"));
    let b = build_windows(feed, &[], d("2014-12-31"));
    assert_eq!(a.runs, b.runs);
  }

  #[test]
  fn snapshots_expand_with_aliases() {
    let aliases = vec![TickerAlias {
      alias:     t("AABA"),
      canonical: t("YHOO"),
      window:    Window::new(d("2017-06-16"), d("2017-06-20")).unwrap(),
    }];
    let snapshots = vec![
      MembershipSnapshot { as_of: d("2017-06-15"), members: vec!["YHOO".into(), "A".into()] },
      MembershipSnapshot { as_of: d("2017-06-16"), members: vec!["AABA".into(), "A".into()] },
      MembershipSnapshot { as_of: d("2017-06-19"), members: vec!["A".into()] },
    ];
    let feed = expand_snapshots(&snapshots, &aliases);
    let built = build_windows(feed, &aliases, d("2017-06-30"));

    assert!(built.rejected.is_empty());
    assert_eq!(
      built.member_windows(&t("YHOO")),
      vec![Window::new(d("2017-06-15"), d("2017-06-19")).unwrap()]
    );
    assert!(!built.runs.contains_key(&t("AABA")));
  }
}
