//! Episode lifecycle and per-window processing stages.
//!
//! Episodes are immutable. When a later merge no longer produces an episode,
//! the store appends a supersession event for it instead of editing or
//! deleting the row; if a later merge produces it again, a reinstatement
//! event is appended. An episode's status is computed at query time from the
//! newest event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::{ticker::Ticker, window::Window};

// ─── Computed status ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EpisodeStatus {
  Active,
  Superseded { at: DateTime<Utc> },
}

impl EpisodeStatus {
  pub fn is_active(&self) -> bool { matches!(self, Self::Active) }
}

/// An episode bundled with its current lifecycle status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolved<T> {
  pub episode:     T,
  pub status:      EpisodeStatus,
  /// When the episode was first committed.
  pub recorded_at: DateTime<Utc>,
}

/// What a commit changed. A commit of an unchanged episode set reports only
/// `unchanged`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSummary {
  pub inserted:   usize,
  pub superseded: usize,
  pub reinstated: usize,
  pub unchanged:  usize,
}

impl CommitSummary {
  pub fn is_noop(&self) -> bool {
    self.inserted == 0 && self.superseded == 0 && self.reinstated == 0
  }
}

impl std::ops::AddAssign for CommitSummary {
  fn add_assign(&mut self, other: Self) {
    self.inserted += other.inserted;
    self.superseded += other.superseded;
    self.reinstated += other.reinstated;
    self.unchanged += other.unchanged;
  }
}

// ─── Window stages ───────────────────────────────────────────────────────────

/// Where one `(ticker, window)` stands in the resolution pipeline.
///
/// The normal path is `CandidatesGathered`, then `AutoAccepted` or
/// `NeedsAdjudication` followed by `PendingReview` and `Adjudicated`, ending
/// at `MergedIntoEpisode`. `AwaitingEvidence` means producers have not
/// delivered anything yet, which is not an error.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum WindowStage {
  AwaitingEvidence,
  CandidatesGathered,
  AutoAccepted,
  NeedsAdjudication,
  PendingReview,
  Adjudicated,
  MergedIntoEpisode,
}

impl WindowStage {
  /// True for stages that leave the window without an episode.
  pub fn is_open(self) -> bool {
    matches!(self, Self::AwaitingEvidence | Self::PendingReview)
  }
}

/// The stage a window reached in the latest run, with the stages it passed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowReport {
  pub ticker: Ticker,
  pub window: Window,
  pub trace:  Vec<WindowStage>,
}

impl WindowReport {
  pub fn stage(&self) -> WindowStage {
    self.trace.last().copied().unwrap_or(WindowStage::AwaitingEvidence)
  }
}
