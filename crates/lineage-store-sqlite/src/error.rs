//! Error type for `lineage-store-sqlite`.

use lineage_core::{
  DataQualityError, EmptyCandidateSet, MergeInvariantViolation, ValidationError, Ticker,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Core(#[from] lineage_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored enum column holds a value this build does not know.
  #[error("unknown {column} value {value:?}")]
  UnknownValue { column: &'static str, value: String },

  /// An episode handed to a commit belongs to a different key.
  #[error("episode for {found} committed under {expected}")]
  ForeignEpisode { expected: String, found: String },

  #[error("window report for {found} recorded under {expected}")]
  ForeignReport { expected: Ticker, found: Ticker },
}

impl Error {
  /// The core validation error, if the store rejected a reviewer's input.
  pub fn as_validation(&self) -> Option<&ValidationError> {
    match self {
      Self::Core(lineage_core::Error::Validation(e)) => Some(e),
      _ => None,
    }
  }
}

impl From<rusqlite::Error> for Error {
  fn from(e: rusqlite::Error) -> Self { Self::Database(e.into()) }
}

impl From<DataQualityError> for Error {
  fn from(e: DataQualityError) -> Self { Self::Core(e.into()) }
}

impl From<EmptyCandidateSet> for Error {
  fn from(e: EmptyCandidateSet) -> Self { Self::Core(e.into()) }
}

impl From<ValidationError> for Error {
  fn from(e: ValidationError) -> Self { Self::Core(e.into()) }
}

impl From<MergeInvariantViolation> for Error {
  fn from(e: MergeInvariantViolation) -> Self { Self::Core(e.into()) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
