//! Error type for `lineage-pipeline`.

use lineage_core::{DataQualityError, EmptyCandidateSet, MergeInvariantViolation};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
  #[error(transparent)]
  Core(#[from] lineage_core::Error),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("configuration error: {0}")]
  Config(#[from] config::ConfigError),

  #[error("worker task failed: {0}")]
  Join(#[from] tokio::task::JoinError),
}

impl PipelineError {
  /// Box a backend error.
  pub fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(e))
  }
}

impl From<DataQualityError> for PipelineError {
  fn from(e: DataQualityError) -> Self { Self::Core(e.into()) }
}

impl From<EmptyCandidateSet> for PipelineError {
  fn from(e: EmptyCandidateSet) -> Self { Self::Core(e.into()) }
}

impl From<MergeInvariantViolation> for PipelineError {
  fn from(e: MergeInvariantViolation) -> Self { Self::Core(e.into()) }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
