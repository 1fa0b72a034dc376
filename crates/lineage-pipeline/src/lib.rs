//! Batch orchestration for Lineage.
//!
//! Drives the core pipeline against any [`EvidenceStore`]: membership feeds
//! become ticker windows, producer output is ingested with its harvest
//! checkpoints, and a pool of per-ticker workers decides, merges and commits
//! mapping episodes before name histories are rebuilt per entity.
//!
//! [`EvidenceStore`]: lineage_core::store::EvidenceStore

pub mod config;
pub mod error;
pub mod ingest;
pub mod resolve;
pub mod windows;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use resolve::{RunSummary, TickerOutcome, resolve_names, resolve_ticker, run};
