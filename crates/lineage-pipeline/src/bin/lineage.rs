//! `lineage` — batch driver for the Lineage entity resolver.
//!
//! Reads `lineage.toml` (or the path given with `--config`) layered with
//! `LINEAGE_*` environment variables, and opens the SQLite store named by
//! `store_path`.
//!
//! ```
//! lineage windows membership.json
//! lineage ingest producers.json
//! lineage resolve
//! lineage pending
//! lineage adjudicate decision.json
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::{Context as _, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use lineage_core::{
  EntityKey, Ticker, adjudication::NewAdjudication, lifecycle::WindowStage, store::EvidenceStore,
};
use lineage_pipeline::{
  PipelineConfig,
  ingest::{ProducerBatch, ingest_batch},
  windows::{MembershipFeed, record_membership},
};
use lineage_store_sqlite::SqliteStore;
use serde::de::DeserializeOwned;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Temporal ticker to entity resolution")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "lineage.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Build ticker windows from a membership feed (JSON).
  Windows { feed: PathBuf },
  /// Load producer candidates and evidence harvests (JSON).
  Ingest { batch: PathBuf },
  /// Decide, merge and commit every ticker, then rebuild name histories.
  Resolve,
  /// Record a reviewer decision (JSON).
  Adjudicate { decision: PathBuf },
  /// List windows by stage; pending review by default.
  Pending {
    #[arg(long, default_value = "pending-review")]
    stage: WindowStage,
  },
  /// Print a ticker's mapping history.
  Mappings {
    ticker: String,
    /// Include superseded episodes.
    #[arg(long)]
    all:    bool,
  },
  /// Print an entity's name history.
  Names {
    entity_key: String,
    /// Include superseded episodes.
    #[arg(long)]
    all:        bool,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let cfg = PipelineConfig::load(&cli.config)
    .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;

  let store = SqliteStore::open(&cfg.store_path)
    .await
    .with_context(|| format!("failed to open store at {}", cfg.store_path.display()))?;

  match cli.command {
    Command::Windows { feed } => {
      let feed: MembershipFeed = read_json(&feed)?;
      let horizon_end = cfg.horizon_end.unwrap_or_else(|| Utc::now().date_naive());
      let load = record_membership(&store, feed, horizon_end).await?;
      tracing::info!(
        tickers = load.tickers,
        recorded = load.recorded,
        rejected = load.rejected,
        horizon_end = %horizon_end,
        "membership loaded"
      );
    }

    Command::Ingest { batch } => {
      let batch: ProducerBatch = read_json(&batch)?;
      let summary = ingest_batch(&store, batch).await?;
      tracing::info!(
        candidates = summary.candidates,
        harvests = summary.harvests,
        evidence = summary.evidence,
        skipped = summary.skipped,
        rejected = summary.rejected,
        "producer batch ingested"
      );
    }

    Command::Resolve => {
      let summary =
        lineage_pipeline::run(Arc::new(store), Arc::new(cfg.policy), cfg.workers).await?;
      if !summary.is_clean() {
        bail!(
          "{} ticker(s) and {} entity name histories failed; see log",
          summary.failed_tickers.len(),
          summary.failed_entities.len()
        );
      }
    }

    Command::Adjudicate { decision } => {
      let input: NewAdjudication = read_json(&decision)?;
      match store.record_adjudication(input).await {
        Ok(adjudication) => {
          println!("{}", serde_json::to_string_pretty(&adjudication)?);
        }
        Err(e) => {
          if let Some(invalid) = e.as_validation() {
            bail!("decision rejected on `{}`: {invalid}", invalid.field());
          }
          return Err(e).context("failed to record adjudication");
        }
      }
    }

    Command::Pending { stage } => {
      for report in store.window_reports(Some(stage)).await? {
        println!("{}\t{}\t{}", report.ticker, report.window, report.stage());
      }
    }

    Command::Mappings { ticker, all } => {
      let ticker = Ticker::normalize(&ticker)?;
      let history = store.mappings(ticker, all).await?;
      println!("{}", serde_json::to_string_pretty(&history)?);
    }

    Command::Names { entity_key, all } => {
      let entity_key = EntityKey::parse(&entity_key)?;
      let history = store.names(entity_key, all).await?;
      println!("{}", serde_json::to_string_pretty(&history)?);
    }
  }

  Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
  let raw = std::fs::read_to_string(path)
    .with_context(|| format!("reading {}", path.display()))?;
  serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}
