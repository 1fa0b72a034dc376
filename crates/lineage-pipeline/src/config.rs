//! Runtime configuration, layered from an optional TOML file and `LINEAGE_*`
//! environment variables.
//!
//! ```toml
//! store_path  = "lineage.db"
//! workers     = 8
//! horizon_end = "2024-12-31"
//!
//! [policy]
//! manual_only_tickers = ["GOOG"]
//!
//! [policy.excluded_candidates]
//! ABCD = ["0000099999"]
//! ```
//!
//! Nested keys are reachable from the environment with a double underscore,
//! e.g. `LINEAGE_POLICY__NAME_SUFFIXES`.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use lineage_core::policy::FilingPolicy;
use serde::Deserialize;

use crate::Result;

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
  #[serde(default = "default_store_path")]
  pub store_path:  PathBuf,
  /// Upper bound on concurrently resolved tickers.
  #[serde(default = "default_workers")]
  pub workers:     usize,
  /// Last day of the research horizon. Defaults to today when building
  /// windows.
  #[serde(default)]
  pub horizon_end: Option<NaiveDate>,
  #[serde(default)]
  pub policy:      FilingPolicy,
}

fn default_store_path() -> PathBuf { PathBuf::from("lineage.db") }

fn default_workers() -> usize { 8 }

impl PipelineConfig {
  /// Load from `path` (skipped if missing) and the environment.
  pub fn load(path: &Path) -> Result<Self> {
    Self::from_file(config::File::from(path).required(false))
  }

  fn from_file(file: impl config::Source + Send + Sync + 'static) -> Result<Self> {
    let cfg: Self = config::Config::builder()
      .add_source(file)
      .add_source(
        config::Environment::with_prefix("LINEAGE")
          .prefix_separator("_")
          .separator("__")
          .list_separator(",")
          .with_list_parse_key("policy.name_suffixes")
          .with_list_parse_key("policy.manual_only_tickers")
          .try_parsing(true),
      )
      .build()?
      .try_deserialize()?;
    cfg.policy.validate()?;
    Ok(cfg)
  }
}

#[cfg(test)]
mod tests {
  use config::{File, FileFormat};
  use lineage_core::{EntityKey, Ticker};

  use super::*;

  #[test]
  fn empty_file_uses_defaults() {
    let cfg = PipelineConfig::from_file(File::from_str("", FileFormat::Toml)).unwrap();
    assert_eq!(cfg.store_path, PathBuf::from("lineage.db"));
    assert_eq!(cfg.workers, 8);
    assert_eq!(cfg.horizon_end, None);
    assert!(cfg.policy.periodic_forms.contains("10-K"));
  }

  #[test]
  fn policy_tables_override_defaults() {
    let toml = r#"
      workers     = 2
      horizon_end = "2020-12-31"

      [policy]
      manual_only_tickers = ["GOOG"]

      [policy.excluded_candidates]
      ABCD = ["0000099999"]
    "#;
    let cfg = PipelineConfig::from_file(File::from_str(toml, FileFormat::Toml)).unwrap();
    assert_eq!(cfg.workers, 2);
    assert_eq!(cfg.horizon_end, NaiveDate::from_ymd_opt(2020, 12, 31));
    let abcd = Ticker::normalize("ABCD").unwrap();
    assert!(cfg.policy.is_excluded(&abcd, &EntityKey::parse("0000099999").unwrap()));
    assert!(cfg.policy.is_manual_only(&Ticker::normalize("goog").unwrap()));
    // Untouched policy fields keep their defaults.
    assert!(cfg.policy.event_forms.contains("8-K"));
  }
}
