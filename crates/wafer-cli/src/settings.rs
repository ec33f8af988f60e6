//! Runtime configuration, deserialised from `wafer.toml` with
//! `WAFER_`-prefixed environment overrides.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
  /// SQLite database path.
  pub db_path:      PathBuf,
  /// Enrichment sources in descending trust, for hypothesis ranking.
  pub source_trust: Vec<String>,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      db_path:      PathBuf::from("db/wafer.db"),
      source_trust: vec!["perplexity_ai".into()],
    }
  }
}

impl Settings {
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path.to_owned()).required(false))
      .add_source(config::Environment::with_prefix("WAFER"))
      .build()
      .context("failed to read configuration")?;

    settings
      .try_deserialize()
      .context("failed to deserialise settings")
  }
}
