//! wafer command-line interface.
//!
//! Batch-style entry points around the store and the resolution engine:
//! ingest evidence from JSON files, resolve pending observations into the
//! catalog, surface the enrichment queue, and print derived views.

use std::{collections::HashSet, path::PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use wafer_core::{
  fingerprint::fingerprint,
  store::{DerivedViews, EvidenceStore, FingerprintIndex},
};
use wafer_resolve::{RankingPolicy, ResolveOptions, Resolver};
use wafer_store_sqlite::SqliteStore;

mod ingest;
mod settings;

use ingest::IngestSummary;
use settings::Settings;

#[derive(Parser)]
#[command(author, version, about = "GPU market evidence resolution")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "wafer.toml")]
  config: PathBuf,

  /// Override the configured database path.
  #[arg(long)]
  db_path: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Append market observations from JSON files.
  IngestObservations {
    /// A JSON file or a directory scanned recursively.
    path: PathBuf,
  },

  /// Append product hypotheses from JSON files.
  IngestHypotheses {
    path: PathBuf,
  },

  /// Resolve pending observations into the canonical catalog.
  Resolve {
    /// Process at most this many pending observations.
    #[arg(long)]
    limit:   Option<usize>,
    /// Decide and report without writing anything.
    #[arg(long)]
    dry_run: bool,
  },

  /// Ingest observations and hypotheses, then resolve.
  Run {
    observations: PathBuf,
    hypotheses:   PathBuf,
    #[arg(long)]
    dry_run:      bool,
  },

  /// List unresolved descriptions whose fingerprints have not been sent for
  /// enrichment yet.
  EnrichmentQueue {
    /// Mark the listed fingerprints as seen.
    #[arg(long)]
    mark: bool,
  },

  /// Print the latest observation per (variant, retailer).
  Prices,

  /// Print value metrics over currently available listings.
  Value,
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
  let settings = Settings::load(&cli.config)?;

  let db_path = cli.db_path.unwrap_or_else(|| settings.db_path.clone());
  if let Some(parent) = db_path.parent() {
    if !parent.as_os_str().is_empty() {
      std::fs::create_dir_all(parent)
        .with_context(|| format!("failed to create {}", parent.display()))?;
    }
  }

  let store = SqliteStore::open(&db_path)
    .await
    .with_context(|| format!("failed to open store at {}", db_path.display()))?;

  match cli.command {
    Command::IngestObservations { path } => {
      let summary = ingest::ingest_observations(&store, &path).await?;
      log_ingest("observations", &summary);
    }

    Command::IngestHypotheses { path } => {
      let summary = ingest::ingest_hypotheses(&store, &path).await?;
      log_ingest("hypotheses", &summary);
    }

    Command::Resolve { limit, dry_run } => {
      let resolver = resolver(store, &settings);
      let report = resolver
        .resolve_pending(&ResolveOptions { limit, dry_run })
        .await?;
      println!("{}", serde_json::to_string_pretty(&report)?);
    }

    Command::Run { observations, hypotheses, dry_run } => {
      tracing::info!("step 1: ingest observations");
      let summary = ingest::ingest_observations(&store, &observations).await?;
      log_ingest("observations", &summary);

      tracing::info!("step 2: ingest hypotheses");
      let summary = ingest::ingest_hypotheses(&store, &hypotheses).await?;
      log_ingest("hypotheses", &summary);

      tracing::info!("step 3: resolve");
      let resolver = resolver(store, &settings);
      let report = resolver
        .resolve_pending(&ResolveOptions { limit: None, dry_run })
        .await?;
      println!("{}", serde_json::to_string_pretty(&report)?);
    }

    Command::EnrichmentQueue { mark } => {
      enrichment_queue(&store, mark).await?;
    }

    Command::Prices => {
      let rows = store.latest_prices().await?;
      println!("{}", serde_json::to_string_pretty(&rows)?);
    }

    Command::Value => {
      let rows = store.value_metrics().await?;
      println!("{}", serde_json::to_string_pretty(&rows)?);
    }
  }

  Ok(())
}

fn resolver(store: SqliteStore, settings: &Settings) -> Resolver<SqliteStore> {
  Resolver::new(store, RankingPolicy::new(settings.source_trust.clone()))
}

fn log_ingest(kind: &str, summary: &IngestSummary) {
  tracing::info!(
    kind,
    files_scanned = summary.files_scanned,
    inserted = summary.inserted,
    replayed = summary.replayed,
    rejected = summary.rejected,
    errors = summary.errors,
    "ingest complete"
  );
}

/// Print the descriptions that still need enrichment: unlinked observations
/// whose fingerprints the gate has not recorded. With `--mark`, record them
/// so the next pass skips the same listings.
async fn enrichment_queue(store: &SqliteStore, mark: bool) -> anyhow::Result<()> {
  let pending = store.unresolved_observations(None).await?;

  let mut batch_seen: HashSet<String> = HashSet::new();
  let mut queue: Vec<(String, String)> = Vec::new();
  for observation in pending {
    let key = fingerprint(&observation.description);
    if !batch_seen.insert(key.clone()) {
      continue;
    }
    if store.has_seen(&key).await? {
      continue;
    }
    queue.push((key, observation.description));
  }

  for (key, description) in &queue {
    println!(
      "{}",
      serde_json::json!({ "fingerprint": key, "description": description })
    );
  }

  if mark {
    let run_id = Uuid::new_v4().to_string();
    for (key, _) in &queue {
      store.mark_seen(key, &run_id).await?;
    }
    tracing::info!(queued = queue.len(), run = %run_id, "fingerprints marked");
  } else {
    tracing::info!(queued = queue.len(), "enrichment queue ready");
  }

  Ok(())
}
