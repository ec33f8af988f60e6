//! JSON wire-record loading for the ingest subcommands.
//!
//! Files contain arrays of records. Records are decoded one by one so a
//! single malformed or out-of-vocabulary record is counted and skipped
//! without aborting the rest of its batch.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use wafer_core::evidence::{
  ClaimedAttributes, NewHypothesis, NewObservation, StockStatus,
};
use wafer_core::store::EvidenceStore;
use wafer_store_sqlite::{Error as StoreError, SqliteStore};

// ─── Wire records ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ObservationRecord {
  description:  String,
  retailer:     String,
  url:          String,
  #[serde(default)]
  sku:          Option<String>,
  price:        f64,
  #[serde(default = "default_currency")]
  currency:     String,
  stock_status: StockStatus,
  observed_at:  DateTime<Utc>,
  run_id:       String,
}

fn default_currency() -> String {
  "EUR".into()
}

impl ObservationRecord {
  fn into_new(self) -> NewObservation {
    NewObservation {
      description:  self.description,
      retailer:     self.retailer,
      url:          self.url,
      sku:          self.sku,
      price_eur:    self.price,
      currency:     self.currency,
      stock_status: self.stock_status,
      observed_at:  self.observed_at,
      run_id:       self.run_id,
    }
  }
}

#[derive(Debug, Deserialize)]
struct HypothesisRecord {
  description: String,
  source:      String,
  run_id:      String,
  #[serde(default)]
  recorded_at: Option<DateTime<Utc>>,
  #[serde(default)]
  claims:      ClaimedAttributes,
}

impl HypothesisRecord {
  fn into_new(self) -> NewHypothesis {
    NewHypothesis {
      description: self.description,
      source:      self.source,
      run_id:      self.run_id,
      recorded_at: self.recorded_at,
      claims:      self.claims,
    }
  }
}

// ─── Summary ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct IngestSummary {
  pub files_scanned: u64,
  pub inserted:      u64,
  pub replayed:      u64,
  pub rejected:      u64,
  pub errors:        u64,
}

// ─── File walking ────────────────────────────────────────────────────────────

/// All JSON files under `path` (or `path` itself), in deterministic order.
fn json_files(path: &Path) -> Vec<PathBuf> {
  if path.is_file() {
    return vec![path.to_owned()];
  }
  walkdir::WalkDir::new(path)
    .sort_by_file_name()
    .into_iter()
    .filter_map(|entry| entry.ok())
    .filter(|entry| entry.file_type().is_file())
    .map(|entry| entry.into_path())
    .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
    .collect()
}

fn load_records(path: &Path) -> anyhow::Result<Vec<serde_json::Value>> {
  let text = std::fs::read_to_string(path)?;
  Ok(serde_json::from_str(&text)?)
}

// ─── Ingest loops ────────────────────────────────────────────────────────────

pub async fn ingest_observations(
  store: &SqliteStore,
  path: &Path,
) -> anyhow::Result<IngestSummary> {
  let mut summary = IngestSummary::default();

  for file in json_files(path) {
    summary.files_scanned += 1;
    let records = match load_records(&file) {
      Ok(records) => records,
      Err(error) => {
        summary.errors += 1;
        tracing::warn!(file = %file.display(), %error, "unreadable file");
        continue;
      }
    };

    for value in records {
      let record: ObservationRecord = match serde_json::from_value(value) {
        Ok(record) => record,
        Err(error) => {
          summary.rejected += 1;
          tracing::warn!(file = %file.display(), %error, "malformed observation record");
          continue;
        }
      };

      match store.append_observation(record.into_new()).await {
        Ok(appended) if appended.was_inserted() => summary.inserted += 1,
        Ok(_) => summary.replayed += 1,
        Err(StoreError::Core(error)) => {
          summary.rejected += 1;
          tracing::warn!(file = %file.display(), %error, "observation rejected");
        }
        Err(error) => {
          summary.errors += 1;
          tracing::warn!(file = %file.display(), %error, "observation append failed");
        }
      }
    }
  }

  Ok(summary)
}

pub async fn ingest_hypotheses(
  store: &SqliteStore,
  path: &Path,
) -> anyhow::Result<IngestSummary> {
  let mut summary = IngestSummary::default();

  for file in json_files(path) {
    summary.files_scanned += 1;
    let records = match load_records(&file) {
      Ok(records) => records,
      Err(error) => {
        summary.errors += 1;
        tracing::warn!(file = %file.display(), %error, "unreadable file");
        continue;
      }
    };

    for value in records {
      let record: HypothesisRecord = match serde_json::from_value(value) {
        Ok(record) => record,
        Err(error) => {
          summary.rejected += 1;
          tracing::warn!(file = %file.display(), %error, "malformed hypothesis record");
          continue;
        }
      };

      match store.append_hypothesis(record.into_new()).await {
        Ok(appended) if appended.was_inserted() => summary.inserted += 1,
        Ok(_) => summary.replayed += 1,
        Err(StoreError::Core(error)) => {
          summary.rejected += 1;
          tracing::warn!(file = %file.display(), %error, "hypothesis rejected");
        }
        Err(error) => {
          summary.errors += 1;
          tracing::warn!(file = %file.display(), %error, "hypothesis append failed");
        }
      }
    }
  }

  Ok(summary)
}
