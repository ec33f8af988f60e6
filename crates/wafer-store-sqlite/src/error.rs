//! Error type for `wafer-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] wafer_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored column value no longer decodes into its closed vocabulary.
  #[error("undecodable column value: {0}")]
  Decode(String),

  #[error("chip not found: {0}")]
  ChipNotFound(String),

  #[error("variant not found: {0}")]
  VariantNotFound(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
