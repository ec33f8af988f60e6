//! Error types for `wafer-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown vendor: {0:?}")]
  UnknownVendor(String),

  #[error("unknown stock status: {0:?}")]
  UnknownStockStatus(String),

  #[error("unknown cooling kind: {0:?}")]
  UnknownCoolingKind(String),

  #[error("unknown memory kind: {0:?}")]
  UnknownMemoryKind(String),

  #[error("unknown compute-unit kind: {0:?}")]
  UnknownComputeUnitKind(String),

  #[error("price must be positive, got {0}")]
  NonPositivePrice(f64),

  #[error("missing required field: {0}")]
  MissingField(&'static str),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
