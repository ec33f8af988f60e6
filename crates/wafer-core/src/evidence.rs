//! Evidence types — the append-only facts the resolution engine consumes.
//!
//! An observation is an immutable point-in-time snapshot of one listing at
//! one retailer. A hypothesis is an unreliable interpretation of a listing
//! description produced by an external enrichment process. Both carry
//! lineage; neither is ever truth.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  identity::{HypothesisId, ObservationId, VariantId},
};

// ─── Stock status ────────────────────────────────────────────────────────────

/// Retailer stock state. A closed vocabulary: an unrecognized value is a hard
/// validation failure at the evidence boundary, never coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
  InStock,
  LowStock,
  Preorder,
  OutOfStock,
  Discontinued,
}

impl StockStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::InStock => "in_stock",
      Self::LowStock => "low_stock",
      Self::Preorder => "preorder",
      Self::OutOfStock => "out_of_stock",
      Self::Discontinued => "discontinued",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "in_stock" => Ok(Self::InStock),
      "low_stock" => Ok(Self::LowStock),
      "preorder" => Ok(Self::Preorder),
      "out_of_stock" => Ok(Self::OutOfStock),
      "discontinued" => Ok(Self::Discontinued),
      _ => Err(Error::UnknownStockStatus(s.to_owned())),
    }
  }

  /// Whether a listing in this state is purchasable now; the value views
  /// filter on this.
  pub fn is_available(&self) -> bool {
    matches!(self, Self::InStock | Self::LowStock)
  }
}

// ─── Observation ─────────────────────────────────────────────────────────────

/// An immutable market snapshot. Once written, no field ever changes except
/// `variant_id`, which the resolution engine sets exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
  /// Monotonic append sequence, assigned by the store.
  pub seq:             i64,
  pub observation_id:  ObservationId,
  /// Resolution linkage; `None` while the observation is deferred.
  pub variant_id:      Option<VariantId>,
  pub description:     String,
  /// Folded description, used to join hypotheses to observations.
  pub description_key: String,
  pub retailer:        String,
  pub url:             String,
  pub sku:             Option<String>,
  pub price_eur:       f64,
  pub currency:        String,
  pub stock_status:    StockStatus,
  pub observed_at:     DateTime<Utc>,
  pub run_id:          String,
  /// Server-assigned; never changes after creation.
  pub recorded_at:     DateTime<Utc>,
}

/// Input to [`crate::store::EvidenceStore::append_observation`]. Sequence,
/// identity key, and `recorded_at` are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewObservation {
  pub description:  String,
  pub retailer:     String,
  pub url:          String,
  pub sku:          Option<String>,
  pub price_eur:    f64,
  pub currency:     String,
  pub stock_status: StockStatus,
  pub observed_at:  DateTime<Utc>,
  pub run_id:       String,
}

impl NewObservation {
  /// Reject malformed input before anything is persisted.
  pub fn validate(&self) -> Result<()> {
    if self.description.trim().is_empty() {
      return Err(Error::MissingField("description"));
    }
    if self.retailer.trim().is_empty() {
      return Err(Error::MissingField("retailer"));
    }
    if self.url.trim().is_empty() {
      return Err(Error::MissingField("url"));
    }
    if self.run_id.trim().is_empty() {
      return Err(Error::MissingField("run_id"));
    }
    if self.currency.trim().is_empty() {
      return Err(Error::MissingField("currency"));
    }
    if !(self.price_eur > 0.0) {
      return Err(Error::NonPositivePrice(self.price_eur));
    }
    Ok(())
  }
}

// ─── Hypothesis ──────────────────────────────────────────────────────────────

/// Attributes an enrichment source claims about a listing. Every field is
/// optional and untyped text or raw numbers: claims are evidence, and are
/// only coerced into the canonical schema once the resolution engine's
/// exact-match rules accept them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaimedAttributes {
  pub vendor:              Option<String>,
  pub model_name:          Option<String>,
  pub brand_series:        Option<String>,
  pub vram_gb:             Option<u16>,
  pub memory_kind:         Option<String>,
  pub board_partner:       Option<String>,
  pub model_suffix:        Option<String>,
  pub part_number:         Option<String>,
  pub factory_boost_mhz:   Option<u32>,
  pub length_mm:           Option<i32>,
  pub width_slots:         Option<f32>,
  pub height_mm:           Option<i32>,
  pub power_connectors:    Option<String>,
  pub cooling:             Option<String>,
  pub fan_count:           Option<i32>,
  pub displayport_count:   Option<i32>,
  pub displayport_version: Option<String>,
  pub hdmi_count:          Option<i32>,
  pub hdmi_version:        Option<String>,
  pub warranty_years:      Option<i32>,
  pub boost_clock_mhz:     Option<u32>,
  pub tdp_watts:           Option<u32>,
}

/// A stored hypothesis with its provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hypothesis {
  pub hypothesis_id:   HypothesisId,
  pub description:     String,
  pub description_key: String,
  pub source:          String,
  pub run_id:          String,
  pub claims:          ClaimedAttributes,
  pub recorded_at:     DateTime<Utc>,
}

/// Input to [`crate::store::EvidenceStore::append_hypothesis`].
#[derive(Debug, Clone)]
pub struct NewHypothesis {
  pub description: String,
  pub source:      String,
  pub run_id:      String,
  /// When the enrichment source produced this claim set. Defaults to the
  /// append time when absent.
  pub recorded_at: Option<DateTime<Utc>>,
  pub claims:      ClaimedAttributes,
}

impl NewHypothesis {
  pub fn validate(&self) -> Result<()> {
    if self.description.trim().is_empty() {
      return Err(Error::MissingField("description"));
    }
    if self.source.trim().is_empty() {
      return Err(Error::MissingField("source"));
    }
    if self.run_id.trim().is_empty() {
      return Err(Error::MissingField("run_id"));
    }
    Ok(())
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use chrono::Utc;

  use super::*;

  fn observation() -> NewObservation {
    NewObservation {
      description:  "ASUS TUF RTX 5090 OC".into(),
      retailer:     "alternate".into(),
      url:          "https://example.com/p/1".into(),
      sku:          None,
      price_eur:    2199.0,
      currency:     "EUR".into(),
      stock_status: StockStatus::InStock,
      observed_at:  Utc::now(),
      run_id:       "run-1".into(),
    }
  }

  #[test]
  fn valid_observation_passes() {
    assert!(observation().validate().is_ok());
  }

  #[test]
  fn non_positive_price_is_rejected() {
    let mut obs = observation();
    obs.price_eur = 0.0;
    assert!(matches!(
      obs.validate(),
      Err(Error::NonPositivePrice(_))
    ));
  }

  #[test]
  fn blank_identifiers_are_rejected() {
    let mut obs = observation();
    obs.retailer = "  ".into();
    assert!(matches!(
      obs.validate(),
      Err(Error::MissingField("retailer"))
    ));
  }

  #[test]
  fn stock_status_vocabulary_is_closed() {
    assert!(StockStatus::parse("in_stock").is_ok());
    assert!(matches!(
      StockStatus::parse("maybe_later"),
      Err(Error::UnknownStockStatus(_))
    ));
  }

  #[test]
  fn claims_deserialize_with_missing_fields() {
    let claims: ClaimedAttributes =
      serde_json::from_str(r#"{"vendor":"NVIDIA","model_name":"RTX 5090"}"#)
        .unwrap();
    assert_eq!(claims.vendor.as_deref(), Some("NVIDIA"));
    assert_eq!(claims.vram_gb, None);
  }
}
