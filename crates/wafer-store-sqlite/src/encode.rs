//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings. Closed vocabularies are stored
//! as their canonical tokens. Hypothesis claims are stored as compact JSON.

use chrono::{DateTime, Utc};
use wafer_core::{
  chip::{Chip, ComputeUnitKind, MemoryKind, Vendor},
  evidence::{ClaimedAttributes, Hypothesis, Observation, StockStatus},
  variant::{CoolingKind, Variant, VariantDetails},
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339()
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Closed vocabularies ─────────────────────────────────────────────────────

pub fn decode_vendor(s: &str) -> Result<Vendor> {
  Vendor::parse(s).map_err(|e| Error::Decode(e.to_string()))
}

pub fn decode_stock_status(s: &str) -> Result<StockStatus> {
  StockStatus::parse(s).map_err(|e| Error::Decode(e.to_string()))
}

pub fn decode_cooling(s: &str) -> Result<CoolingKind> {
  CoolingKind::parse(s).map_err(|e| Error::Decode(e.to_string()))
}

pub fn decode_memory_kind(s: &str) -> Result<MemoryKind> {
  MemoryKind::parse(s).map_err(|e| Error::Decode(e.to_string()))
}

pub fn decode_compute_unit_kind(s: &str) -> Result<ComputeUnitKind> {
  ComputeUnitKind::parse(s).map_err(|e| Error::Decode(e.to_string()))
}

// ─── Claims ──────────────────────────────────────────────────────────────────

pub fn encode_claims(claims: &ClaimedAttributes) -> Result<String> {
  Ok(serde_json::to_string(claims)?)
}

pub fn decode_claims(s: &str) -> Result<ClaimedAttributes> {
  Ok(serde_json::from_str(s)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from a `gpu_chip` row.
pub struct RawChip {
  pub chip_id:               String,
  pub vendor:                String,
  pub model_key:             String,
  pub model_name:            String,
  pub brand_series:          Option<String>,
  pub code_name:             Option<String>,
  pub architecture:          Option<String>,
  pub compute_units_kind:    Option<String>,
  pub compute_units_count:   Option<u32>,
  pub rt_cores:              Option<u32>,
  pub tensor_cores:          Option<u32>,
  pub base_clock_mhz:        Option<u32>,
  pub boost_clock_mhz:       Option<u32>,
  pub tdp_watts:             Option<u32>,
  pub recommended_psu_watts: Option<u32>,
  pub pcie_generation:       Option<u8>,
  pub pcie_lanes:            Option<u8>,
  pub created_at:            String,
}

impl RawChip {
  pub fn into_chip(self) -> Result<Chip> {
    Ok(Chip {
      chip_id:               self.chip_id,
      vendor:                decode_vendor(&self.vendor)?,
      model_key:             self.model_key,
      model_name:            self.model_name,
      brand_series:          self.brand_series,
      code_name:             self.code_name,
      architecture:          self.architecture,
      compute_units_kind:    self
        .compute_units_kind
        .as_deref()
        .map(decode_compute_unit_kind)
        .transpose()?,
      compute_units_count:   self.compute_units_count,
      rt_cores:              self.rt_cores,
      tensor_cores:          self.tensor_cores,
      base_clock_mhz:        self.base_clock_mhz,
      boost_clock_mhz:       self.boost_clock_mhz,
      tdp_watts:             self.tdp_watts,
      recommended_psu_watts: self.recommended_psu_watts,
      pcie_generation:       self.pcie_generation,
      pcie_lanes:            self.pcie_lanes,
      created_at:            decode_dt(&self.created_at)?,
    })
  }
}

/// Raw values read directly from a `gpu_variant` row.
pub struct RawVariant {
  pub variant_id:          String,
  pub chip_id:             String,
  pub board_partner:       String,
  pub model_suffix:        Option<String>,
  pub part_number:         Option<String>,
  pub factory_boost_mhz:   Option<u32>,
  pub length_mm:           Option<u16>,
  pub width_slots:         Option<f64>,
  pub height_mm:           Option<u16>,
  pub power_connectors:    Option<String>,
  pub cooling:             Option<String>,
  pub fan_count:           Option<u8>,
  pub displayport_count:   Option<u8>,
  pub displayport_version: Option<String>,
  pub hdmi_count:          Option<u8>,
  pub hdmi_version:        Option<String>,
  pub warranty_years:      Option<u8>,
  pub created_at:          String,
}

impl RawVariant {
  pub fn into_variant(self) -> Result<Variant> {
    Ok(Variant {
      variant_id:    self.variant_id,
      chip_id:       self.chip_id,
      board_partner: self.board_partner,
      model_suffix:  self.model_suffix,
      part_number:   self.part_number,
      details:       VariantDetails {
        factory_boost_mhz:   self.factory_boost_mhz,
        length_mm:           self.length_mm,
        width_slots:         self.width_slots.map(|w| w as f32),
        height_mm:           self.height_mm,
        power_connectors:    self.power_connectors,
        cooling:             self
          .cooling
          .as_deref()
          .map(decode_cooling)
          .transpose()?,
        fan_count:           self.fan_count,
        displayport_count:   self.displayport_count,
        displayport_version: self.displayport_version,
        hdmi_count:          self.hdmi_count,
        hdmi_version:        self.hdmi_version,
        warranty_years:      self.warranty_years,
      },
      created_at:    decode_dt(&self.created_at)?,
    })
  }
}

/// Raw values read directly from a `market_observation` row.
pub struct RawObservation {
  pub seq:             i64,
  pub observation_id:  String,
  pub variant_id:      Option<String>,
  pub description:     String,
  pub description_key: String,
  pub retailer:        String,
  pub url:             String,
  pub sku:             Option<String>,
  pub price_eur:       f64,
  pub currency:        String,
  pub stock_status:    String,
  pub observed_at:     String,
  pub run_id:          String,
  pub recorded_at:     String,
}

impl RawObservation {
  pub fn into_observation(self) -> Result<Observation> {
    Ok(Observation {
      seq:             self.seq,
      observation_id:  self.observation_id,
      variant_id:      self.variant_id,
      description:     self.description,
      description_key: self.description_key,
      retailer:        self.retailer,
      url:             self.url,
      sku:             self.sku,
      price_eur:       self.price_eur,
      currency:        self.currency,
      stock_status:    decode_stock_status(&self.stock_status)?,
      observed_at:     decode_dt(&self.observed_at)?,
      run_id:          self.run_id,
      recorded_at:     decode_dt(&self.recorded_at)?,
    })
  }
}

/// Raw values read directly from a `product_hypothesis` row.
pub struct RawHypothesis {
  pub hypothesis_id:   String,
  pub description:     String,
  pub description_key: String,
  pub source:          String,
  pub run_id:          String,
  pub claims_json:     String,
  pub recorded_at:     String,
}

impl RawHypothesis {
  pub fn into_hypothesis(self) -> Result<Hypothesis> {
    Ok(Hypothesis {
      hypothesis_id:   self.hypothesis_id,
      description:     self.description,
      description_key: self.description_key,
      source:          self.source,
      run_id:          self.run_id,
      claims:          decode_claims(&self.claims_json)?,
      recorded_at:     decode_dt(&self.recorded_at)?,
    })
  }
}
