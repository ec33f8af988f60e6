//! Chip types — the canonical silicon designs of the wafer catalog.
//!
//! A chip's identity (vendor + canonical model key) is assigned once at
//! creation and never changes. Descriptive attributes may be corrected in
//! place as better evidence arrives; identity never merges or splits
//! automatically.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, identity::ChipId};

// ─── Controlled vocabularies ─────────────────────────────────────────────────

/// Silicon vendor. A closed vocabulary; unrecognized values are rejected at
/// the write boundary, never coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Vendor {
  Nvidia,
  Amd,
  Intel,
}

impl Vendor {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Nvidia => "NVIDIA",
      Self::Amd => "AMD",
      Self::Intel => "INTEL",
    }
  }

  /// Parse a vendor token, case-insensitively.
  pub fn parse(s: &str) -> Result<Self> {
    match s.trim().to_uppercase().as_str() {
      "NVIDIA" => Ok(Self::Nvidia),
      "AMD" => Ok(Self::Amd),
      "INTEL" => Ok(Self::Intel),
      _ => Err(Error::UnknownVendor(s.to_owned())),
    }
  }
}

/// The kind of compute unit a chip is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComputeUnitKind {
  /// NVIDIA streaming multiprocessor.
  #[serde(rename = "SM")]
  StreamingMultiprocessor,
  /// AMD compute unit.
  #[serde(rename = "CU")]
  ComputeUnit,
  /// Intel Xe core.
  #[serde(rename = "Xe")]
  XeCore,
}

impl ComputeUnitKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::StreamingMultiprocessor => "SM",
      Self::ComputeUnit => "CU",
      Self::XeCore => "Xe",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s.trim() {
      "SM" => Ok(Self::StreamingMultiprocessor),
      "CU" => Ok(Self::ComputeUnit),
      "Xe" => Ok(Self::XeCore),
      _ => Err(Error::UnknownComputeUnitKind(s.to_owned())),
    }
  }
}

/// Memory standard of a chip's VRAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MemoryKind {
  Gddr6,
  Gddr6x,
  Gddr7,
}

impl MemoryKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Gddr6 => "GDDR6",
      Self::Gddr6x => "GDDR6X",
      Self::Gddr7 => "GDDR7",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s.trim().to_uppercase().as_str() {
      "GDDR6" => Ok(Self::Gddr6),
      "GDDR6X" => Ok(Self::Gddr6x),
      "GDDR7" => Ok(Self::Gddr7),
      _ => Err(Error::UnknownMemoryKind(s.to_owned())),
    }
  }
}

// ─── Chip ────────────────────────────────────────────────────────────────────

/// A canonical silicon design. Identity fields (`vendor`, `model_key`) are
/// write-once; everything else is descriptive and correctable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chip {
  pub chip_id:               ChipId,
  pub vendor:                Vendor,
  /// Canonical identity key derived from `model_name` (and VRAM, when known).
  pub model_key:             String,
  pub model_name:            String,
  pub brand_series:          Option<String>,
  pub code_name:             Option<String>,
  pub architecture:          Option<String>,
  pub compute_units_kind:    Option<ComputeUnitKind>,
  pub compute_units_count:   Option<u32>,
  pub rt_cores:              Option<u32>,
  pub tensor_cores:          Option<u32>,
  pub base_clock_mhz:        Option<u32>,
  pub boost_clock_mhz:       Option<u32>,
  pub tdp_watts:             Option<u32>,
  pub recommended_psu_watts: Option<u32>,
  pub pcie_generation:       Option<u8>,
  pub pcie_lanes:            Option<u8>,
  pub created_at:            DateTime<Utc>,
}

/// VRAM satellite record, 1:1 with its owning chip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChipMemory {
  pub vram_gb:        Option<u16>,
  pub kind:           Option<MemoryKind>,
  pub bus_width_bits: Option<u16>,
  pub speed_gbps:     Option<f64>,
  pub bandwidth_gbs:  Option<f64>,
}

/// Capability satellite record, 1:1 with its owning chip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChipFeatures {
  pub raytracing_hardware:     Option<bool>,
  pub raytracing_api:          Option<String>,
  pub cuda_compute_capability: Option<String>,
  pub dlss_version:            Option<String>,
  pub nvenc_generation:        Option<String>,
  pub nvidia_reflex:           Option<bool>,
  pub fsr_support:             Option<String>,
  pub fluid_motion_frames:     Option<bool>,
  pub hypr_rx:                 Option<bool>,
  pub xess_support:            Option<String>,
  pub av1_encode:              Option<bool>,
  pub av1_decode:              Option<bool>,
  pub resizable_bar:           Option<bool>,
}

// ─── NewChip ─────────────────────────────────────────────────────────────────

/// Input to [`crate::store::Catalog::create_chip`]. The store derives
/// `chip_id` and `model_key` from the identity fields; they are not accepted
/// from callers.
#[derive(Debug, Clone)]
pub struct NewChip {
  pub vendor:                Vendor,
  pub model_name:            String,
  pub brand_series:          Option<String>,
  pub code_name:             Option<String>,
  pub architecture:          Option<String>,
  pub compute_units_kind:    Option<ComputeUnitKind>,
  pub compute_units_count:   Option<u32>,
  pub rt_cores:              Option<u32>,
  pub tensor_cores:          Option<u32>,
  pub base_clock_mhz:        Option<u32>,
  pub boost_clock_mhz:       Option<u32>,
  pub tdp_watts:             Option<u32>,
  pub recommended_psu_watts: Option<u32>,
  pub pcie_generation:       Option<u8>,
  pub pcie_lanes:            Option<u8>,
  pub memory:                ChipMemory,
  pub features:              ChipFeatures,
}

impl NewChip {
  /// Convenience constructor with all descriptive fields empty.
  pub fn new(vendor: Vendor, model_name: impl Into<String>) -> Self {
    Self {
      vendor,
      model_name: model_name.into(),
      brand_series: None,
      code_name: None,
      architecture: None,
      compute_units_kind: None,
      compute_units_count: None,
      rt_cores: None,
      tensor_cores: None,
      base_clock_mhz: None,
      boost_clock_mhz: None,
      tdp_watts: None,
      recommended_psu_watts: None,
      pcie_generation: None,
      pcie_lanes: None,
      memory: ChipMemory::default(),
      features: ChipFeatures::default(),
    }
  }
}

// ─── Corrections ─────────────────────────────────────────────────────────────

/// Descriptive corrections applied in place by
/// [`crate::store::Catalog::update_chip_details`]. Identity fields are
/// deliberately absent: they cannot be corrected, only curated through an
/// explicit audited merge.
#[derive(Debug, Clone, Default)]
pub struct ChipCorrection {
  pub brand_series:          Option<String>,
  pub code_name:             Option<String>,
  pub architecture:          Option<String>,
  pub compute_units_kind:    Option<ComputeUnitKind>,
  pub compute_units_count:   Option<u32>,
  pub rt_cores:              Option<u32>,
  pub tensor_cores:          Option<u32>,
  pub base_clock_mhz:        Option<u32>,
  pub boost_clock_mhz:       Option<u32>,
  pub tdp_watts:             Option<u32>,
  pub recommended_psu_watts: Option<u32>,
  pub pcie_generation:       Option<u8>,
  pub pcie_lanes:            Option<u8>,
}

impl ChipCorrection {
  pub fn is_empty(&self) -> bool {
    self.brand_series.is_none()
      && self.code_name.is_none()
      && self.architecture.is_none()
      && self.compute_units_kind.is_none()
      && self.compute_units_count.is_none()
      && self.rt_cores.is_none()
      && self.tensor_cores.is_none()
      && self.base_clock_mhz.is_none()
      && self.boost_clock_mhz.is_none()
      && self.tdp_watts.is_none()
      && self.recommended_psu_watts.is_none()
      && self.pcie_generation.is_none()
      && self.pcie_lanes.is_none()
  }
}
