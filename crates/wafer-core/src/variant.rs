//! Variant types — stable physical/commercial configurations of a chip.
//!
//! Variants are never seeded; the resolution engine materializes one the
//! first time evidence unambiguously implies a configuration not yet known
//! for its chip.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  identity::{ChipId, VariantId},
};

// ─── Controlled vocabulary ───────────────────────────────────────────────────

/// Cooling solution of a board. Closed vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoolingKind {
  Air,
  Liquid,
  Hybrid,
}

impl CoolingKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Air => "Air",
      Self::Liquid => "Liquid",
      Self::Hybrid => "Hybrid",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s.trim() {
      "Air" => Ok(Self::Air),
      "Liquid" => Ok(Self::Liquid),
      "Hybrid" => Ok(Self::Hybrid),
      _ => Err(Error::UnknownCoolingKind(s.to_owned())),
    }
  }
}

// ─── Variant ─────────────────────────────────────────────────────────────────

/// A board-partner configuration of exactly one chip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variant {
  pub variant_id:    VariantId,
  pub chip_id:       ChipId,
  pub board_partner: String,
  pub model_suffix:  Option<String>,
  pub part_number:   Option<String>,
  pub details:       VariantDetails,
  pub created_at:    DateTime<Utc>,
}

/// Descriptive (non-identity) attributes of a variant. Dimensions and counts
/// arrive pre-sanitized from the resolution engine; the catalog stores them
/// as given.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariantDetails {
  pub factory_boost_mhz:   Option<u32>,
  pub length_mm:           Option<u16>,
  pub width_slots:         Option<f32>,
  pub height_mm:           Option<u16>,
  pub power_connectors:    Option<String>,
  pub cooling:             Option<CoolingKind>,
  pub fan_count:           Option<u8>,
  pub displayport_count:   Option<u8>,
  pub displayport_version: Option<String>,
  pub hdmi_count:          Option<u8>,
  pub hdmi_version:        Option<String>,
  pub warranty_years:      Option<u8>,
}

// ─── NewVariant ──────────────────────────────────────────────────────────────

/// Input to [`crate::store::Catalog::create_variant`]. The store derives
/// `variant_id` from `identity`; it is not accepted from callers.
#[derive(Debug, Clone)]
pub struct NewVariant {
  pub chip_id:  ChipId,
  pub identity: crate::identity::VariantIdentity,
  pub details:  VariantDetails,
}
