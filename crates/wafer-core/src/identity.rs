//! Synthetic identity keys for canonical and evidence records.
//!
//! All keys are opaque prefixed SHA-256 digests over normalized identity
//! parts, stable for the lifetime of a record. They are deterministic so that
//! re-resolving the same evidence derives the same key, which is what makes
//! creation idempotent. Keys carry no meaning beyond equality.

use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

use crate::chip::Vendor;

pub type ChipId = String;
pub type VariantId = String;
pub type ObservationId = String;
pub type HypothesisId = String;

// ─── Stable hashing ──────────────────────────────────────────────────────────

/// Hash normalized parts into a prefixed synthetic key.
///
/// Missing parts hash as the empty string so that `Some("")` and `None` are
/// indistinguishable, matching how identity fields round-trip through text
/// columns.
fn stable_id(prefix: &str, parts: &[Option<&str>]) -> String {
  let joined = parts
    .iter()
    .map(|p| p.map(|s| s.trim().to_lowercase()).unwrap_or_default())
    .collect::<Vec<_>>()
    .join("|");

  let mut hasher = Sha256::new();
  hasher.update(joined.as_bytes());
  format!("{prefix}_{}", hex::encode(hasher.finalize()))
}

// ─── Canonical model key ─────────────────────────────────────────────────────

static MODEL_TOKEN_RE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"\b(nvidia|amd|geforce|radeon|rtx|rx)\b").unwrap());

/// Normalize a model name into its canonical identity key.
///
/// Brand tokens are stripped only at word boundaries *before* digit/letter
/// runs are split apart, so `"RTX5090"` and `"RTX 5090"` deliberately produce
/// different keys: identity matching is exact, never fuzzy.
pub fn canonical_model_key(model_name: &str) -> String {
  let lowered = model_name.to_lowercase();
  let stripped = MODEL_TOKEN_RE.replace_all(&lowered, " ");

  // Split runs like "5070ti" into "5070 ti".
  let mut split = String::with_capacity(stripped.len() + 8);
  let mut prev: Option<char> = None;
  for ch in stripped.chars() {
    if let Some(p) = prev {
      let digit_to_alpha = p.is_ascii_digit() && ch.is_ascii_alphabetic();
      let alpha_to_digit = p.is_ascii_alphabetic() && ch.is_ascii_digit();
      if digit_to_alpha || alpha_to_digit {
        split.push(' ');
      }
    }
    split.push(ch);
    prev = Some(ch);
  }

  split.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Canonical model key qualified with VRAM capacity when known.
///
/// Returns `None` when the model name normalizes to nothing.
pub fn model_key_with_vram(
  model_name: &str,
  vram_gb: Option<u16>,
) -> Option<String> {
  let key = canonical_model_key(model_name);
  if key.is_empty() {
    return None;
  }
  match vram_gb {
    Some(vram) if !key.contains("gb") => Some(format!("{key} {vram} gb")),
    _ => Some(key),
  }
}

// ─── Key constructors ────────────────────────────────────────────────────────

/// Identity key of a chip: vendor + canonical model key.
pub fn chip_id(vendor: Vendor, model_key: &str) -> ChipId {
  stable_id("chip", &[Some(vendor.as_str()), Some(model_key)])
}

/// The full identity of a variant — the physical-configuration fingerprint
/// the resolution engine matches on.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantIdentity {
  pub vendor:        Vendor,
  pub model_key:     String,
  pub vram_gb:       Option<u16>,
  pub board_partner: String,
  pub model_suffix:  Option<String>,
  pub part_number:   Option<String>,
}

impl VariantIdentity {
  pub fn variant_id(&self) -> VariantId {
    let vram = self.vram_gb.map(|v| v.to_string());
    stable_id("var", &[
      Some(self.vendor.as_str()),
      Some(&self.model_key),
      vram.as_deref(),
      Some(&self.board_partner),
      self.model_suffix.as_deref(),
      self.part_number.as_deref(),
    ])
  }

  pub fn chip_id(&self) -> ChipId {
    chip_id(self.vendor, &self.model_key)
  }
}

/// Identity of an observation: its full lineage tuple. Re-appending the
/// identical tuple is a replay, not a new sighting.
pub fn observation_id(
  retailer: &str,
  url: &str,
  observed_at: &str,
  run_id: &str,
) -> ObservationId {
  stable_id("obs", &[
    Some(retailer),
    Some(url),
    Some(observed_at),
    Some(run_id),
  ])
}

/// Identity of a hypothesis: what it claims, about which description, from
/// which source and run.
pub fn hypothesis_id(
  description_key: &str,
  source: &str,
  run_id: &str,
  claims_json: &str,
) -> HypothesisId {
  stable_id("hyp", &[
    Some(description_key),
    Some(source),
    Some(run_id),
    Some(claims_json),
  ])
}

// ─── Tests ───────────────────────────────────────────────────────────────────
