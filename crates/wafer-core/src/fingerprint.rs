//! Weak, non-canonical fingerprints over folded listing descriptions.
//!
//! A fingerprint exists only to skip redundant enrichment calls. It carries
//! no domain meaning and must never be used as a chip or variant key.

use sha2::{Digest, Sha256};

use crate::normalize;

pub type Fingerprint = String;

/// Compute the fingerprint of a description. Pure and stable: the same input
/// always yields the same key across runs.
pub fn fingerprint(description: &str) -> Fingerprint {
  let folded = normalize::fold(description);
  let mut hasher = Sha256::new();
  hasher.update(folded.as_bytes());
  format!("fp_{}", hex::encode(hasher.finalize()))
}
