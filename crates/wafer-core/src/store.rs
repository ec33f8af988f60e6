//! Store traits and supporting result types.
//!
//! The traits are implemented by storage backends (e.g. `wafer-store-sqlite`).
//! Higher layers (`wafer-resolve`, `wafer-cli`) depend on these abstractions,
//! not on any concrete backend. The catalog is the only mutable shared
//! resource; the evidence store and fingerprint index are append/lookup-only.
//!
//! All methods return `Send` futures so the traits can be used in
//! multi-threaded async runtimes.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  chip::{Chip, ChipCorrection, ChipFeatures, ChipMemory, NewChip, Vendor},
  evidence::{
    Hypothesis, NewHypothesis, NewObservation, Observation, StockStatus,
  },
  identity::{ChipId, ObservationId, VariantId, VariantIdentity},
  run::RunReport,
  variant::{NewVariant, Variant},
};

// ─── Write outcomes ──────────────────────────────────────────────────────────

/// Result of a compare-and-create write. Identity creation races resolve to
/// first-writer-wins: the loser gets `Existing` back and proceeds with it.
#[derive(Debug, Clone)]
pub enum Upsert<T> {
  Created(T),
  Existing(T),
}

impl<T> Upsert<T> {
  pub fn was_created(&self) -> bool {
    matches!(self, Self::Created(_))
  }

  pub fn into_inner(self) -> T {
    match self {
      Self::Created(t) | Self::Existing(t) => t,
    }
  }

  pub fn get(&self) -> &T {
    match self {
      Self::Created(t) | Self::Existing(t) => t,
    }
  }
}

/// Result of an append. Re-appending a record with an identical identity
/// tuple is a replay: reported, never duplicated.
#[derive(Debug, Clone)]
pub enum Appended<T> {
  Inserted(T),
  Replayed(T),
}

impl<T> Appended<T> {
  pub fn was_inserted(&self) -> bool {
    matches!(self, Self::Inserted(_))
  }

  pub fn into_inner(self) -> T {
    match self {
      Self::Inserted(t) | Self::Replayed(t) => t,
    }
  }
}

/// Result of the one-time observation→variant linkage write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
  Linked,
  /// The observation already carries a linkage; it is never overwritten.
  AlreadyLinked(VariantId),
  UnknownObservation,
  UnknownVariant,
}

/// A chip candidate returned by identity lookup, with the VRAM needed for
/// disambiguation.
#[derive(Debug, Clone)]
pub struct ChipCandidate {
  pub chip_id: ChipId,
  pub vram_gb: Option<u16>,
}

// ─── Base trait ──────────────────────────────────────────────────────────────

/// Shared error type across a backend's trait implementations.
pub trait Store: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;
}

// ─── Catalog ─────────────────────────────────────────────────────────────────

/// The canonical catalog: chip / memory / features / variant records with
/// integrity enforcement. Identity fields are write-once after creation;
/// deleting a chip cascades to its satellites and variants.
pub trait Catalog: Store {
  /// Compare-and-create a chip (with its memory and features satellites).
  /// Returns the existing row when the identity key is already taken.
  fn create_chip(
    &self,
    new: NewChip,
  ) -> impl Future<Output = Result<Upsert<Chip>, Self::Error>> + Send + '_;

  /// Compare-and-create a variant under an existing chip.
  fn create_variant(
    &self,
    new: NewVariant,
  ) -> impl Future<Output = Result<Upsert<Variant>, Self::Error>> + Send + '_;

  fn get_chip<'a>(
    &'a self,
    chip_id: &'a str,
  ) -> impl Future<Output = Result<Option<Chip>, Self::Error>> + Send + 'a;

  fn get_variant<'a>(
    &'a self,
    variant_id: &'a str,
  ) -> impl Future<Output = Result<Option<Variant>, Self::Error>> + Send + 'a;

  /// Exact-identity lookup: all chips with this vendor and canonical model
  /// key, with their VRAM for disambiguation. Never fuzzy.
  fn find_chips_by_identity<'a>(
    &'a self,
    vendor: Vendor,
    model_key: &'a str,
  ) -> impl Future<Output = Result<Vec<ChipCandidate>, Self::Error>> + Send + 'a;

  /// Exact-identity lookup of a variant by its physical-configuration
  /// fingerprint.
  fn find_variant_by_identity<'a>(
    &'a self,
    identity: &'a VariantIdentity,
  ) -> impl Future<Output = Result<Option<Variant>, Self::Error>> + Send + 'a;

  fn chip_memory<'a>(
    &'a self,
    chip_id: &'a str,
  ) -> impl Future<Output = Result<Option<ChipMemory>, Self::Error>> + Send + 'a;

  fn chip_features<'a>(
    &'a self,
    chip_id: &'a str,
  ) -> impl Future<Output = Result<Option<ChipFeatures>, Self::Error>> + Send + 'a;

  fn list_chips(
    &self,
  ) -> impl Future<Output = Result<Vec<Chip>, Self::Error>> + Send + '_;

  fn list_variants<'a>(
    &'a self,
    chip_id: &'a str,
  ) -> impl Future<Output = Result<Vec<Variant>, Self::Error>> + Send + 'a;

  /// Correct descriptive fields in place. Identity fields are untouchable
  /// through this path.
  fn update_chip_details<'a>(
    &'a self,
    chip_id: &'a str,
    correction: ChipCorrection,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Explicit curation removal. Cascades to memory, features, variants, and
  /// the observations linked to those variants. Never called by the
  /// resolution engine.
  fn remove_chip<'a>(
    &'a self,
    chip_id: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;
}

// ─── Evidence store ──────────────────────────────────────────────────────────

/// Durable, append-only persistence of observations and hypotheses with
/// lineage. No update or delete operations exist for either entity; the only
/// post-insert write is the engine's one-time variant linkage.
pub trait EvidenceStore: Store {
  fn append_observation(
    &self,
    new: NewObservation,
  ) -> impl Future<Output = Result<Appended<Observation>, Self::Error>> + Send + '_;

  fn append_hypothesis(
    &self,
    new: NewHypothesis,
  ) -> impl Future<Output = Result<Appended<Hypothesis>, Self::Error>> + Send + '_;

  fn get_observation<'a>(
    &'a self,
    observation_id: &'a str,
  ) -> impl Future<Output = Result<Option<Observation>, Self::Error>> + Send + 'a;

  /// All observations appended after the given run's last observation, in
  /// append order.
  fn observations_since<'a>(
    &'a self,
    run_id: &'a str,
  ) -> impl Future<Output = Result<Vec<Observation>, Self::Error>> + Send + 'a;

  /// Observations not yet linked to a variant, in append order.
  fn unresolved_observations(
    &self,
    limit: Option<usize>,
  ) -> impl Future<Output = Result<Vec<Observation>, Self::Error>> + Send + '_;

  /// All hypotheses stored for a folded description, in stable order.
  fn hypotheses_for<'a>(
    &'a self,
    description_key: &'a str,
  ) -> impl Future<Output = Result<Vec<Hypothesis>, Self::Error>> + Send + 'a;

  /// Set an observation's variant linkage, exactly once. Linking to a
  /// missing variant or re-linking an already-linked observation is reported
  /// in the outcome, not silently applied.
  fn link_observation<'a>(
    &'a self,
    observation_id: &'a ObservationId,
    variant_id: &'a VariantId,
  ) -> impl Future<Output = Result<LinkOutcome, Self::Error>> + Send + 'a;

  /// Persist a run's audit record.
  fn record_run<'a>(
    &'a self,
    report: &'a RunReport,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}

// ─── Fingerprint index ───────────────────────────────────────────────────────

/// The enrichment gate. `has_seen`/`mark_seen` are its only operations; it
/// never writes to the catalog.
pub trait FingerprintIndex: Store {
  fn has_seen<'a>(
    &'a self,
    fingerprint: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Record a fingerprint. Replays keep the first run id.
  fn mark_seen<'a>(
    &'a self,
    fingerprint: &'a str,
    run_id: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}

// ─── Derived views ───────────────────────────────────────────────────────────

/// The newest observation for one (variant, retailer) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestPrice {
  pub variant_id:     VariantId,
  pub retailer:       String,
  pub observation_id: ObservationId,
  pub price_eur:      f64,
  pub currency:       String,
  pub stock_status:   StockStatus,
  pub observed_at:    DateTime<Utc>,
  pub url:            String,
}

/// Value metrics over the latest-price projection, restricted to listings
/// purchasable now.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueMetric {
  pub variant_id:      VariantId,
  pub chip_id:         ChipId,
  pub vendor:          Vendor,
  pub model_name:      String,
  pub board_partner:   String,
  pub best_price_eur:  f64,
  pub best_retailer:   String,
  pub vram_gb:         Option<u16>,
  pub eur_per_vram_gb: Option<f64>,
}

/// Stateless projections over the catalog and evidence store. Any view can
/// be dropped and recomputed from source data with identical results;
/// determinism is the only contract here.
pub trait DerivedViews: Store {
  /// Latest observation per (variant, retailer), linked observations only,
  /// in stable order.
  fn latest_prices(
    &self,
  ) -> impl Future<Output = Result<Vec<LatestPrice>, Self::Error>> + Send + '_;

  /// Per-variant value metrics over the latest-price projection.
  fn value_metrics(
    &self,
  ) -> impl Future<Output = Result<Vec<ValueMetric>, Self::Error>> + Send + '_;
}
