//! Resolution-run reports — the audit record a batch run leaves behind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why an observation was left unlinked. Deferral is a recoverable state:
/// the observation stays stored and is retried on a later run once better
/// evidence exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeferReason {
  /// No hypothesis exists yet for the description.
  NoHypothesis,
  /// No applicable hypothesis carries the required identity fields.
  MissingIdentity,
  /// The best hypothesis contradicts itself on identity.
  ContradictoryIdentity,
  /// More than one chip matches the identity evidence; fail closed.
  AmbiguousChip,
}

/// Counters for one resolution run. Per-record failures are isolated: one
/// bad record never aborts the rest of a batch, it just shows up here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
  pub scanned:               u64,
  pub linked:                u64,
  pub chips_created:         u64,
  pub variants_created:      u64,
  pub deferred_no_hypothesis: u64,
  pub deferred_missing_identity: u64,
  pub deferred_contradictory: u64,
  pub deferred_ambiguous:    u64,
  pub rejected:              u64,
  pub errors:                u64,
}

impl RunCounts {
  pub fn deferred_total(&self) -> u64 {
    self.deferred_no_hypothesis
      + self.deferred_missing_identity
      + self.deferred_contradictory
      + self.deferred_ambiguous
  }

  pub fn record_deferral(&mut self, reason: DeferReason) {
    match reason {
      DeferReason::NoHypothesis => self.deferred_no_hypothesis += 1,
      DeferReason::MissingIdentity => self.deferred_missing_identity += 1,
      DeferReason::ContradictoryIdentity => self.deferred_contradictory += 1,
      DeferReason::AmbiguousChip => self.deferred_ambiguous += 1,
    }
  }
}

/// The persisted audit record of one resolution run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
  pub run_id:      Uuid,
  pub started_at:  DateTime<Utc>,
  pub finished_at: DateTime<Utc>,
  /// Dry runs decide but never write; they are reported, not recorded.
  pub dry_run:     bool,
  pub counts:      RunCounts,
}
