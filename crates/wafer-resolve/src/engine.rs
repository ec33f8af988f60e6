//! The deterministic evidence→variant resolution algorithm.
//!
//! Per observation: rank the stored hypotheses for its description, derive
//! identity through two independent attempts (lexical hints from the
//! description, claimed attributes from the hypothesis), match the catalog
//! by exact identity, create chip/variant records when nothing matches, and
//! set the observation's one-time variant linkage. Ambiguity fails closed;
//! missing identity defers; per-record failures never abort a batch.

use chrono::Utc;
use uuid::Uuid;
use wafer_core::{
  chip::{ChipCorrection, ChipMemory, MemoryKind, NewChip, Vendor},
  evidence::{ClaimedAttributes, Hypothesis, Observation},
  identity::{ChipId, VariantId, VariantIdentity, model_key_with_vram},
  normalize::{self, NormalizedListing},
  run::{DeferReason, RunCounts, RunReport},
  store::{Catalog, ChipCandidate, EvidenceStore, LinkOutcome},
  variant::{CoolingKind, NewVariant, VariantDetails},
};

use crate::rank::RankingPolicy;

// ─── Options and outcomes ────────────────────────────────────────────────────

/// Options for one resolution run.
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
  /// Process at most this many pending observations.
  pub limit:   Option<usize>,
  /// Decide only: no catalog writes, no linkage, no run audit row.
  pub dry_run: bool,
}

/// What resolution decided for one observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
  Linked {
    variant_id:      VariantId,
    chip_created:    bool,
    variant_created: bool,
  },
  Deferred(DeferReason),
  /// Integrity failure for this single record; the run continues.
  Rejected { detail: String },
}

// ─── Matching internals ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MatchState {
  Matched(ChipId),
  Ambiguous,
  NoMatch,
  Missing,
}

/// One identity-match attempt with the fields it was derived from.
struct ChipMatch {
  state:     MatchState,
  vendor:    Option<Vendor>,
  model_key: Option<String>,
  vram_gb:   Option<u16>,
}

/// Pick a chip from exact-key candidates, disambiguating by VRAM.
/// More than one survivor is ambiguous and must fail closed, never guess.
pub(crate) fn select_chip(
  candidates: &[ChipCandidate],
  vram_gb: Option<u16>,
) -> MatchState {
  if candidates.is_empty() {
    return MatchState::NoMatch;
  }
  let Some(vram) = vram_gb else {
    return if candidates.len() == 1 {
      MatchState::Matched(candidates[0].chip_id.clone())
    } else {
      MatchState::Ambiguous
    };
  };
  let filtered: Vec<&ChipCandidate> = candidates
    .iter()
    .filter(|c| c.vram_gb == Some(vram))
    .collect();
  match filtered.as_slice() {
    [single] => MatchState::Matched(single.chip_id.clone()),
    [] => MatchState::NoMatch,
    _ => MatchState::Ambiguous,
  }
}

enum ChipRef {
  Existing(ChipId),
  Create(Box<NewChip>),
}

struct Plan {
  chip:        ChipRef,
  identity:    VariantIdentity,
  details:     VariantDetails,
  /// Descriptive values the accepted hypothesis can contribute to an
  /// existing chip's gaps.
  corrections: ChipCorrection,
}

enum Derivation {
  Plan(Box<Plan>),
  Defer(DeferReason),
}

// ─── Claim sanitation ────────────────────────────────────────────────────────

fn clean(value: &Option<String>) -> Option<String> {
  value
    .as_deref()
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(str::to_owned)
}

fn positive_u16(value: Option<i32>) -> Option<u16> {
  value.filter(|v| *v > 0).and_then(|v| u16::try_from(v).ok())
}

fn non_negative_u8(value: Option<i32>) -> Option<u8> {
  value.filter(|v| *v >= 0).and_then(|v| u8::try_from(v).ok())
}

/// Claimed physical details, sanitized: impossible dimensions and
/// out-of-vocabulary cooling claims are dropped, not stored.
fn sanitize_details(claims: &ClaimedAttributes) -> VariantDetails {
  VariantDetails {
    factory_boost_mhz:   claims.factory_boost_mhz,
    length_mm:           positive_u16(claims.length_mm),
    width_slots:         claims
      .width_slots
      .filter(|w| (2.0..=4.0).contains(w)),
    height_mm:           positive_u16(claims.height_mm),
    power_connectors:    clean(&claims.power_connectors),
    cooling:             clean(&claims.cooling)
      .and_then(|c| CoolingKind::parse(&c).ok()),
    fan_count:           non_negative_u8(claims.fan_count),
    displayport_count:   non_negative_u8(claims.displayport_count),
    displayport_version: clean(&claims.displayport_version),
    hdmi_count:          non_negative_u8(claims.hdmi_count),
    hdmi_version:        clean(&claims.hdmi_version),
    warranty_years:      non_negative_u8(claims.warranty_years),
  }
}

fn correction_candidates(
  claims: &ClaimedAttributes,
  hints: &NormalizedListing,
) -> ChipCorrection {
  ChipCorrection {
    brand_series: clean(&claims.brand_series).or_else(|| hints.series.clone()),
    boost_clock_mhz: claims.boost_clock_mhz,
    tdp_watts: claims.tdp_watts,
    ..Default::default()
  }
}

/// Keep only corrections for fields the chip does not know yet. Better
/// evidence fills gaps; it never overwrites an established value.
fn gap_fill(
  chip: &wafer_core::chip::Chip,
  candidates: &ChipCorrection,
) -> ChipCorrection {
  ChipCorrection {
    brand_series: chip
      .brand_series
      .is_none()
      .then(|| candidates.brand_series.clone())
      .flatten(),
    boost_clock_mhz: chip
      .boost_clock_mhz
      .is_none()
      .then_some(candidates.boost_clock_mhz)
      .flatten(),
    tdp_watts: chip
      .tdp_watts
      .is_none()
      .then_some(candidates.tdp_watts)
      .flatten(),
    ..Default::default()
  }
}

// ─── Resolver ────────────────────────────────────────────────────────────────

/// The resolution engine, generic over its store. All identity-creation
/// writes go through the catalog's compare-and-create operations, which is
/// where the uniqueness guarantee lives.
pub struct Resolver<S> {
  store:  S,
  policy: RankingPolicy,
}

impl<S> Resolver<S>
where
  S: Catalog + EvidenceStore,
{
  pub fn new(store: S, policy: RankingPolicy) -> Self {
    Self { store, policy }
  }

  pub fn store(&self) -> &S {
    &self.store
  }

  /// Resolve all pending (unlinked) observations and report what happened.
  pub async fn resolve_pending(
    &self,
    options: &ResolveOptions,
  ) -> Result<RunReport, S::Error> {
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();
    let pending = self.store.unresolved_observations(options.limit).await?;

    let mut counts = RunCounts::default();
    for observation in &pending {
      counts.scanned += 1;
      match self.resolve_observation(observation, options.dry_run).await {
        Ok(Outcome::Linked {
          variant_id,
          chip_created,
          variant_created,
        }) => {
          counts.linked += 1;
          if chip_created {
            counts.chips_created += 1;
          }
          if variant_created {
            counts.variants_created += 1;
          }
          tracing::debug!(
            observation = %observation.observation_id,
            variant = %variant_id,
            chip_created,
            variant_created,
            "observation linked"
          );
        }
        Ok(Outcome::Deferred(reason)) => {
          counts.record_deferral(reason);
          tracing::debug!(
            observation = %observation.observation_id,
            ?reason,
            "resolution deferred"
          );
        }
        Ok(Outcome::Rejected { detail }) => {
          counts.rejected += 1;
          tracing::warn!(
            observation = %observation.observation_id,
            detail = %detail,
            "observation rejected"
          );
        }
        Err(error) => {
          counts.errors += 1;
          tracing::warn!(
            observation = %observation.observation_id,
            error = %error,
            "resolution failed for observation"
          );
        }
      }
    }

    let report = RunReport {
      run_id,
      started_at,
      finished_at: Utc::now(),
      dry_run: options.dry_run,
      counts,
    };

    if !options.dry_run {
      self.store.record_run(&report).await?;
    }

    tracing::info!(
      run = %report.run_id,
      dry_run = report.dry_run,
      scanned = report.counts.scanned,
      linked = report.counts.linked,
      chips_created = report.counts.chips_created,
      variants_created = report.counts.variants_created,
      deferred = report.counts.deferred_total(),
      rejected = report.counts.rejected,
      errors = report.counts.errors,
      "resolution run complete"
    );

    Ok(report)
  }

  /// Resolve one observation against the current catalog.
  pub async fn resolve_observation(
    &self,
    observation: &Observation,
    dry_run: bool,
  ) -> Result<Outcome, S::Error> {
    let hypotheses = self
      .store
      .hypotheses_for(&observation.description_key)
      .await?;
    if hypotheses.is_empty() {
      return Ok(Outcome::Deferred(DeferReason::NoHypothesis));
    }

    let hints = normalize::normalize(&observation.description);

    let mut first_block: Option<DeferReason> = None;
    for hypothesis in self.policy.ranked(hypotheses) {
      match self.derive_plan(&hints, &hypothesis).await? {
        Derivation::Plan(plan) => {
          if dry_run {
            return self.preview(&plan).await;
          }
          return self.commit(observation, *plan).await;
        }
        // Ambiguity fails closed immediately; a lower-ranked hypothesis
        // must not override it.
        Derivation::Defer(DeferReason::AmbiguousChip) => {
          return Ok(Outcome::Deferred(DeferReason::AmbiguousChip));
        }
        Derivation::Defer(reason) => {
          first_block.get_or_insert(reason);
        }
      }
    }

    Ok(Outcome::Deferred(
      first_block.unwrap_or(DeferReason::MissingIdentity),
    ))
  }

  /// Exact chip match for one (vendor, model, VRAM) derivation.
  async fn match_chip(
    &self,
    vendor: Option<Vendor>,
    model_name: Option<&str>,
    vram_gb: Option<u16>,
  ) -> Result<ChipMatch, S::Error> {
    let (Some(vendor_value), Some(model)) = (vendor, model_name) else {
      return Ok(ChipMatch {
        state: MatchState::Missing,
        vendor,
        model_key: None,
        vram_gb,
      });
    };
    let Some(model_key) = model_key_with_vram(model, vram_gb) else {
      return Ok(ChipMatch {
        state: MatchState::Missing,
        vendor,
        model_key: None,
        vram_gb,
      });
    };

    let candidates = self
      .store
      .find_chips_by_identity(vendor_value, &model_key)
      .await?;

    Ok(ChipMatch {
      state: select_chip(&candidates, vram_gb),
      vendor,
      model_key: Some(model_key),
      vram_gb,
    })
  }

  /// Derive a catalog plan from one hypothesis, or the reason it is
  /// inapplicable.
  async fn derive_plan(
    &self,
    hints: &NormalizedListing,
    hypothesis: &Hypothesis,
  ) -> Result<Derivation, S::Error> {
    let claims = &hypothesis.claims;

    let claimed_vendor =
      clean(&claims.vendor).and_then(|v| Vendor::parse(&v).ok());
    let claimed_model = clean(&claims.model_name);

    // A hypothesis that contradicts itself on identity is unusable.
    if let (Some(vendor), Some(model)) =
      (claimed_vendor, claimed_model.as_deref())
    {
      if let Some(implied) = normalize::normalize(model).vendor {
        if implied != vendor {
          return Ok(Derivation::Defer(DeferReason::ContradictoryIdentity));
        }
      }
    }

    let Some(board_partner) = hints
      .board_partner
      .clone()
      .or_else(|| clean(&claims.board_partner))
    else {
      return Ok(Derivation::Defer(DeferReason::MissingIdentity));
    };

    // Two independent derivations; the lexical one wins when it lands.
    let lexical = self
      .match_chip(hints.vendor, hints.model_name.as_deref(), hints.vram_gb)
      .await?;
    let claimed = self
      .match_chip(claimed_vendor, claimed_model.as_deref(), claims.vram_gb)
      .await?;
    let chosen = if matches!(lexical.state, MatchState::Matched(_)) {
      lexical
    } else {
      claimed
    };

    let model_suffix =
      clean(&claims.model_suffix).or_else(|| hints.model_suffix.clone());
    let part_number = clean(&claims.part_number);
    let details = sanitize_details(claims);
    let corrections = correction_candidates(claims, hints);

    match chosen.state {
      MatchState::Matched(chip_id) => {
        let (Some(vendor), Some(model_key)) = (chosen.vendor, chosen.model_key)
        else {
          return Ok(Derivation::Defer(DeferReason::MissingIdentity));
        };
        Ok(Derivation::Plan(Box::new(Plan {
          chip: ChipRef::Existing(chip_id),
          identity: VariantIdentity {
            vendor,
            model_key,
            vram_gb: chosen.vram_gb,
            board_partner,
            model_suffix,
            part_number,
          },
          details,
          corrections,
        })))
      }

      MatchState::Ambiguous => {
        Ok(Derivation::Defer(DeferReason::AmbiguousChip))
      }

      MatchState::NoMatch | MatchState::Missing => {
        let Some(vendor) = claimed_vendor.or(hints.vendor) else {
          return Ok(Derivation::Defer(DeferReason::MissingIdentity));
        };
        let Some(model_name) =
          claimed_model.or_else(|| hints.model_name.clone())
        else {
          return Ok(Derivation::Defer(DeferReason::MissingIdentity));
        };
        let vram_gb = claims.vram_gb.or(hints.vram_gb);
        let Some(model_key) = model_key_with_vram(&model_name, vram_gb) else {
          return Ok(Derivation::Defer(DeferReason::MissingIdentity));
        };

        let memory_kind = clean(&claims.memory_kind)
          .and_then(|m| MemoryKind::parse(&m).ok())
          .or(hints.memory_kind);

        let mut new_chip = NewChip::new(vendor, model_name);
        new_chip.brand_series = corrections.brand_series.clone();
        new_chip.boost_clock_mhz = claims.boost_clock_mhz;
        new_chip.tdp_watts = claims.tdp_watts;
        new_chip.memory = ChipMemory {
          vram_gb,
          kind: memory_kind,
          ..Default::default()
        };

        Ok(Derivation::Plan(Box::new(Plan {
          chip: ChipRef::Create(Box::new(new_chip)),
          identity: VariantIdentity {
            vendor,
            model_key,
            vram_gb,
            board_partner,
            model_suffix,
            part_number,
          },
          details,
          corrections,
        })))
      }
    }
  }

  /// Apply a plan: chip first, then variant, then the one-time linkage,
  /// strictly in that order. An observation is never linked to a variant
  /// that is not durably committed.
  async fn commit(
    &self,
    observation: &Observation,
    plan: Plan,
  ) -> Result<Outcome, S::Error> {
    let (chip_id, chip_created) = match plan.chip {
      ChipRef::Existing(chip_id) => {
        if let Some(chip) = self.store.get_chip(&chip_id).await? {
          let fill = gap_fill(&chip, &plan.corrections);
          if !fill.is_empty() {
            self.store.update_chip_details(&chip_id, fill).await?;
          }
        }
        (chip_id, false)
      }
      ChipRef::Create(new_chip) => {
        let upsert = self.store.create_chip(*new_chip).await?;
        let created = upsert.was_created();
        (upsert.into_inner().chip_id, created)
      }
    };

    let upsert = self
      .store
      .create_variant(NewVariant {
        chip_id,
        identity: plan.identity,
        details: plan.details,
      })
      .await?;
    let variant_created = upsert.was_created();
    let variant = upsert.into_inner();

    match self
      .store
      .link_observation(&observation.observation_id, &variant.variant_id)
      .await?
    {
      LinkOutcome::Linked => Ok(Outcome::Linked {
        variant_id: variant.variant_id,
        chip_created,
        variant_created,
      }),
      LinkOutcome::AlreadyLinked(existing)
        if existing == variant.variant_id =>
      {
        Ok(Outcome::Linked {
          variant_id: existing,
          chip_created,
          variant_created,
        })
      }
      LinkOutcome::AlreadyLinked(existing) => Ok(Outcome::Rejected {
        detail: format!("observation already linked to {existing}"),
      }),
      LinkOutcome::UnknownObservation => Ok(Outcome::Rejected {
        detail: "observation missing at linkage".into(),
      }),
      LinkOutcome::UnknownVariant => Ok(Outcome::Rejected {
        detail: "variant missing at linkage".into(),
      }),
    }
  }

  /// Decide-only counterpart of [`Self::commit`]: report what a real run
  /// would do against the current catalog, writing nothing.
  async fn preview(&self, plan: &Plan) -> Result<Outcome, S::Error> {
    let (chip_created, variant_created) = match &plan.chip {
      ChipRef::Existing(_) => {
        let exists = self
          .store
          .find_variant_by_identity(&plan.identity)
          .await?
          .is_some();
        (false, !exists)
      }
      ChipRef::Create(_) => (true, true),
    };

    Ok(Outcome::Linked {
      variant_id: plan.identity.variant_id(),
      chip_created,
      variant_created,
    })
  }
}
