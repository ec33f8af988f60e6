//! [`SqliteStore`] — the SQLite implementation of the wafer store traits.

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use wafer_core::{
  chip::{Chip, ChipCorrection, ChipFeatures, ChipMemory, NewChip, Vendor},
  evidence::{
    Hypothesis, NewHypothesis, NewObservation, Observation,
  },
  identity::{
    self, ObservationId, VariantId, VariantIdentity,
  },
  normalize,
  run::RunReport,
  store::{
    Appended, Catalog, ChipCandidate, EvidenceStore, FingerprintIndex,
    LinkOutcome, Store, Upsert,
  },
  variant::{NewVariant, Variant},
};

use crate::{
  Error, Result,
  encode::{
    RawChip, RawHypothesis, RawObservation, RawVariant, encode_claims,
    encode_dt,
  },
  schema::SCHEMA,
};

// ─── Column lists ────────────────────────────────────────────────────────────

const CHIP_COLUMNS: &str = "chip_id, vendor, model_key, model_name, \
   brand_series, code_name, architecture, compute_units_kind, \
   compute_units_count, rt_cores, tensor_cores, base_clock_mhz, \
   boost_clock_mhz, tdp_watts, recommended_psu_watts, pcie_generation, \
   pcie_lanes, created_at";

const VARIANT_COLUMNS: &str = "variant_id, chip_id, board_partner, \
   model_suffix, part_number, factory_boost_mhz, length_mm, width_slots, \
   height_mm, power_connectors, cooling, fan_count, displayport_count, \
   displayport_version, hdmi_count, hdmi_version, warranty_years, created_at";

const OBSERVATION_COLUMNS: &str = "seq, observation_id, variant_id, \
   description, description_key, retailer, url, sku, price_eur, currency, \
   stock_status, observed_at, run_id, recorded_at";

const HYPOTHESIS_COLUMNS: &str = "hypothesis_id, description, \
   description_key, source, run_id, claims_json, recorded_at";

// ─── Row readers ─────────────────────────────────────────────────────────────

fn read_chip(row: &rusqlite::Row) -> rusqlite::Result<RawChip> {
  Ok(RawChip {
    chip_id:               row.get(0)?,
    vendor:                row.get(1)?,
    model_key:             row.get(2)?,
    model_name:            row.get(3)?,
    brand_series:          row.get(4)?,
    code_name:             row.get(5)?,
    architecture:          row.get(6)?,
    compute_units_kind:    row.get(7)?,
    compute_units_count:   row.get(8)?,
    rt_cores:              row.get(9)?,
    tensor_cores:          row.get(10)?,
    base_clock_mhz:        row.get(11)?,
    boost_clock_mhz:       row.get(12)?,
    tdp_watts:             row.get(13)?,
    recommended_psu_watts: row.get(14)?,
    pcie_generation:       row.get(15)?,
    pcie_lanes:            row.get(16)?,
    created_at:            row.get(17)?,
  })
}

fn read_variant(row: &rusqlite::Row) -> rusqlite::Result<RawVariant> {
  Ok(RawVariant {
    variant_id:          row.get(0)?,
    chip_id:             row.get(1)?,
    board_partner:       row.get(2)?,
    model_suffix:        row.get(3)?,
    part_number:         row.get(4)?,
    factory_boost_mhz:   row.get(5)?,
    length_mm:           row.get(6)?,
    width_slots:         row.get(7)?,
    height_mm:           row.get(8)?,
    power_connectors:    row.get(9)?,
    cooling:             row.get(10)?,
    fan_count:           row.get(11)?,
    displayport_count:   row.get(12)?,
    displayport_version: row.get(13)?,
    hdmi_count:          row.get(14)?,
    hdmi_version:        row.get(15)?,
    warranty_years:      row.get(16)?,
    created_at:          row.get(17)?,
  })
}

fn read_observation(row: &rusqlite::Row) -> rusqlite::Result<RawObservation> {
  Ok(RawObservation {
    seq:             row.get(0)?,
    observation_id:  row.get(1)?,
    variant_id:      row.get(2)?,
    description:     row.get(3)?,
    description_key: row.get(4)?,
    retailer:        row.get(5)?,
    url:             row.get(6)?,
    sku:             row.get(7)?,
    price_eur:       row.get(8)?,
    currency:        row.get(9)?,
    stock_status:    row.get(10)?,
    observed_at:     row.get(11)?,
    run_id:          row.get(12)?,
    recorded_at:     row.get(13)?,
  })
}

fn read_hypothesis(row: &rusqlite::Row) -> rusqlite::Result<RawHypothesis> {
  Ok(RawHypothesis {
    hypothesis_id:   row.get(0)?,
    description:     row.get(1)?,
    description_key: row.get(2)?,
    source:          row.get(3)?,
    run_id:          row.get(4)?,
    claims_json:     row.get(5)?,
    recorded_at:     row.get(6)?,
  })
}

enum RawLink {
  Linked,
  Already(String),
  NoObservation,
  NoVariant,
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A wafer store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  pub(crate) fn connection(&self) -> &tokio_rusqlite::Connection {
    &self.conn
  }

  async fn fetch_chip(&self, chip_id: String) -> Result<Option<Chip>> {
    let raw: Option<RawChip> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {CHIP_COLUMNS} FROM gpu_chip WHERE chip_id = ?1"),
              rusqlite::params![chip_id],
              read_chip,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawChip::into_chip).transpose()
  }

  async fn fetch_variant(&self, variant_id: String) -> Result<Option<Variant>> {
    let raw: Option<RawVariant> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {VARIANT_COLUMNS} FROM gpu_variant WHERE variant_id = ?1"
              ),
              rusqlite::params![variant_id],
              read_variant,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawVariant::into_variant).transpose()
  }
}

impl Store for SqliteStore {
  type Error = Error;
}

// ─── Catalog impl ────────────────────────────────────────────────────────────

impl Catalog for SqliteStore {
  async fn create_chip(&self, new: NewChip) -> Result<Upsert<Chip>> {
    let model_key =
      identity::model_key_with_vram(&new.model_name, new.memory.vram_gb)
        .ok_or(wafer_core::Error::MissingField("model_name"))?;
    let chip_id = identity::chip_id(new.vendor, &model_key);
    let created_at = encode_dt(Utc::now());

    let vendor_str = new.vendor.as_str().to_owned();
    let cu_kind = new.compute_units_kind.map(|k| k.as_str().to_owned());
    let memory_kind = new.memory.kind.map(|k| k.as_str().to_owned());

    let id_for_insert = chip_id.clone();
    let (inserted, raw): (bool, Option<RawChip>) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let changed = tx.execute(
          &format!(
            "INSERT INTO gpu_chip ({CHIP_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                     ?14, ?15, ?16, ?17, ?18)
             ON CONFLICT DO NOTHING"
          ),
          rusqlite::params![
            id_for_insert,
            vendor_str,
            model_key,
            new.model_name,
            new.brand_series,
            new.code_name,
            new.architecture,
            cu_kind,
            new.compute_units_count,
            new.rt_cores,
            new.tensor_cores,
            new.base_clock_mhz,
            new.boost_clock_mhz,
            new.tdp_watts,
            new.recommended_psu_watts,
            new.pcie_generation,
            new.pcie_lanes,
            created_at,
          ],
        )?;

        if changed == 1 {
          tx.execute(
            "INSERT INTO gpu_memory (
               chip_id, vram_gb, memory_kind, bus_width_bits, speed_gbps,
               bandwidth_gbs
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
              id_for_insert,
              new.memory.vram_gb,
              memory_kind,
              new.memory.bus_width_bits,
              new.memory.speed_gbps,
              new.memory.bandwidth_gbs,
            ],
          )?;
          tx.execute(
            "INSERT INTO gpu_features (
               chip_id, raytracing_hardware, raytracing_api,
               cuda_compute_capability, dlss_version, nvenc_generation,
               nvidia_reflex, fsr_support, fluid_motion_frames, hypr_rx,
               xess_support, av1_encode, av1_decode, resizable_bar
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                       ?13, ?14)",
            rusqlite::params![
              id_for_insert,
              new.features.raytracing_hardware,
              new.features.raytracing_api,
              new.features.cuda_compute_capability,
              new.features.dlss_version,
              new.features.nvenc_generation,
              new.features.nvidia_reflex,
              new.features.fsr_support,
              new.features.fluid_motion_frames,
              new.features.hypr_rx,
              new.features.xess_support,
              new.features.av1_encode,
              new.features.av1_decode,
              new.features.resizable_bar,
            ],
          )?;
        }

        let raw = tx
          .query_row(
            &format!("SELECT {CHIP_COLUMNS} FROM gpu_chip WHERE chip_id = ?1"),
            rusqlite::params![id_for_insert],
            read_chip,
          )
          .optional()?;

        tx.commit()?;
        Ok((changed == 1, raw))
      })
      .await?;

    let chip = raw
      .ok_or_else(|| Error::ChipNotFound(chip_id))?
      .into_chip()?;

    Ok(if inserted {
      Upsert::Created(chip)
    } else {
      Upsert::Existing(chip)
    })
  }

  async fn create_variant(&self, new: NewVariant) -> Result<Upsert<Variant>> {
    let variant_id = new.identity.variant_id();
    let created_at = encode_dt(Utc::now());
    let cooling = new.details.cooling.map(|c| c.as_str().to_owned());
    let width_slots = new.details.width_slots.map(f64::from);

    let id_for_insert = variant_id.clone();
    let (inserted, raw): (bool, Option<RawVariant>) = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          &format!(
            "INSERT INTO gpu_variant ({VARIANT_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                     ?14, ?15, ?16, ?17, ?18)
             ON CONFLICT DO NOTHING"
          ),
          rusqlite::params![
            id_for_insert,
            new.chip_id,
            new.identity.board_partner,
            new.identity.model_suffix,
            new.identity.part_number,
            new.details.factory_boost_mhz,
            new.details.length_mm,
            width_slots,
            new.details.height_mm,
            new.details.power_connectors,
            cooling,
            new.details.fan_count,
            new.details.displayport_count,
            new.details.displayport_version,
            new.details.hdmi_count,
            new.details.hdmi_version,
            new.details.warranty_years,
            created_at,
          ],
        )?;

        let raw = conn
          .query_row(
            &format!(
              "SELECT {VARIANT_COLUMNS} FROM gpu_variant WHERE variant_id = ?1"
            ),
            rusqlite::params![id_for_insert],
            read_variant,
          )
          .optional()?;

        Ok((changed == 1, raw))
      })
      .await?;

    let variant = raw
      .ok_or_else(|| Error::VariantNotFound(variant_id))?
      .into_variant()?;

    Ok(if inserted {
      Upsert::Created(variant)
    } else {
      Upsert::Existing(variant)
    })
  }

  async fn get_chip(&self, chip_id: &str) -> Result<Option<Chip>> {
    self.fetch_chip(chip_id.to_owned()).await
  }

  async fn get_variant(&self, variant_id: &str) -> Result<Option<Variant>> {
    self.fetch_variant(variant_id.to_owned()).await
  }

  async fn find_chips_by_identity(
    &self,
    vendor: Vendor,
    model_key: &str,
  ) -> Result<Vec<ChipCandidate>> {
    let vendor_str = vendor.as_str().to_owned();
    let key = model_key.to_owned();

    let rows: Vec<(String, Option<u16>)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT c.chip_id, m.vram_gb
           FROM gpu_chip c
           LEFT JOIN gpu_memory m ON m.chip_id = c.chip_id
           WHERE c.vendor = ?1 AND c.model_key = ?2
           ORDER BY c.chip_id",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![vendor_str, key], |row| {
            Ok((row.get(0)?, row.get(1)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(
      rows
        .into_iter()
        .map(|(chip_id, vram_gb)| ChipCandidate { chip_id, vram_gb })
        .collect(),
    )
  }

  async fn find_variant_by_identity(
    &self,
    identity: &VariantIdentity,
  ) -> Result<Option<Variant>> {
    self.fetch_variant(identity.variant_id()).await
  }

  async fn chip_memory(&self, chip_id: &str) -> Result<Option<ChipMemory>> {
    let id = chip_id.to_owned();

    let raw: Option<(Option<u16>, Option<String>, Option<u16>, Option<f64>, Option<f64>)> =
      self
        .conn
        .call(move |conn| {
          Ok(
            conn
              .query_row(
                "SELECT vram_gb, memory_kind, bus_width_bits, speed_gbps,
                        bandwidth_gbs
                 FROM gpu_memory WHERE chip_id = ?1",
                rusqlite::params![id],
                |row| {
                  Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                  ))
                },
              )
              .optional()?,
          )
        })
        .await?;

    raw
      .map(|(vram_gb, kind, bus_width_bits, speed_gbps, bandwidth_gbs)| {
        Ok(ChipMemory {
          vram_gb,
          kind: kind
            .as_deref()
            .map(crate::encode::decode_memory_kind)
            .transpose()?,
          bus_width_bits,
          speed_gbps,
          bandwidth_gbs,
        })
      })
      .transpose()
  }

  async fn chip_features(&self, chip_id: &str) -> Result<Option<ChipFeatures>> {
    let id = chip_id.to_owned();

    let raw: Option<ChipFeatures> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT raytracing_hardware, raytracing_api,
                      cuda_compute_capability, dlss_version, nvenc_generation,
                      nvidia_reflex, fsr_support, fluid_motion_frames,
                      hypr_rx, xess_support, av1_encode, av1_decode,
                      resizable_bar
               FROM gpu_features WHERE chip_id = ?1",
              rusqlite::params![id],
              |row| {
                Ok(ChipFeatures {
                  raytracing_hardware:     row.get(0)?,
                  raytracing_api:          row.get(1)?,
                  cuda_compute_capability: row.get(2)?,
                  dlss_version:            row.get(3)?,
                  nvenc_generation:        row.get(4)?,
                  nvidia_reflex:           row.get(5)?,
                  fsr_support:             row.get(6)?,
                  fluid_motion_frames:     row.get(7)?,
                  hypr_rx:                 row.get(8)?,
                  xess_support:            row.get(9)?,
                  av1_encode:              row.get(10)?,
                  av1_decode:              row.get(11)?,
                  resizable_bar:           row.get(12)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    Ok(raw)
  }

  async fn list_chips(&self) -> Result<Vec<Chip>> {
    let raws: Vec<RawChip> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {CHIP_COLUMNS} FROM gpu_chip ORDER BY chip_id"
        ))?;
        let rows = stmt
          .query_map([], read_chip)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawChip::into_chip).collect()
  }

  async fn list_variants(&self, chip_id: &str) -> Result<Vec<Variant>> {
    let id = chip_id.to_owned();

    let raws: Vec<RawVariant> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {VARIANT_COLUMNS} FROM gpu_variant
           WHERE chip_id = ?1 ORDER BY variant_id"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![id], read_variant)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawVariant::into_variant).collect()
  }

  async fn update_chip_details(
    &self,
    chip_id: &str,
    correction: ChipCorrection,
  ) -> Result<()> {
    let id = chip_id.to_owned();
    let cu_kind = correction.compute_units_kind.map(|k| k.as_str().to_owned());

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE gpu_chip SET
             brand_series          = COALESCE(?2,  brand_series),
             code_name             = COALESCE(?3,  code_name),
             architecture          = COALESCE(?4,  architecture),
             compute_units_kind    = COALESCE(?5,  compute_units_kind),
             compute_units_count   = COALESCE(?6,  compute_units_count),
             rt_cores              = COALESCE(?7,  rt_cores),
             tensor_cores          = COALESCE(?8,  tensor_cores),
             base_clock_mhz        = COALESCE(?9,  base_clock_mhz),
             boost_clock_mhz       = COALESCE(?10, boost_clock_mhz),
             tdp_watts             = COALESCE(?11, tdp_watts),
             recommended_psu_watts = COALESCE(?12, recommended_psu_watts),
             pcie_generation       = COALESCE(?13, pcie_generation),
             pcie_lanes            = COALESCE(?14, pcie_lanes)
           WHERE chip_id = ?1",
          rusqlite::params![
            id,
            correction.brand_series,
            correction.code_name,
            correction.architecture,
            cu_kind,
            correction.compute_units_count,
            correction.rt_cores,
            correction.tensor_cores,
            correction.base_clock_mhz,
            correction.boost_clock_mhz,
            correction.tdp_watts,
            correction.recommended_psu_watts,
            correction.pcie_generation,
            correction.pcie_lanes,
          ],
        )?)
      })
      .await?;

    if changed == 0 {
      return Err(Error::ChipNotFound(chip_id.to_owned()));
    }
    Ok(())
  }

  async fn remove_chip(&self, chip_id: &str) -> Result<bool> {
    let id = chip_id.to_owned();

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM gpu_chip WHERE chip_id = ?1",
          rusqlite::params![id],
        )?)
      })
      .await?;

    Ok(changed > 0)
  }
}

// ─── EvidenceStore impl ──────────────────────────────────────────────────────

impl EvidenceStore for SqliteStore {
  async fn append_observation(
    &self,
    new: NewObservation,
  ) -> Result<Appended<Observation>> {
    new.validate().map_err(Error::Core)?;

    let observed_at = encode_dt(new.observed_at);
    let observation_id = identity::observation_id(
      &new.retailer,
      &new.url,
      &observed_at,
      &new.run_id,
    );
    let description_key = normalize::fold(&new.description);
    let stock_status = new.stock_status.as_str().to_owned();
    let recorded_at = encode_dt(Utc::now());

    let id_for_insert = observation_id.clone();
    let (inserted, raw): (bool, Option<RawObservation>) = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "INSERT INTO market_observation (
             observation_id, description, description_key, retailer, url,
             sku, price_eur, currency, stock_status, observed_at, run_id,
             recorded_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
           ON CONFLICT(observation_id) DO NOTHING",
          rusqlite::params![
            id_for_insert,
            new.description,
            description_key,
            new.retailer,
            new.url,
            new.sku,
            new.price_eur,
            new.currency,
            stock_status,
            observed_at,
            new.run_id,
            recorded_at,
          ],
        )?;

        let raw = conn
          .query_row(
            &format!(
              "SELECT {OBSERVATION_COLUMNS} FROM market_observation
               WHERE observation_id = ?1"
            ),
            rusqlite::params![id_for_insert],
            read_observation,
          )
          .optional()?;

        Ok((changed == 1, raw))
      })
      .await?;

    let observation = raw
      .ok_or_else(|| Error::Decode(format!(
        "observation {observation_id} missing after insert"
      )))?
      .into_observation()?;

    Ok(if inserted {
      Appended::Inserted(observation)
    } else {
      Appended::Replayed(observation)
    })
  }

  async fn append_hypothesis(
    &self,
    new: NewHypothesis,
  ) -> Result<Appended<Hypothesis>> {
    new.validate().map_err(Error::Core)?;

    let claims_json = encode_claims(&new.claims)?;
    let description_key = normalize::fold(&new.description);
    let hypothesis_id = identity::hypothesis_id(
      &description_key,
      &new.source,
      &new.run_id,
      &claims_json,
    );
    let recorded_at = encode_dt(new.recorded_at.unwrap_or_else(Utc::now));

    let id_for_insert = hypothesis_id.clone();
    let (inserted, raw): (bool, Option<RawHypothesis>) = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "INSERT INTO product_hypothesis (
             hypothesis_id, description, description_key, source, run_id,
             claims_json, recorded_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
           ON CONFLICT(hypothesis_id) DO NOTHING",
          rusqlite::params![
            id_for_insert,
            new.description,
            description_key,
            new.source,
            new.run_id,
            claims_json,
            recorded_at,
          ],
        )?;

        let raw = conn
          .query_row(
            &format!(
              "SELECT {HYPOTHESIS_COLUMNS} FROM product_hypothesis
               WHERE hypothesis_id = ?1"
            ),
            rusqlite::params![id_for_insert],
            read_hypothesis,
          )
          .optional()?;

        Ok((changed == 1, raw))
      })
      .await?;

    let hypothesis = raw
      .ok_or_else(|| Error::Decode(format!(
        "hypothesis {hypothesis_id} missing after insert"
      )))?
      .into_hypothesis()?;

    Ok(if inserted {
      Appended::Inserted(hypothesis)
    } else {
      Appended::Replayed(hypothesis)
    })
  }

  async fn get_observation(
    &self,
    observation_id: &str,
  ) -> Result<Option<Observation>> {
    let id = observation_id.to_owned();

    let raw: Option<RawObservation> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {OBSERVATION_COLUMNS} FROM market_observation
                 WHERE observation_id = ?1"
              ),
              rusqlite::params![id],
              read_observation,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawObservation::into_observation).transpose()
  }

  async fn observations_since(&self, run_id: &str) -> Result<Vec<Observation>> {
    let run = run_id.to_owned();

    let raws: Vec<RawObservation> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {OBSERVATION_COLUMNS} FROM market_observation
           WHERE seq > COALESCE(
             (SELECT MAX(seq) FROM market_observation WHERE run_id = ?1), 0)
           ORDER BY seq"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![run], read_observation)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(RawObservation::into_observation)
      .collect()
  }

  async fn unresolved_observations(
    &self,
    limit: Option<usize>,
  ) -> Result<Vec<Observation>> {
    let limit_val = limit.map(|l| l as i64).unwrap_or(-1);

    let raws: Vec<RawObservation> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {OBSERVATION_COLUMNS} FROM market_observation
           WHERE variant_id IS NULL
           ORDER BY seq
           LIMIT ?1"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![limit_val], read_observation)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(RawObservation::into_observation)
      .collect()
  }

  async fn hypotheses_for(
    &self,
    description_key: &str,
  ) -> Result<Vec<Hypothesis>> {
    let key = description_key.to_owned();

    let raws: Vec<RawHypothesis> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {HYPOTHESIS_COLUMNS} FROM product_hypothesis
           WHERE description_key = ?1
           ORDER BY recorded_at, hypothesis_id"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![key], read_hypothesis)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(RawHypothesis::into_hypothesis)
      .collect()
  }

  async fn link_observation(
    &self,
    observation_id: &ObservationId,
    variant_id: &VariantId,
  ) -> Result<LinkOutcome> {
    let obs_id = observation_id.clone();
    let var_id = variant_id.clone();

    let raw = self
      .conn
      .call(move |conn| {
        let variant_exists: bool = conn
          .query_row(
            "SELECT 1 FROM gpu_variant WHERE variant_id = ?1",
            rusqlite::params![var_id],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);

        if !variant_exists {
          return Ok(RawLink::NoVariant);
        }

        let changed = conn.execute(
          "UPDATE market_observation SET variant_id = ?2
           WHERE observation_id = ?1 AND variant_id IS NULL",
          rusqlite::params![obs_id, var_id],
        )?;

        if changed == 1 {
          return Ok(RawLink::Linked);
        }

        let existing: Option<Option<String>> = conn
          .query_row(
            "SELECT variant_id FROM market_observation
             WHERE observation_id = ?1",
            rusqlite::params![obs_id],
            |row| row.get(0),
          )
          .optional()?;

        Ok(match existing {
          Some(Some(v)) => RawLink::Already(v),
          _ => RawLink::NoObservation,
        })
      })
      .await?;

    Ok(match raw {
      RawLink::Linked => LinkOutcome::Linked,
      RawLink::Already(v) => LinkOutcome::AlreadyLinked(v),
      RawLink::NoObservation => LinkOutcome::UnknownObservation,
      RawLink::NoVariant => LinkOutcome::UnknownVariant,
    })
  }

  async fn record_run(&self, report: &RunReport) -> Result<()> {
    let run_id = report.run_id.to_string();
    let started_at = encode_dt(report.started_at);
    let finished_at = encode_dt(report.finished_at);
    let counts = report.counts.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO resolution_run (
             run_id, started_at, finished_at, scanned, linked, chips_created,
             variants_created, deferred_no_hypothesis,
             deferred_missing_identity, deferred_contradictory,
             deferred_ambiguous, rejected, errors
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
          rusqlite::params![
            run_id,
            started_at,
            finished_at,
            counts.scanned as i64,
            counts.linked as i64,
            counts.chips_created as i64,
            counts.variants_created as i64,
            counts.deferred_no_hypothesis as i64,
            counts.deferred_missing_identity as i64,
            counts.deferred_contradictory as i64,
            counts.deferred_ambiguous as i64,
            counts.rejected as i64,
            counts.errors as i64,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── FingerprintIndex impl ───────────────────────────────────────────────────

impl FingerprintIndex for SqliteStore {
  async fn has_seen(&self, fingerprint: &str) -> Result<bool> {
    let fp = fingerprint.to_owned();

    let seen: bool = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT 1 FROM enrichment_seen WHERE fingerprint = ?1",
              rusqlite::params![fp],
              |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false),
        )
      })
      .await?;

    Ok(seen)
  }

  async fn mark_seen(&self, fingerprint: &str, run_id: &str) -> Result<()> {
    let fp = fingerprint.to_owned();
    let run = run_id.to_owned();
    let marked_at = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO enrichment_seen (fingerprint, run_id, marked_at)
           VALUES (?1, ?2, ?3)
           ON CONFLICT(fingerprint) DO NOTHING",
          rusqlite::params![fp, run, marked_at],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}
