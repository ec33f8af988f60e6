//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{DateTime, TimeZone, Utc};
use wafer_core::{
  chip::{ChipCorrection, NewChip, Vendor},
  evidence::{ClaimedAttributes, NewHypothesis, NewObservation, StockStatus},
  identity::VariantIdentity,
  run::{RunCounts, RunReport},
  store::{
    Appended, Catalog, DerivedViews, EvidenceStore, FingerprintIndex,
    LinkOutcome, Upsert,
  },
  variant::{NewVariant, VariantDetails},
};

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn ts(secs: i64) -> DateTime<Utc> {
  Utc.timestamp_opt(1_750_000_000 + secs, 0).unwrap()
}

fn rtx_5090(vram_gb: Option<u16>) -> NewChip {
  let mut chip = NewChip::new(Vendor::Nvidia, "RTX 5090");
  chip.memory.vram_gb = vram_gb;
  chip
}

fn asus_tuf_identity(model_key: &str, vram_gb: Option<u16>) -> VariantIdentity {
  VariantIdentity {
    vendor: Vendor::Nvidia,
    model_key: model_key.into(),
    vram_gb,
    board_partner: "ASUS".into(),
    model_suffix: Some("TUF OC".into()),
    part_number: None,
  }
}

fn observation(
  description: &str,
  retailer: &str,
  price: f64,
  observed_at: DateTime<Utc>,
  run_id: &str,
) -> NewObservation {
  NewObservation {
    description: description.into(),
    retailer: retailer.into(),
    url: format!("https://{retailer}.example/p/{}", description.len()),
    sku: None,
    price_eur: price,
    currency: "EUR".into(),
    stock_status: StockStatus::InStock,
    observed_at,
    run_id: run_id.into(),
  }
}

fn hypothesis(description: &str, source: &str) -> NewHypothesis {
  NewHypothesis {
    description: description.into(),
    source: source.into(),
    run_id: "enrich-1".into(),
    recorded_at: Some(ts(0)),
    claims: ClaimedAttributes {
      vendor: Some("NVIDIA".into()),
      model_name: Some("RTX 5090".into()),
      board_partner: Some("ASUS".into()),
      model_suffix: Some("TUF OC".into()),
      ..Default::default()
    },
  }
}

// ─── Chips ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_chip_derives_identity_and_satellites() {
  let s = store().await;

  let chip = s.create_chip(rtx_5090(Some(32))).await.unwrap();
  assert!(chip.was_created());
  let chip = chip.into_inner();
  assert!(chip.chip_id.starts_with("chip_"));
  assert_eq!(chip.model_key, "5090 32 gb");

  let fetched = s.get_chip(&chip.chip_id).await.unwrap().unwrap();
  assert_eq!(fetched.vendor, Vendor::Nvidia);
  assert_eq!(fetched.model_name, "RTX 5090");

  let memory = s.chip_memory(&chip.chip_id).await.unwrap().unwrap();
  assert_eq!(memory.vram_gb, Some(32));
  assert!(s.chip_features(&chip.chip_id).await.unwrap().is_some());
}

#[tokio::test]
async fn create_chip_conflict_returns_existing() {
  let s = store().await;

  let first = s.create_chip(rtx_5090(Some(32))).await.unwrap().into_inner();

  // Same identity, different descriptive claims: no second chip.
  let mut again = rtx_5090(Some(32));
  again.tdp_watts = Some(575);
  let second = s.create_chip(again).await.unwrap();
  assert!(matches!(second, Upsert::Existing(_)));
  assert_eq!(second.get().chip_id, first.chip_id);
  // The losing write does not correct anything implicitly.
  assert_eq!(second.get().tdp_watts, None);

  assert_eq!(s.list_chips().await.unwrap().len(), 1);
}

#[tokio::test]
async fn identity_lookup_is_exact() {
  let s = store().await;
  s.create_chip(rtx_5090(Some(32))).await.unwrap();

  let hits = s
    .find_chips_by_identity(Vendor::Nvidia, "5090 32 gb")
    .await
    .unwrap();
  assert_eq!(hits.len(), 1);
  assert_eq!(hits[0].vram_gb, Some(32));

  assert!(s
    .find_chips_by_identity(Vendor::Nvidia, "5090")
    .await
    .unwrap()
    .is_empty());
  assert!(s
    .find_chips_by_identity(Vendor::Amd, "5090 32 gb")
    .await
    .unwrap()
    .is_empty());
}

#[tokio::test]
async fn corrections_touch_descriptive_fields_only() {
  let s = store().await;
  let chip = s.create_chip(rtx_5090(Some(32))).await.unwrap().into_inner();

  s.update_chip_details(&chip.chip_id, ChipCorrection {
    tdp_watts: Some(575),
    boost_clock_mhz: Some(2407),
    ..Default::default()
  })
  .await
  .unwrap();

  let updated = s.get_chip(&chip.chip_id).await.unwrap().unwrap();
  assert_eq!(updated.tdp_watts, Some(575));
  assert_eq!(updated.boost_clock_mhz, Some(2407));
  assert_eq!(updated.model_key, chip.model_key);
  assert_eq!(updated.vendor, chip.vendor);
  assert_eq!(updated.chip_id, chip.chip_id);
}

#[tokio::test]
async fn correcting_a_missing_chip_errors() {
  let s = store().await;
  let err = s
    .update_chip_details("chip_missing", ChipCorrection {
      tdp_watts: Some(575),
      ..Default::default()
    })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::ChipNotFound(_)));
}

// ─── Variants ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_variant_and_conflict() {
  let s = store().await;
  let chip = s.create_chip(rtx_5090(Some(32))).await.unwrap().into_inner();
  let identity = asus_tuf_identity(&chip.model_key, Some(32));

  let v1 = s
    .create_variant(NewVariant {
      chip_id:  chip.chip_id.clone(),
      identity: identity.clone(),
      details:  VariantDetails::default(),
    })
    .await
    .unwrap();
  assert!(v1.was_created());

  let v2 = s
    .create_variant(NewVariant {
      chip_id:  chip.chip_id.clone(),
      identity: identity.clone(),
      details:  VariantDetails::default(),
    })
    .await
    .unwrap();
  assert!(matches!(v2, Upsert::Existing(_)));
  assert_eq!(v2.get().variant_id, v1.get().variant_id);

  let found = s
    .find_variant_by_identity(&identity)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(found.variant_id, v1.get().variant_id);
  assert_eq!(s.list_variants(&chip.chip_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn variant_requires_existing_chip() {
  let s = store().await;
  let result = s
    .create_variant(NewVariant {
      chip_id:  "chip_missing".into(),
      identity: asus_tuf_identity("5090 32 gb", Some(32)),
      details:  VariantDetails::default(),
    })
    .await;
  assert!(result.is_err());
}

#[tokio::test]
async fn removing_a_chip_cascades() {
  let s = store().await;
  let chip = s.create_chip(rtx_5090(Some(32))).await.unwrap().into_inner();
  let identity = asus_tuf_identity(&chip.model_key, Some(32));
  let variant = s
    .create_variant(NewVariant {
      chip_id:  chip.chip_id.clone(),
      identity: identity.clone(),
      details:  VariantDetails::default(),
    })
    .await
    .unwrap()
    .into_inner();

  let obs = s
    .append_observation(observation(
      "ASUS TUF RTX 5090 OC",
      "alternate",
      2199.0,
      ts(0),
      "scrape-1",
    ))
    .await
    .unwrap()
    .into_inner();
  assert_eq!(
    s.link_observation(&obs.observation_id, &variant.variant_id)
      .await
      .unwrap(),
    LinkOutcome::Linked
  );

  assert!(s.remove_chip(&chip.chip_id).await.unwrap());
  assert!(s.get_chip(&chip.chip_id).await.unwrap().is_none());
  assert!(s.chip_memory(&chip.chip_id).await.unwrap().is_none());
  assert!(s.get_variant(&variant.variant_id).await.unwrap().is_none());
  assert!(s
    .get_observation(&obs.observation_id)
    .await
    .unwrap()
    .is_none());

  // Removing again is a no-op.
  assert!(!s.remove_chip(&chip.chip_id).await.unwrap());
}

// ─── Observations ────────────────────────────────────────────────────────────

#[tokio::test]
async fn append_observation_assigns_lineage_identity() {
  let s = store().await;

  let appended = s
    .append_observation(observation(
      "ASUS TUF RTX 5090 OC",
      "alternate",
      2199.0,
      ts(0),
      "scrape-1",
    ))
    .await
    .unwrap();
  assert!(appended.was_inserted());
  let obs = appended.into_inner();
  assert!(obs.observation_id.starts_with("obs_"));
  assert_eq!(obs.variant_id, None);
  assert_eq!(obs.description_key, "ASUS TUF RTX 5090 OC");
}

#[tokio::test]
async fn validation_failures_persist_nothing() {
  let s = store().await;

  let mut bad = observation("ASUS TUF RTX 5090 OC", "alternate", 0.0, ts(0), "r");
  bad.price_eur = 0.0;
  let err = s.append_observation(bad).await.unwrap_err();
  assert!(matches!(
    err,
    Error::Core(wafer_core::Error::NonPositivePrice(_))
  ));

  let mut blank = observation("x", "alternate", 10.0, ts(0), "r");
  blank.description = "  ".into();
  assert!(s.append_observation(blank).await.is_err());

  assert!(s.unresolved_observations(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn replaying_an_identical_lineage_tuple_is_a_noop() {
  let s = store().await;
  let new = observation("ASUS TUF RTX 5090 OC", "alternate", 2199.0, ts(0), "r1");

  let first = s.append_observation(new.clone()).await.unwrap();
  assert!(first.was_inserted());

  let replay = s.append_observation(new).await.unwrap();
  assert!(matches!(replay, Appended::Replayed(_)));
  assert_eq!(
    replay.into_inner().observation_id,
    first.into_inner().observation_id
  );
  assert_eq!(s.unresolved_observations(None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn repeated_sightings_are_distinct_rows() {
  let s = store().await;

  // Same listing, same price, later timestamp: a new event, not a dupe.
  s.append_observation(observation(
    "ASUS TUF RTX 5090 OC",
    "alternate",
    2199.0,
    ts(0),
    "r1",
  ))
  .await
  .unwrap();
  s.append_observation(observation(
    "ASUS TUF RTX 5090 OC",
    "alternate",
    2199.0,
    ts(3600),
    "r2",
  ))
  .await
  .unwrap();

  assert_eq!(s.unresolved_observations(None).await.unwrap().len(), 2);
}

#[tokio::test]
async fn observations_since_follows_append_order() {
  let s = store().await;

  s.append_observation(observation("A", "x", 1.0, ts(0), "run-a"))
    .await
    .unwrap();
  s.append_observation(observation("B", "x", 2.0, ts(1), "run-a"))
    .await
    .unwrap();
  s.append_observation(observation("C", "x", 3.0, ts(2), "run-b"))
    .await
    .unwrap();

  let since_a = s.observations_since("run-a").await.unwrap();
  assert_eq!(since_a.len(), 1);
  assert_eq!(since_a[0].description, "C");

  // An unknown run means "since before anything".
  assert_eq!(s.observations_since("run-z").await.unwrap().len(), 3);
}

#[tokio::test]
async fn linkage_is_write_once() {
  let s = store().await;
  let chip = s.create_chip(rtx_5090(Some(32))).await.unwrap().into_inner();
  let v1 = s
    .create_variant(NewVariant {
      chip_id:  chip.chip_id.clone(),
      identity: asus_tuf_identity(&chip.model_key, Some(32)),
      details:  VariantDetails::default(),
    })
    .await
    .unwrap()
    .into_inner();
  let mut other = asus_tuf_identity(&chip.model_key, Some(32));
  other.model_suffix = Some("ROG Strix".into());
  let v2 = s
    .create_variant(NewVariant {
      chip_id:  chip.chip_id.clone(),
      identity: other,
      details:  VariantDetails::default(),
    })
    .await
    .unwrap()
    .into_inner();

  let obs = s
    .append_observation(observation(
      "ASUS TUF RTX 5090 OC",
      "alternate",
      2199.0,
      ts(0),
      "r1",
    ))
    .await
    .unwrap()
    .into_inner();

  assert_eq!(
    s.link_observation(&obs.observation_id, &v1.variant_id)
      .await
      .unwrap(),
    LinkOutcome::Linked
  );
  // A second link attempt reports the existing target and changes nothing.
  assert_eq!(
    s.link_observation(&obs.observation_id, &v2.variant_id)
      .await
      .unwrap(),
    LinkOutcome::AlreadyLinked(v1.variant_id.clone())
  );

  let stored = s
    .get_observation(&obs.observation_id)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(stored.variant_id, Some(v1.variant_id.clone()));

  assert_eq!(
    s.link_observation(&"obs_missing".to_owned(), &v1.variant_id)
      .await
      .unwrap(),
    LinkOutcome::UnknownObservation
  );
  assert_eq!(
    s.link_observation(&obs.observation_id, &"var_missing".to_owned())
      .await
      .unwrap(),
    LinkOutcome::UnknownVariant
  );
}

#[tokio::test]
async fn unresolved_excludes_linked_observations() {
  let s = store().await;
  let chip = s.create_chip(rtx_5090(Some(32))).await.unwrap().into_inner();
  let variant = s
    .create_variant(NewVariant {
      chip_id:  chip.chip_id.clone(),
      identity: asus_tuf_identity(&chip.model_key, Some(32)),
      details:  VariantDetails::default(),
    })
    .await
    .unwrap()
    .into_inner();

  let linked = s
    .append_observation(observation("A", "x", 1.0, ts(0), "r"))
    .await
    .unwrap()
    .into_inner();
  s.append_observation(observation("B", "x", 2.0, ts(1), "r"))
    .await
    .unwrap();
  s.link_observation(&linked.observation_id, &variant.variant_id)
    .await
    .unwrap();

  let pending = s.unresolved_observations(None).await.unwrap();
  assert_eq!(pending.len(), 1);
  assert_eq!(pending[0].description, "B");
}

// ─── Hypotheses ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn hypotheses_join_on_folded_description() {
  let s = store().await;

  s.append_hypothesis(hypothesis("ASUS TUF RTX 5090 OC", "perplexity_ai"))
    .await
    .unwrap();
  // Different surface text, same folded key.
  s.append_hypothesis(hypothesis("  asus tuf rtx 5090 (OC) ", "openai"))
    .await
    .unwrap();
  s.append_hypothesis(hypothesis("MSI RTX 5080 GAMING", "perplexity_ai"))
    .await
    .unwrap();

  let found = s.hypotheses_for("ASUS TUF RTX 5090 OC").await.unwrap();
  assert_eq!(found.len(), 2);
  assert!(found.iter().all(|h| h.description_key == "ASUS TUF RTX 5090 OC"));
}

#[tokio::test]
async fn replaying_an_identical_hypothesis_is_a_noop() {
  let s = store().await;
  let new = hypothesis("ASUS TUF RTX 5090 OC", "perplexity_ai");

  assert!(s.append_hypothesis(new.clone()).await.unwrap().was_inserted());
  let replay = s.append_hypothesis(new).await.unwrap();
  assert!(matches!(replay, Appended::Replayed(_)));

  // A contradicting claim set from the same source is new evidence.
  let mut contradicting = hypothesis("ASUS TUF RTX 5090 OC", "perplexity_ai");
  contradicting.claims.model_suffix = Some("ROG Strix".into());
  assert!(s
    .append_hypothesis(contradicting)
    .await
    .unwrap()
    .was_inserted());

  assert_eq!(
    s.hypotheses_for("ASUS TUF RTX 5090 OC").await.unwrap().len(),
    2
  );
}

// ─── Fingerprint index ───────────────────────────────────────────────────────

#[tokio::test]
async fn fingerprint_gate_is_idempotent() {
  let s = store().await;
  let fp = wafer_core::fingerprint::fingerprint("ASUS TUF RTX 5090 OC");

  assert!(!s.has_seen(&fp).await.unwrap());
  s.mark_seen(&fp, "enrich-1").await.unwrap();
  assert!(s.has_seen(&fp).await.unwrap());
  // Replays keep the first run and do not error.
  s.mark_seen(&fp, "enrich-2").await.unwrap();
  assert!(s.has_seen(&fp).await.unwrap());
}

// ─── Run reports ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn run_reports_are_recorded() {
  let s = store().await;
  let report = RunReport {
    run_id:      uuid::Uuid::new_v4(),
    started_at:  ts(0),
    finished_at: ts(1),
    dry_run:     false,
    counts:      RunCounts {
      scanned: 3,
      linked: 2,
      deferred_no_hypothesis: 1,
      ..Default::default()
    },
  };
  s.record_run(&report).await.unwrap();
}

// ─── Derived views ───────────────────────────────────────────────────────────

async fn seeded_market(s: &SqliteStore) -> (String, String) {
  let chip = s.create_chip(rtx_5090(Some(32))).await.unwrap().into_inner();
  let variant = s
    .create_variant(NewVariant {
      chip_id:  chip.chip_id.clone(),
      identity: asus_tuf_identity(&chip.model_key, Some(32)),
      details:  VariantDetails::default(),
    })
    .await
    .unwrap()
    .into_inner();

  for (retailer, price, at, run) in [
    ("alternate", 2199.0, 0, "r1"),
    ("alternate", 2149.0, 3600, "r2"), // newer price at the same retailer
    ("mindfactory", 2179.0, 1800, "r1"),
  ] {
    let obs = s
      .append_observation(observation(
        "ASUS TUF RTX 5090 OC",
        retailer,
        price,
        ts(at),
        run,
      ))
      .await
      .unwrap()
      .into_inner();
    s.link_observation(&obs.observation_id, &variant.variant_id)
      .await
      .unwrap();
  }

  (chip.chip_id, variant.variant_id)
}

#[tokio::test]
async fn latest_prices_pick_newest_per_retailer() {
  let s = store().await;
  let (_, variant_id) = seeded_market(&s).await;

  // Unlinked observations never surface in views.
  s.append_observation(observation("Unresolved thing", "alternate", 99.0, ts(9), "r9"))
    .await
    .unwrap();

  let latest = s.latest_prices().await.unwrap();
  assert_eq!(latest.len(), 2);
  let alternate = latest
    .iter()
    .find(|l| l.retailer == "alternate")
    .unwrap();
  assert_eq!(alternate.price_eur, 2149.0);
  assert_eq!(alternate.variant_id, variant_id);
}

#[tokio::test]
async fn value_metrics_use_cheapest_available_listing() {
  let s = store().await;
  let (chip_id, variant_id) = seeded_market(&s).await;

  let metrics = s.value_metrics().await.unwrap();
  assert_eq!(metrics.len(), 1);
  let m = &metrics[0];
  assert_eq!(m.variant_id, variant_id);
  assert_eq!(m.chip_id, chip_id);
  // Latest alternate price (2149) beats mindfactory (2179).
  assert_eq!(m.best_price_eur, 2149.0);
  assert_eq!(m.best_retailer, "alternate");
  assert_eq!(m.vram_gb, Some(32));
  assert_eq!(m.eur_per_vram_gb, Some(2149.0 / 32.0));
}

#[tokio::test]
async fn out_of_stock_listings_are_excluded_from_value_metrics() {
  let s = store().await;
  let chip = s.create_chip(rtx_5090(Some(32))).await.unwrap().into_inner();
  let variant = s
    .create_variant(NewVariant {
      chip_id:  chip.chip_id.clone(),
      identity: asus_tuf_identity(&chip.model_key, Some(32)),
      details:  VariantDetails::default(),
    })
    .await
    .unwrap()
    .into_inner();

  let mut gone = observation("ASUS TUF RTX 5090 OC", "alternate", 1999.0, ts(0), "r");
  gone.stock_status = StockStatus::OutOfStock;
  let obs = s.append_observation(gone).await.unwrap().into_inner();
  s.link_observation(&obs.observation_id, &variant.variant_id)
    .await
    .unwrap();

  assert_eq!(s.latest_prices().await.unwrap().len(), 1);
  assert!(s.value_metrics().await.unwrap().is_empty());
}

#[tokio::test]
async fn rebuilding_views_is_byte_identical() {
  let s = store().await;
  seeded_market(&s).await;

  let first = serde_json::to_vec(&s.latest_prices().await.unwrap()).unwrap();
  let second = serde_json::to_vec(&s.latest_prices().await.unwrap()).unwrap();
  assert_eq!(first, second);

  let first = serde_json::to_vec(&s.value_metrics().await.unwrap()).unwrap();
  let second = serde_json::to_vec(&s.value_metrics().await.unwrap()).unwrap();
  assert_eq!(first, second);
}
