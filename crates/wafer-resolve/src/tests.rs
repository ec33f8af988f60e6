//! Engine tests against an in-memory SQLite store.

use chrono::{DateTime, TimeZone, Utc};
use wafer_core::{
  evidence::{ClaimedAttributes, NewHypothesis, NewObservation, StockStatus},
  store::{Catalog, ChipCandidate, EvidenceStore},
};
use wafer_store_sqlite::SqliteStore;

use crate::{
  RankingPolicy, ResolveOptions, Resolver,
  engine::{MatchState, select_chip},
};

async fn resolver() -> Resolver<SqliteStore> {
  let store = SqliteStore::open_in_memory().await.expect("in-memory store");
  let policy =
    RankingPolicy::new(vec!["perplexity_ai".into(), "openai".into()]);
  Resolver::new(store, policy)
}

fn ts(secs: i64) -> DateTime<Utc> {
  Utc.timestamp_opt(1_750_000_000 + secs, 0).unwrap()
}

fn observation(
  description: &str,
  observed_at: DateTime<Utc>,
  run_id: &str,
) -> NewObservation {
  NewObservation {
    description:  description.into(),
    retailer:     "alternate".into(),
    url:          format!("https://alternate.example/{}", description.len()),
    sku:          None,
    price_eur:    2199.0,
    currency:     "EUR".into(),
    stock_status: StockStatus::InStock,
    observed_at,
    run_id:       run_id.into(),
  }
}

fn hypothesis(
  description: &str,
  source: &str,
  recorded_at: DateTime<Utc>,
  claims: ClaimedAttributes,
) -> NewHypothesis {
  NewHypothesis {
    description: description.into(),
    source: source.into(),
    run_id: "enrich-1".into(),
    recorded_at: Some(recorded_at),
    claims,
  }
}

fn tuf_claims() -> ClaimedAttributes {
  ClaimedAttributes {
    vendor: Some("NVIDIA".into()),
    model_name: Some("RTX 5090".into()),
    board_partner: Some("ASUS".into()),
    model_suffix: Some("TUF OC".into()),
    ..Default::default()
  }
}

async fn resolve(r: &Resolver<SqliteStore>) -> wafer_core::run::RunReport {
  r.resolve_pending(&ResolveOptions::default())
    .await
    .expect("resolution run")
}

// ─── The reference scenario ──────────────────────────────────────────────────

#[tokio::test]
async fn first_sighting_creates_chip_and_variant_once() {
  let r = resolver().await;
  let s = r.store();

  let first = s
    .append_observation(observation("ASUS TUF RTX 5090 OC", ts(0), "scrape-1"))
    .await
    .unwrap()
    .into_inner();
  s.append_hypothesis(hypothesis(
    "ASUS TUF RTX 5090 OC",
    "perplexity_ai",
    ts(10),
    tuf_claims(),
  ))
  .await
  .unwrap();

  let report = resolve(&r).await;
  assert_eq!(report.counts.scanned, 1);
  assert_eq!(report.counts.linked, 1);
  assert_eq!(report.counts.chips_created, 1);
  assert_eq!(report.counts.variants_created, 1);
  assert_eq!(report.counts.deferred_total(), 0);

  let linked = s
    .get_observation(&first.observation_id)
    .await
    .unwrap()
    .unwrap();
  let variant_id = linked.variant_id.expect("linked");

  // The identical pair sighted again later: one new observation, zero new
  // catalog rows, same variant.
  let second = s
    .append_observation(observation("ASUS TUF RTX 5090 OC", ts(3600), "scrape-2"))
    .await
    .unwrap()
    .into_inner();
  s.append_hypothesis(hypothesis(
    "ASUS TUF RTX 5090 OC",
    "perplexity_ai",
    ts(10),
    tuf_claims(),
  ))
  .await
  .unwrap();

  let report = resolve(&r).await;
  assert_eq!(report.counts.scanned, 1);
  assert_eq!(report.counts.linked, 1);
  assert_eq!(report.counts.chips_created, 0);
  assert_eq!(report.counts.variants_created, 0);

  let relinked = s
    .get_observation(&second.observation_id)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(relinked.variant_id.as_deref(), Some(variant_id.as_str()));
  assert_eq!(s.list_chips().await.unwrap().len(), 1);
}

// ─── Deferral ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn no_hypothesis_defers_without_catalog_writes() {
  let r = resolver().await;
  let s = r.store();

  s.append_observation(observation("ASUS TUF RTX 5090 OC", ts(0), "scrape-1"))
    .await
    .unwrap();

  let report = resolve(&r).await;
  assert_eq!(report.counts.deferred_no_hypothesis, 1);
  assert_eq!(report.counts.linked, 0);
  assert!(s.list_chips().await.unwrap().is_empty());
  assert_eq!(s.unresolved_observations(None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn deferred_observations_are_retried_not_lost() {
  let r = resolver().await;
  let s = r.store();

  let obs = s
    .append_observation(observation("ASUS TUF RTX 5090 OC", ts(0), "scrape-1"))
    .await
    .unwrap()
    .into_inner();
  resolve(&r).await;

  // Better evidence arrives; the observation links on the next run.
  s.append_hypothesis(hypothesis(
    "ASUS TUF RTX 5090 OC",
    "perplexity_ai",
    ts(100),
    tuf_claims(),
  ))
  .await
  .unwrap();

  let report = resolve(&r).await;
  assert_eq!(report.counts.scanned, 1);
  assert_eq!(report.counts.linked, 1);
  assert!(s
    .get_observation(&obs.observation_id)
    .await
    .unwrap()
    .unwrap()
    .variant_id
    .is_some());

  // Already-linked observations are not reprocessed.
  let report = resolve(&r).await;
  assert_eq!(report.counts.scanned, 0);
}

#[tokio::test]
async fn missing_board_partner_defers() {
  let r = resolver().await;
  let s = r.store();

  s.append_observation(observation("RTX 5090 bundle deal", ts(0), "scrape-1"))
    .await
    .unwrap();
  let mut claims = tuf_claims();
  claims.board_partner = None;
  claims.model_suffix = None;
  s.append_hypothesis(hypothesis(
    "RTX 5090 bundle deal",
    "perplexity_ai",
    ts(10),
    claims,
  ))
  .await
  .unwrap();

  let report = resolve(&r).await;
  assert_eq!(report.counts.deferred_missing_identity, 1);
  assert!(s.list_chips().await.unwrap().is_empty());
}

#[tokio::test]
async fn contradictory_hypothesis_defers() {
  let r = resolver().await;
  let s = r.store();

  s.append_observation(observation("Special RTX 5090 deal", ts(0), "scrape-1"))
    .await
    .unwrap();
  let mut claims = tuf_claims();
  // Claims AMD silicon under an NVIDIA model name.
  claims.vendor = Some("AMD".into());
  s.append_hypothesis(hypothesis(
    "Special RTX 5090 deal",
    "perplexity_ai",
    ts(10),
    claims,
  ))
  .await
  .unwrap();

  let report = resolve(&r).await;
  assert_eq!(report.counts.deferred_contradictory, 1);
  assert!(s.list_chips().await.unwrap().is_empty());
}

// ─── Ranking ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn trusted_source_wins_over_newer_claims() {
  let r = resolver().await;
  let s = r.store();

  s.append_observation(observation("custom build rtx 5090", ts(0), "scrape-1"))
    .await
    .unwrap();

  let mut untrusted = tuf_claims();
  untrusted.board_partner = Some("MSI".into());
  untrusted.model_suffix = Some("GAMING X".into());
  s.append_hypothesis(hypothesis(
    "custom build rtx 5090",
    "openai",
    ts(500), // newer, but lower trust
    untrusted,
  ))
  .await
  .unwrap();

  let mut trusted = tuf_claims();
  trusted.board_partner = Some("GIGABYTE".into());
  trusted.model_suffix = Some("WINDFORCE".into());
  s.append_hypothesis(hypothesis(
    "custom build rtx 5090",
    "perplexity_ai",
    ts(10),
    trusted,
  ))
  .await
  .unwrap();

  let report = resolve(&r).await;
  assert_eq!(report.counts.linked, 1);

  let chips = s.list_chips().await.unwrap();
  let variants = s.list_variants(&chips[0].chip_id).await.unwrap();
  assert_eq!(variants.len(), 1);
  assert_eq!(variants[0].board_partner, "GIGABYTE");
  assert_eq!(variants[0].model_suffix.as_deref(), Some("WINDFORCE"));
}

#[tokio::test]
async fn recency_breaks_ties_within_a_source() {
  let r = resolver().await;
  let s = r.store();

  s.append_observation(observation("custom build rtx 5090", ts(0), "scrape-1"))
    .await
    .unwrap();

  let mut older = tuf_claims();
  older.board_partner = Some("MSI".into());
  s.append_hypothesis(hypothesis(
    "custom build rtx 5090",
    "perplexity_ai",
    ts(10),
    older,
  ))
  .await
  .unwrap();

  let mut newer = tuf_claims();
  newer.board_partner = Some("ZOTAC".into());
  s.append_hypothesis(hypothesis(
    "custom build rtx 5090",
    "perplexity_ai",
    ts(900),
    newer,
  ))
  .await
  .unwrap();

  resolve(&r).await;

  let chips = s.list_chips().await.unwrap();
  let variants = s.list_variants(&chips[0].chip_id).await.unwrap();
  assert_eq!(variants[0].board_partner, "ZOTAC");
}

// ─── No-merge guarantees ─────────────────────────────────────────────────────

#[tokio::test]
async fn different_suffixes_never_share_a_variant() {
  let r = resolver().await;
  let s = r.store();

  s.append_observation(observation("ASUS TUF RTX 5090 OC", ts(0), "scrape-1"))
    .await
    .unwrap();
  s.append_hypothesis(hypothesis(
    "ASUS TUF RTX 5090 OC",
    "perplexity_ai",
    ts(10),
    tuf_claims(),
  ))
  .await
  .unwrap();

  s.append_observation(observation("ASUS ROG Strix RTX 5090", ts(5), "scrape-1"))
    .await
    .unwrap();
  let mut strix = tuf_claims();
  strix.model_suffix = Some("ROG Strix".into());
  s.append_hypothesis(hypothesis(
    "ASUS ROG Strix RTX 5090",
    "perplexity_ai",
    ts(10),
    strix,
  ))
  .await
  .unwrap();

  let report = resolve(&r).await;
  assert_eq!(report.counts.linked, 2);
  assert_eq!(report.counts.chips_created, 1);
  assert_eq!(report.counts.variants_created, 2);

  let chips = s.list_chips().await.unwrap();
  assert_eq!(chips.len(), 1);
  let variants = s.list_variants(&chips[0].chip_id).await.unwrap();
  assert_eq!(variants.len(), 2);
  assert_ne!(variants[0].variant_id, variants[1].variant_id);
}

#[tokio::test]
async fn vram_separates_chip_identities() {
  let r = resolver().await;
  let s = r.store();

  for (description, vram) in [
    ("MSI RTX 5060 Ti GAMING 16GB", 16u16),
    ("MSI RTX 5060 Ti GAMING 8GB", 8u16),
  ] {
    s.append_observation(observation(description, ts(0), "scrape-1"))
      .await
      .unwrap();
    let claims = ClaimedAttributes {
      vendor: Some("NVIDIA".into()),
      model_name: Some("RTX 5060 Ti".into()),
      vram_gb: Some(vram),
      board_partner: Some("MSI".into()),
      model_suffix: Some("Gaming".into()),
      ..Default::default()
    };
    s.append_hypothesis(hypothesis(description, "perplexity_ai", ts(10), claims))
      .await
      .unwrap();
  }

  let report = resolve(&r).await;
  assert_eq!(report.counts.linked, 2);
  assert_eq!(report.counts.chips_created, 2);

  let chips = s.list_chips().await.unwrap();
  assert_eq!(chips.len(), 2);
  let keys: Vec<_> = chips.iter().map(|c| c.model_key.as_str()).collect();
  assert!(keys.contains(&"5060 ti 16 gb"));
  assert!(keys.contains(&"5060 ti 8 gb"));
}

// ─── Ambiguity fails closed ──────────────────────────────────────────────────

#[test]
fn ambiguous_candidates_are_never_guessed() {
  let candidates = [
    ChipCandidate { chip_id: "chip_a".into(), vram_gb: Some(16) },
    ChipCandidate { chip_id: "chip_b".into(), vram_gb: Some(8) },
  ];

  assert_eq!(select_chip(&candidates, None), MatchState::Ambiguous);
  assert_eq!(
    select_chip(&candidates, Some(16)),
    MatchState::Matched("chip_a".into())
  );
  assert_eq!(select_chip(&candidates, Some(4)), MatchState::NoMatch);
  assert_eq!(select_chip(&[], None), MatchState::NoMatch);

  let twins = [
    ChipCandidate { chip_id: "chip_a".into(), vram_gb: Some(16) },
    ChipCandidate { chip_id: "chip_b".into(), vram_gb: Some(16) },
  ];
  assert_eq!(select_chip(&twins, Some(16)), MatchState::Ambiguous);
}

// ─── Lexical fallback ────────────────────────────────────────────────────────

#[tokio::test]
async fn lexical_identity_suffices_when_claims_are_thin() {
  let r = resolver().await;
  let s = r.store();

  s.append_observation(observation("ASUS TUF RTX 5090 OC", ts(0), "scrape-1"))
    .await
    .unwrap();
  // The hypothesis only confirms the board partner; vendor and model come
  // from the description itself.
  let claims = ClaimedAttributes {
    board_partner: Some("ASUS".into()),
    ..Default::default()
  };
  s.append_hypothesis(hypothesis(
    "ASUS TUF RTX 5090 OC",
    "perplexity_ai",
    ts(10),
    claims,
  ))
  .await
  .unwrap();

  let report = resolve(&r).await;
  assert_eq!(report.counts.linked, 1);
  assert_eq!(report.counts.chips_created, 1);

  let chips = s.list_chips().await.unwrap();
  assert_eq!(chips[0].model_name, "RTX 5090");
  let variants = s.list_variants(&chips[0].chip_id).await.unwrap();
  assert_eq!(variants[0].model_suffix.as_deref(), Some("TUF OC"));
}

// ─── Dry run ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn dry_run_decides_but_writes_nothing() {
  let r = resolver().await;
  let s = r.store();

  s.append_observation(observation("ASUS TUF RTX 5090 OC", ts(0), "scrape-1"))
    .await
    .unwrap();
  s.append_hypothesis(hypothesis(
    "ASUS TUF RTX 5090 OC",
    "perplexity_ai",
    ts(10),
    tuf_claims(),
  ))
  .await
  .unwrap();

  let report = r
    .resolve_pending(&ResolveOptions { limit: None, dry_run: true })
    .await
    .unwrap();
  assert_eq!(report.counts.linked, 1);
  assert_eq!(report.counts.chips_created, 1);
  assert_eq!(report.counts.variants_created, 1);

  assert!(s.list_chips().await.unwrap().is_empty());
  assert_eq!(s.unresolved_observations(None).await.unwrap().len(), 1);

  // The real run afterwards applies exactly what the dry run reported.
  let report = resolve(&r).await;
  assert_eq!(report.counts.linked, 1);
  assert_eq!(report.counts.chips_created, 1);
}

// ─── Descriptive corrections ─────────────────────────────────────────────────

#[tokio::test]
async fn better_evidence_fills_gaps_but_never_overwrites() {
  let r = resolver().await;
  let s = r.store();

  s.append_observation(observation("ASUS TUF RTX 5090 OC", ts(0), "scrape-1"))
    .await
    .unwrap();
  s.append_hypothesis(hypothesis(
    "ASUS TUF RTX 5090 OC",
    "perplexity_ai",
    ts(10),
    tuf_claims(),
  ))
  .await
  .unwrap();
  resolve(&r).await;

  let chip = s.list_chips().await.unwrap().remove(0);
  assert_eq!(chip.tdp_watts, None);

  // A later sighting carries a TDP claim: the gap fills.
  s.append_observation(observation("ASUS TUF RTX 5090 OC", ts(3600), "scrape-2"))
    .await
    .unwrap();
  let mut with_tdp = tuf_claims();
  with_tdp.tdp_watts = Some(575);
  s.append_hypothesis(hypothesis(
    "ASUS TUF RTX 5090 OC",
    "perplexity_ai",
    ts(3700),
    with_tdp,
  ))
  .await
  .unwrap();
  resolve(&r).await;

  let chip = s.get_chip(&chip.chip_id).await.unwrap().unwrap();
  assert_eq!(chip.tdp_watts, Some(575));

  // A contradicting later claim does not overwrite the established value.
  s.append_observation(observation("ASUS TUF RTX 5090 OC", ts(7200), "scrape-3"))
    .await
    .unwrap();
  let mut contradicting = tuf_claims();
  contradicting.tdp_watts = Some(600);
  s.append_hypothesis(hypothesis(
    "ASUS TUF RTX 5090 OC",
    "perplexity_ai",
    ts(7300),
    contradicting,
  ))
  .await
  .unwrap();
  resolve(&r).await;

  let chip = s.get_chip(&chip.chip_id).await.unwrap().unwrap();
  assert_eq!(chip.tdp_watts, Some(575));
}
