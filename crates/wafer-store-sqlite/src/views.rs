//! Derived-view queries — stateless projections over the catalog and the
//! evidence store.
//!
//! Nothing here retains state between rebuilds: each call recomputes from
//! source rows with a total ordering, so rebuilding twice from identical data
//! yields identical output.

use wafer_core::store::{DerivedViews, LatestPrice, ValueMetric};

use crate::{
  Result, SqliteStore,
  encode::{decode_dt, decode_stock_status, decode_vendor},
};

struct RawLatest {
  variant_id:     String,
  retailer:       String,
  observation_id: String,
  price_eur:      f64,
  currency:       String,
  stock_status:   String,
  observed_at:    String,
  url:            String,
}

struct RawValue {
  variant_id:    String,
  chip_id:       String,
  vendor:        String,
  model_name:    String,
  board_partner: String,
  price_eur:     f64,
  retailer:      String,
  vram_gb:       Option<u16>,
}

impl DerivedViews for SqliteStore {
  async fn latest_prices(&self) -> Result<Vec<LatestPrice>> {
    let raws: Vec<RawLatest> = self
      .connection()
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT variant_id, retailer, observation_id, price_eur, currency,
                  stock_status, observed_at, url
           FROM (
             SELECT variant_id, retailer, observation_id, price_eur, currency,
                    stock_status, observed_at, url,
                    ROW_NUMBER() OVER (
                      PARTITION BY variant_id, retailer
                      ORDER BY observed_at DESC, seq DESC
                    ) AS pair_rank
             FROM market_observation
             WHERE variant_id IS NOT NULL
           )
           WHERE pair_rank = 1
           ORDER BY variant_id, retailer",
        )?;
        let rows = stmt
          .query_map([], |row| {
            Ok(RawLatest {
              variant_id:     row.get(0)?,
              retailer:       row.get(1)?,
              observation_id: row.get(2)?,
              price_eur:      row.get(3)?,
              currency:       row.get(4)?,
              stock_status:   row.get(5)?,
              observed_at:    row.get(6)?,
              url:            row.get(7)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(|raw| {
        Ok(LatestPrice {
          variant_id:     raw.variant_id,
          retailer:       raw.retailer,
          observation_id: raw.observation_id,
          price_eur:      raw.price_eur,
          currency:       raw.currency,
          stock_status:   decode_stock_status(&raw.stock_status)?,
          observed_at:    decode_dt(&raw.observed_at)?,
          url:            raw.url,
        })
      })
      .collect()
  }

  async fn value_metrics(&self) -> Result<Vec<ValueMetric>> {
    let raws: Vec<RawValue> = self
      .connection()
      .call(|conn| {
        let mut stmt = conn.prepare(
          "WITH latest AS (
             SELECT variant_id, retailer, price_eur, stock_status,
                    ROW_NUMBER() OVER (
                      PARTITION BY variant_id, retailer
                      ORDER BY observed_at DESC, seq DESC
                    ) AS pair_rank
             FROM market_observation
             WHERE variant_id IS NOT NULL
           ),
           available AS (
             SELECT variant_id, retailer, price_eur,
                    ROW_NUMBER() OVER (
                      PARTITION BY variant_id
                      ORDER BY price_eur ASC, retailer ASC
                    ) AS price_rank
             FROM latest
             WHERE pair_rank = 1
               AND stock_status IN ('in_stock', 'low_stock')
           )
           SELECT a.variant_id, v.chip_id, c.vendor, c.model_name,
                  v.board_partner, a.price_eur, a.retailer, m.vram_gb
           FROM available a
           JOIN gpu_variant v ON v.variant_id = a.variant_id
           JOIN gpu_chip    c ON c.chip_id    = v.chip_id
           LEFT JOIN gpu_memory m ON m.chip_id = c.chip_id
           WHERE a.price_rank = 1
           ORDER BY a.variant_id",
        )?;
        let rows = stmt
          .query_map([], |row| {
            Ok(RawValue {
              variant_id:    row.get(0)?,
              chip_id:       row.get(1)?,
              vendor:        row.get(2)?,
              model_name:    row.get(3)?,
              board_partner: row.get(4)?,
              price_eur:     row.get(5)?,
              retailer:      row.get(6)?,
              vram_gb:       row.get(7)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(|raw| {
        let eur_per_vram_gb = raw
          .vram_gb
          .filter(|v| *v > 0)
          .map(|v| raw.price_eur / f64::from(v));
        Ok(ValueMetric {
          variant_id: raw.variant_id,
          chip_id: raw.chip_id,
          vendor: decode_vendor(&raw.vendor)?,
          model_name: raw.model_name,
          board_partner: raw.board_partner,
          best_price_eur: raw.price_eur,
          best_retailer: raw.retailer,
          vram_gb: raw.vram_gb,
          eur_per_vram_gb,
        })
      })
      .collect()
  }
}
