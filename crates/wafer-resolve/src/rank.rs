//! Hypothesis ranking.
//!
//! The tie-break between contradictory hypotheses for one description is an
//! explicit, documented rule: configured source trust first, then recency,
//! then hypothesis id as a total-order backstop. The engine walks hypotheses
//! in this order and uses the first applicable one.

use wafer_core::evidence::Hypothesis;

/// Ordering policy for hypotheses about one description.
#[derive(Debug, Clone, Default)]
pub struct RankingPolicy {
  /// Sources in descending trust. Unlisted sources rank below every listed
  /// one.
  trust_order: Vec<String>,
}

impl RankingPolicy {
  pub fn new(trust_order: Vec<String>) -> Self {
    Self { trust_order }
  }

  /// Position of a source in the trust order; unlisted sources sort last.
  fn trust_rank(&self, source: &str) -> usize {
    self
      .trust_order
      .iter()
      .position(|s| s == source)
      .unwrap_or(self.trust_order.len())
  }

  /// Sort hypotheses best-first: trusted source, then newest `recorded_at`,
  /// then highest `hypothesis_id`. The final key makes the order total, so
  /// identical inputs always rank identically.
  pub fn ranked(&self, mut hypotheses: Vec<Hypothesis>) -> Vec<Hypothesis> {
    hypotheses.sort_by(|a, b| {
      self
        .trust_rank(&a.source)
        .cmp(&self.trust_rank(&b.source))
        .then_with(|| b.recorded_at.cmp(&a.recorded_at))
        .then_with(|| b.hypothesis_id.cmp(&a.hypothesis_id))
    });
    hypotheses
  }
}
