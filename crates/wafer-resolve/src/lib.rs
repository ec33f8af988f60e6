//! The wafer resolution engine.
//!
//! Maps one piece of evidence — a raw observation's description plus whatever
//! hypotheses exist for it — to exactly one canonical variant, creating
//! catalog records only when warranted. Deterministic and idempotent:
//! re-resolving the same evidence against the same catalog state yields the
//! same variant id and creates nothing new.

pub mod engine;
pub mod rank;

pub use engine::{Outcome, ResolveOptions, Resolver};
pub use rank::RankingPolicy;

#[cfg(test)]
mod tests;
