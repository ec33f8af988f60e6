//! Core types and trait definitions for the wafer GPU market catalog.
//!
//! This crate is deliberately free of database and I/O dependencies.
//! All other crates depend on it; it depends on nothing proprietary.

pub mod chip;
pub mod error;
pub mod evidence;
pub mod fingerprint;
pub mod identity;
pub mod normalize;
pub mod run;
pub mod store;
pub mod variant;

pub use error::{Error, Result};
