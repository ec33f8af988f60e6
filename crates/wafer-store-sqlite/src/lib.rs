//! SQLite backend for the wafer catalog and evidence store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! thread without blocking the async runtime. One connection serializes all
//! writes, which is what makes compare-and-create identity races resolve to
//! first-writer-wins.

mod encode;
mod schema;
mod store;
mod views;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
