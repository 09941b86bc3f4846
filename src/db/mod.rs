//! Database module for upwatch.
//!
//! Provides the SQLite-backed history store.

mod models;
mod store;

pub use models::*;
pub use store::*;
