//! Database module for downtrail.
//!
//! Provides SQLite storage for monitors and their heartbeats.

mod models;
mod store;

pub use models::*;
pub use store::*;
