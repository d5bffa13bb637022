//! # Statforge Core
//!
//! The incremental aggregate rollup engine. Derives read-optimized
//! rollup tables (period totals, per-map totals, hourly activity
//! profiles, Top-3 leaderboards, per-server bests) from an append-heavy
//! raw log of game-round participation records held in an embedded
//! SQLite store.
//!
//! ## Overview
//!
//! - **Recomputation routines** (one per rollup shape) replace rollup
//!   rows idempotently from a bounded slice of the raw log.
//! - **Backfill orchestrator** rebuilds everything from history,
//!   recency tier by recency tier, in bounded resumable batches.
//! - **Incremental refresher** re-runs every routine daily over a short
//!   trailing window.
//! - **Retention pruner** ages out stale leaderboard rows and old
//!   hourly observations in bounded batches.
//! - **Lease coordinator** serializes writers per rollup category so
//!   concurrent jobs never interleave writes to the same tables.

pub mod database;
pub mod engine;
pub mod error;
pub mod lease;
pub mod rollup;
pub mod settings;

pub use database::Database;
pub use engine::Engine;
pub use error::{Result, RollupError};
pub use lease::LeaseCoordinator;
pub use settings::EngineSettings;

/// Embedded migrations for the statforge schema.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
