//! SQLite database layer.
//!
//! One pool wrapper plus a repository per rollup family. Rollup tables
//! are write-owned by the recomputation routines in [`crate::rollup`];
//! the raw participation log is read-only from the engine's point of
//! view.

pub mod best;
pub mod hourly;
pub mod map_totals;
pub mod participation;
pub mod period_totals;
pub mod top_rounds;

use std::str::FromStr;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
};

use crate::error::Result;

/// How many rows a single multi-row INSERT carries. Keeps bound
/// parameter counts well under SQLite's limit.
pub(crate) const INSERT_CHUNK: usize = 100;

#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if missing) the embedded store and run pending
    /// migrations.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        crate::MIGRATOR.run(&pool).await?;

        Ok(Self { pool })
    }

    /// Wrap an existing pool. Callers are responsible for migrations.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
