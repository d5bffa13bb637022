//! Weekly retention pruning.
//!
//! Two jobs: drop Top-K rows whose rolling window moved past them
//! (the window boundary shifts with the calendar even without new raw
//! data), and age out hourly observation rows beyond the retention
//! horizon. Observation deletes run in bounded batches with a short
//! pause in between so the shared store never holds a long write lock.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::info;

use statforge_model::RollingPeriod;

use crate::database::Database;
use crate::database::hourly::HourlyRepository;
use crate::database::top_rounds::TopRoundsRepository;
use crate::error::{Result, RollupError};
use crate::lease::LeaseCoordinator;
use crate::settings::EngineSettings;

use super::RollupShape;

#[derive(Debug, Clone)]
pub struct PruneReport {
    pub stale_top_rounds: u64,
    pub observation_rows: u64,
    pub observation_batches: u32,
    pub elapsed: Duration,
}

pub struct RetentionPruner {
    top_rounds: TopRoundsRepository,
    hourly: HourlyRepository,
    leases: Arc<LeaseCoordinator>,
    settings: EngineSettings,
}

impl RetentionPruner {
    pub fn new(
        db: Database,
        leases: Arc<LeaseCoordinator>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            top_rounds: TopRoundsRepository::new(db.clone()),
            hourly: HourlyRepository::new(db),
            leases,
            settings,
        }
    }

    pub async fn run_weekly(
        &self,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<PruneReport> {
        let run_start = Instant::now();

        let mut stale_top_rounds = 0u64;
        for period in RollingPeriod::ALL {
            let window_start = period.window_start(now);
            stale_top_rounds += self
                .leases
                .with_lease(
                    RollupShape::TopRounds.lease_category(),
                    self.top_rounds.delete_stale(period, window_start),
                )
                .await?;
        }
        if stale_top_rounds > 0 {
            info!(stale_top_rounds, "pruned stale leaderboard entries");
        }

        let cutoff = (now
            - chrono::Duration::days(
                self.settings.observation_retention_days,
            ))
        .date_naive();

        let mut observation_rows = 0u64;
        let mut observation_batches = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(RollupError::Cancelled(
                    "weekly pruning".into(),
                ));
            }

            // Lease per batch: the refresher can interleave between
            // batches instead of waiting for the whole prune.
            let deleted = self
                .leases
                .with_lease(
                    RollupShape::HourlyActivity.lease_category(),
                    self.hourly.delete_observations_older_than(
                        cutoff,
                        self.settings.prune_batch_size,
                    ),
                )
                .await?;

            if deleted == 0 {
                break;
            }

            observation_rows += deleted;
            observation_batches += 1;
            info!(
                batch = observation_batches,
                deleted, "pruned observation batch"
            );
            tokio::time::sleep(self.settings.prune_pause()).await;
        }

        let report = PruneReport {
            stale_top_rounds,
            observation_rows,
            observation_batches,
            elapsed: run_start.elapsed(),
        };
        info!(
            stale_top_rounds = report.stale_top_rounds,
            observation_rows = report.observation_rows,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "weekly pruning complete"
        );
        Ok(report)
    }
}

impl std::fmt::Debug for RetentionPruner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetentionPruner")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
