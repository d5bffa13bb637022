//! Tiered historical backfill.
//!
//! Rebuilds every rollup shape from full history, recency tier by
//! recency tier, so the most recently active (and most frequently
//! queried) subjects become correct first. Work happens in bounded
//! subject batches; every batch commits independently, which makes an
//! interrupted backfill safe to resume by re-running the same tier.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use statforge_model::{RecencyTier, SubjectId};

use crate::error::{Result, RollupError};
use crate::lease::LeaseCoordinator;

use super::tiers::TierClassifier;
use super::{
    RecomputeRoutine, RecomputeScope, RollupShape, ShapeReport,
};

/// One failed (shape, batch) pair inside a subject run.
#[derive(Debug, Clone)]
pub struct BatchFailure {
    pub shape: RollupShape,
    pub batch: usize,
    pub message: String,
}

/// Outcome of backfilling one subject set (a tier, or a targeted
/// list). Failures abort the remaining batches but keep what already
/// committed.
#[derive(Debug, Clone)]
pub struct SubjectRunReport {
    pub tier: Option<RecencyTier>,
    pub subjects: usize,
    pub batches_completed: usize,
    pub rows_written: u64,
    pub records_skipped: u64,
    pub elapsed: Duration,
    pub failures: Vec<BatchFailure>,
}

impl SubjectRunReport {
    pub fn succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Outcome of a full backfill across all tiers plus the
/// partition-scoped shapes.
#[derive(Debug, Clone)]
pub struct BackfillReport {
    pub tiers: Vec<SubjectRunReport>,
    pub partition_shapes: Vec<ShapeReport>,
}

impl BackfillReport {
    pub fn succeeded(&self) -> bool {
        self.tiers.iter().all(SubjectRunReport::succeeded)
            && self.partition_shapes.iter().all(ShapeReport::succeeded)
    }
}

pub struct BackfillOrchestrator {
    routines: Vec<Arc<dyn RecomputeRoutine>>,
    classifier: TierClassifier,
    leases: Arc<LeaseCoordinator>,
    batch_size: usize,
}

impl BackfillOrchestrator {
    pub fn new(
        routines: Vec<Arc<dyn RecomputeRoutine>>,
        classifier: TierClassifier,
        leases: Arc<LeaseCoordinator>,
        batch_size: usize,
    ) -> Self {
        Self {
            routines,
            classifier,
            leases,
            batch_size,
        }
    }

    /// Full historical recomputation: tiers 1 through 4 in order, then
    /// the partition-scoped shapes once over complete history.
    pub async fn run_full(
        &self,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<BackfillReport> {
        let mut tiers = Vec::with_capacity(RecencyTier::ALL.len());
        for tier in RecencyTier::ALL {
            if cancel.is_cancelled() {
                return Err(RollupError::Cancelled(format!(
                    "full backfill before {tier}"
                )));
            }
            let report = self.run_tier(tier, now, cancel).await?;
            if !report.succeeded() {
                warn!(%tier, "tier finished with failures; continuing with next tier");
            }
            tiers.push(report);
        }

        let mut partition_shapes = Vec::new();
        for routine in self.partition_scoped() {
            if cancel.is_cancelled() {
                return Err(RollupError::Cancelled(
                    "full backfill before partition shapes".into(),
                ));
            }
            partition_shapes
                .push(self.run_shape_full(routine.as_ref(), now).await);
        }

        Ok(BackfillReport {
            tiers,
            partition_shapes,
        })
    }

    /// Backfill one recency tier in subject batches.
    pub async fn run_tier(
        &self,
        tier: RecencyTier,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<SubjectRunReport> {
        let subjects = self.classifier.subjects_in_tier(tier, now).await?;
        info!(%tier, subjects = subjects.len(), "starting tier backfill");

        let mut report = self
            .run_batches(&subjects, now, cancel, &tier.to_string())
            .await?;
        report.tier = Some(tier);
        Ok(report)
    }

    /// Targeted recomputation after a retroactive raw-log change
    /// (e.g. an administrator soft-deletes a round). Does not scan
    /// tiers.
    pub async fn run_for_subjects(
        &self,
        subjects: &[SubjectId],
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<SubjectRunReport> {
        info!(subjects = subjects.len(), "starting targeted recompute");
        self.run_batches(subjects, now, cancel, "targeted").await
    }

    async fn run_batches(
        &self,
        subjects: &[SubjectId],
        now: DateTime<Utc>,
        cancel: &CancellationToken,
        label: &str,
    ) -> Result<SubjectRunReport> {
        let run_start = Instant::now();
        let mut report = SubjectRunReport {
            tier: None,
            subjects: subjects.len(),
            batches_completed: 0,
            rows_written: 0,
            records_skipped: 0,
            elapsed: Duration::ZERO,
            failures: Vec::new(),
        };

        let total_batches = subjects.len().div_ceil(self.batch_size.max(1));

        for (index, batch) in
            subjects.chunks(self.batch_size.max(1)).enumerate()
        {
            if cancel.is_cancelled() {
                return Err(RollupError::Cancelled(format!(
                    "{label} backfill at batch {}/{total_batches}",
                    index + 1
                )));
            }

            let batch_start = Instant::now();
            let mut batch_failed = false;

            for routine in self.subject_scoped() {
                let shape = routine.shape();
                let scope = RecomputeScope::for_subjects(batch, now);
                let result = self
                    .leases
                    .with_lease(
                        shape.lease_category(),
                        routine.recompute(scope),
                    )
                    .await;

                match result {
                    Ok(outcome) => {
                        report.rows_written += outcome.rows_written;
                        report.records_skipped += outcome.records_skipped;
                    }
                    Err(err) => {
                        error!(%shape, batch = index + 1, error = %err, "batch recompute failed");
                        report.failures.push(BatchFailure {
                            shape,
                            batch: index + 1,
                            message: err.to_string(),
                        });
                        batch_failed = true;
                    }
                }
            }

            report.batches_completed += 1;
            info!(
                label,
                batch = index + 1,
                total_batches,
                subjects = batch.len(),
                rows_written = report.rows_written,
                elapsed_ms = batch_start.elapsed().as_millis() as u64,
                "backfill batch complete"
            );

            if batch_failed {
                warn!(
                    label,
                    batch = index + 1,
                    "aborting remaining batches after failure"
                );
                break;
            }
        }

        report.elapsed = run_start.elapsed();
        Ok(report)
    }

    async fn run_shape_full(
        &self,
        routine: &dyn RecomputeRoutine,
        now: DateTime<Utc>,
    ) -> ShapeReport {
        let shape = routine.shape();
        let start = Instant::now();
        let result = self
            .leases
            .with_lease(
                shape.lease_category(),
                routine.recompute(RecomputeScope::full(now)),
            )
            .await;

        match result {
            Ok(outcome) => ShapeReport {
                shape,
                rows_written: outcome.rows_written,
                records_skipped: outcome.records_skipped,
                duration: start.elapsed(),
                error: None,
            },
            Err(err) => {
                error!(%shape, error = %err, "full recompute failed");
                ShapeReport {
                    shape,
                    rows_written: 0,
                    records_skipped: 0,
                    duration: start.elapsed(),
                    error: Some(err.to_string()),
                }
            }
        }
    }

    fn subject_scoped(
        &self,
    ) -> impl Iterator<Item = &Arc<dyn RecomputeRoutine>> {
        self.routines
            .iter()
            .filter(|routine| routine.shape().is_subject_scoped())
    }

    fn partition_scoped(
        &self,
    ) -> impl Iterator<Item = &Arc<dyn RecomputeRoutine>> {
        self.routines
            .iter()
            .filter(|routine| !routine.shape().is_subject_scoped())
    }
}

impl std::fmt::Debug for BackfillOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackfillOrchestrator")
            .field("routines", &self.routines.len())
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}
