//! Engine facade: the administrative trigger surface.
//!
//! Wires the routine set, lease coordinator, orchestrator, refresher,
//! and pruner over one database, and exposes the on-demand operations
//! other subsystems call (initial population, disaster recovery,
//! targeted recompute after a retroactive raw-log edit).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use statforge_model::{RecencyTier, SubjectId};

use crate::database::Database;
use crate::error::Result;
use crate::lease::LeaseCoordinator;
use crate::rollup::backfill::{
    BackfillOrchestrator, BackfillReport, SubjectRunReport,
};
use crate::rollup::prune::{PruneReport, RetentionPruner};
use crate::rollup::refresh::{IncrementalRefresher, RunSummary};
use crate::rollup::tiers::TierClassifier;
use crate::rollup::standard_routines;
use crate::settings::EngineSettings;

pub struct Engine {
    db: Database,
    refresher: IncrementalRefresher,
    backfill: BackfillOrchestrator,
    pruner: RetentionPruner,
}

impl Engine {
    pub fn new(db: Database, settings: EngineSettings) -> Result<Self> {
        settings.validate()?;

        let leases = Arc::new(LeaseCoordinator::new());
        let routines = standard_routines(&db, &settings);

        let refresher = IncrementalRefresher::new(
            routines.clone(),
            Arc::clone(&leases),
            settings.clone(),
        );
        let backfill = BackfillOrchestrator::new(
            routines,
            TierClassifier::new(db.clone()),
            Arc::clone(&leases),
            settings.backfill_batch_size,
        );
        let pruner = RetentionPruner::new(db.clone(), leases, settings);

        Ok(Self {
            db,
            refresher,
            backfill,
            pruner,
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Daily incremental refresh over the configured trailing windows.
    pub async fn refresh_now(
        &self,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<RunSummary> {
        self.refresher.run_daily(now, cancel).await
    }

    /// Full historical recomputation, tier by tier.
    pub async fn backfill_full(
        &self,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<BackfillReport> {
        self.backfill.run_full(now, cancel).await
    }

    /// Backfill one recency tier.
    pub async fn backfill_tier(
        &self,
        tier: RecencyTier,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<SubjectRunReport> {
        self.backfill.run_tier(tier, now, cancel).await
    }

    /// Targeted recompute for specific subjects after a retroactive
    /// raw-log change.
    pub async fn backfill_subjects(
        &self,
        subjects: &[SubjectId],
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<SubjectRunReport> {
        self.backfill.run_for_subjects(subjects, now, cancel).await
    }

    /// Weekly retention pruning.
    pub async fn prune_now(
        &self,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<PruneReport> {
        self.pruner.run_weekly(now, cancel).await
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("backfill", &self.backfill)
            .field("refresher", &self.refresher)
            .field("pruner", &self.pruner)
            .finish_non_exhaustive()
    }
}
