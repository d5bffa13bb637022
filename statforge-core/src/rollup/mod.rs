//! Recomputation routines and the batch jobs that drive them.
//!
//! One routine exists per rollup shape. Each derives its rollup rows
//! from a bounded slice of the raw participation log and replaces the
//! matching key set idempotently: calling a routine twice with the
//! same arguments leaves byte-identical persisted state.

pub mod backfill;
pub mod best;
pub mod hourly;
pub mod map_totals;
pub mod percentile;
pub mod period_totals;
pub mod prune;
pub mod refresh;
pub mod tiers;
pub mod top_rounds;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use statforge_model::SubjectId;

use crate::database::Database;
use crate::error::Result;
use crate::settings::EngineSettings;

/// The fixed set of rollup shapes this engine maintains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RollupShape {
    PeriodTotals,
    MapTotals,
    HourlyActivity,
    TopRounds,
    ServerBest,
}

impl RollupShape {
    pub const ALL: [RollupShape; 5] = [
        RollupShape::PeriodTotals,
        RollupShape::MapTotals,
        RollupShape::HourlyActivity,
        RollupShape::TopRounds,
        RollupShape::ServerBest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RollupShape::PeriodTotals => "subject-period-totals",
            RollupShape::MapTotals => "subject-map-totals",
            RollupShape::HourlyActivity => "hourly-activity",
            RollupShape::TopRounds => "top-rounds",
            RollupShape::ServerBest => "server-best",
        }
    }

    /// The coarse lease name guarding this shape's tables. One lease
    /// per rollup category, shared by every caller that writes it.
    pub fn lease_category(&self) -> &'static str {
        match self {
            RollupShape::PeriodTotals => "player-aggregates",
            RollupShape::MapTotals => "map-statistics",
            RollupShape::HourlyActivity => "hourly-activity",
            RollupShape::TopRounds => "leaderboards",
            RollupShape::ServerBest => "server-best",
        }
    }

    /// Subject-scoped shapes participate in per-subject backfill
    /// batches; partition-scoped shapes (hourly activity) have no
    /// subject axis and run once per full pass instead.
    pub fn is_subject_scoped(&self) -> bool {
        !matches!(self, RollupShape::HourlyActivity)
    }
}

impl std::fmt::Display for RollupShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a recomputation pass should cover.
///
/// `now` is injected rather than read from the clock so that window
/// math is a pure function of its inputs.
#[derive(Debug, Clone, Copy)]
pub struct RecomputeScope<'a> {
    /// Window lower bound; `None` recomputes from full history.
    pub since: Option<DateTime<Utc>>,
    /// Restrict to these subjects; `None` covers all subjects.
    pub subjects: Option<&'a [SubjectId]>,
    pub now: DateTime<Utc>,
}

impl<'a> RecomputeScope<'a> {
    pub fn full(now: DateTime<Utc>) -> Self {
        Self {
            since: None,
            subjects: None,
            now,
        }
    }

    pub fn window(since: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            since: Some(since),
            subjects: None,
            now,
        }
    }

    pub fn for_subjects(
        subjects: &'a [SubjectId],
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            since: None,
            subjects: Some(subjects),
            now,
        }
    }
}

/// Outcome of one recomputation pass, reported as a value rather than
/// signalled through control flow.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecomputeOutcome {
    pub rows_written: u64,
    /// Malformed raw records skipped during aggregation.
    pub records_skipped: u64,
}

/// Per-shape telemetry record aggregated by the refresher and
/// backfill orchestrator.
#[derive(Debug, Clone)]
pub struct ShapeReport {
    pub shape: RollupShape,
    pub rows_written: u64,
    pub records_skipped: u64,
    pub duration: Duration,
    pub error: Option<String>,
}

impl ShapeReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// A recomputation routine for one rollup shape.
#[async_trait]
pub trait RecomputeRoutine: Send + Sync {
    fn shape(&self) -> RollupShape;

    async fn recompute(
        &self,
        scope: RecomputeScope<'_>,
    ) -> Result<RecomputeOutcome>;
}

/// The standard routine set, one per shape, in refresh order.
pub fn standard_routines(
    db: &Database,
    settings: &EngineSettings,
) -> Vec<Arc<dyn RecomputeRoutine>> {
    vec![
        Arc::new(period_totals::PeriodTotalsRoutine::new(db.clone())),
        Arc::new(map_totals::MapTotalsRoutine::new(db.clone())),
        Arc::new(hourly::HourlyActivityRoutine::new(
            db.clone(),
            settings.min_sample_count,
        )),
        Arc::new(top_rounds::TopRoundsRoutine::new(db.clone())),
        Arc::new(best::ServerBestRoutine::new(db.clone())),
    ]
}

/// Running counter sums shared by the totals routines.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct TotalsAcc {
    pub rounds: i64,
    pub kills: i64,
    pub deaths: i64,
    pub score: i64,
    pub minutes: i64,
}

impl TotalsAcc {
    pub fn observe(&mut self, record: &statforge_model::ParticipationRecord) {
        self.rounds += 1;
        self.kills += record.kills;
        self.deaths += record.deaths;
        self.score += record.score;
        self.minutes += record.minutes();
    }

    /// (kd_ratio, kills_per_minute), rounded for storage.
    pub fn ratios(&self) -> (f64, f64) {
        (
            round3(safe_ratio(self.kills, self.deaths)),
            round3(safe_ratio(self.kills, self.minutes)),
        )
    }
}

/// Integer-safe ratio: a zero denominator yields the numerator itself
/// (and therefore zero when the numerator is zero), never an error or
/// infinity.
pub fn safe_ratio(numerator: i64, denominator: i64) -> f64 {
    if denominator == 0 {
        numerator as f64
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Round to 3 decimal digits for storage.
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
