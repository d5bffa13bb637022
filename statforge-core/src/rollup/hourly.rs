//! Recomputation of the hourly activity distribution.
//!
//! Two stages: first derive daily observations (distinct subjects
//! active per server per clock hour of each calendar day) from the raw
//! log, then aggregate every stored observation into per-(server,
//! weekday, hour) percentile profiles. The observation table is the
//! bounded history the profiles are statistically grounded on; the
//! retention pruner ages it out.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate, Timelike};

use statforge_model::{
    HourlyObservation, HourlyProfileRow, ServerId, SubjectId,
};

use crate::database::Database;
use crate::database::hourly::HourlyRepository;
use crate::database::participation::{
    RawLogFilter, RawLogReadPort, SqliteRawLog,
};
use crate::error::Result;

use super::{
    RecomputeOutcome, RecomputeRoutine, RecomputeScope, RollupShape,
    percentile, round3,
};

pub struct HourlyActivityRoutine {
    raw: Arc<dyn RawLogReadPort>,
    repo: HourlyRepository,
    min_sample_count: i64,
}

impl HourlyActivityRoutine {
    pub fn new(db: Database, min_sample_count: i64) -> Self {
        Self {
            raw: Arc::new(SqliteRawLog::new(db.clone())),
            repo: HourlyRepository::new(db),
            min_sample_count,
        }
    }
}

impl std::fmt::Debug for HourlyActivityRoutine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HourlyActivityRoutine")
            .field("min_sample_count", &self.min_sample_count)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RecomputeRoutine for HourlyActivityRoutine {
    fn shape(&self) -> RollupShape {
        RollupShape::HourlyActivity
    }

    async fn recompute(
        &self,
        scope: RecomputeScope<'_>,
    ) -> Result<RecomputeOutcome> {
        // Align the window to a day boundary so recomputed dates are
        // derived from their complete record sets.
        let from_date = scope.since.map(|since| since.date_naive());
        let filter = RawLogFilter::since(from_date.map(|date| {
            date.and_hms_opt(0, 0, 0)
                .expect("midnight exists for every date")
                .and_utc()
        }));

        let records = self.raw.records(filter).await?;

        let mut skipped = 0u64;
        let mut slots: BTreeMap<
            (ServerId, NaiveDate, u32),
            HashSet<SubjectId>,
        > = BTreeMap::new();

        for record in &records {
            if !record.is_well_formed() {
                skipped += 1;
                continue;
            }

            // A subject is active in every hour slot its round overlaps.
            let mut slot = record
                .started_at
                .date_naive()
                .and_hms_opt(record.started_at.hour(), 0, 0)
                .expect("hour slot start exists")
                .and_utc();
            loop {
                slots
                    .entry((
                        record.server_id,
                        slot.date_naive(),
                        slot.hour(),
                    ))
                    .or_default()
                    .insert(record.subject_id);
                slot += Duration::hours(1);
                if slot >= record.ended_at {
                    break;
                }
            }
        }

        let observations: Vec<HourlyObservation> = slots
            .into_iter()
            .map(|((server_id, observed_date, hour), subjects)| {
                HourlyObservation {
                    server_id,
                    observed_date,
                    hour,
                    active_subjects: subjects.len() as i64,
                }
            })
            // An incremental pass only replaces dates inside the
            // window; slots a straddling round touched before the
            // window belong to already-finalized dates.
            .filter(|obs| {
                from_date.is_none_or(|from| obs.observed_date >= from)
            })
            .collect();

        let mut rows_written = self
            .repo
            .replace_observations(from_date, &observations)
            .await?;

        rows_written += self.rebuild_profiles(scope).await?;

        Ok(RecomputeOutcome {
            rows_written,
            records_skipped: skipped,
        })
    }
}

impl HourlyActivityRoutine {
    /// Aggregate the full observation table into per-slot profiles.
    async fn rebuild_profiles(
        &self,
        scope: RecomputeScope<'_>,
    ) -> Result<u64> {
        let observations = self.repo.all_observations().await?;

        let mut groups: BTreeMap<(ServerId, u32, u32), Vec<i64>> =
            BTreeMap::new();
        for obs in &observations {
            let weekday =
                obs.observed_date.weekday().num_days_from_monday();
            groups
                .entry((obs.server_id, weekday, obs.hour))
                .or_default()
                .push(obs.active_subjects);
        }

        let profiles: Vec<HourlyProfileRow> = groups
            .into_iter()
            .filter(|(_, samples)| {
                samples.len() as i64 >= self.min_sample_count
            })
            .map(|((server_id, weekday, hour), samples)| {
                let count = samples.len() as i64;
                let sum: i64 = samples.iter().sum();
                let floats: Vec<f64> =
                    samples.iter().map(|&v| v as f64).collect();
                HourlyProfileRow {
                    server_id,
                    weekday,
                    hour,
                    avg: round3(sum as f64 / count as f64),
                    min: samples.iter().copied().min().unwrap_or(0),
                    max: samples.iter().copied().max().unwrap_or(0),
                    profile: percentile::profile(&floats),
                    sample_count: count,
                }
            })
            .collect();

        self.repo.replace_profiles(&profiles, scope.now).await
    }
}
