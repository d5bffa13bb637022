//! Recomputation of per-subject calendar-month totals.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use statforge_model::{MonthBucket, SubjectId, SubjectPeriodTotals};

use crate::database::Database;
use crate::database::participation::{
    RawLogFilter, RawLogReadPort, SqliteRawLog,
};
use crate::database::period_totals::PeriodTotalsRepository;
use crate::error::Result;

use super::{
    RecomputeOutcome, RecomputeRoutine, RecomputeScope, RollupShape,
    TotalsAcc,
};

pub struct PeriodTotalsRoutine {
    raw: Arc<dyn RawLogReadPort>,
    repo: PeriodTotalsRepository,
}

impl PeriodTotalsRoutine {
    pub fn new(db: Database) -> Self {
        Self {
            raw: Arc::new(SqliteRawLog::new(db.clone())),
            repo: PeriodTotalsRepository::new(db),
        }
    }
}

impl std::fmt::Debug for PeriodTotalsRoutine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeriodTotalsRoutine").finish_non_exhaustive()
    }
}

#[async_trait]
impl RecomputeRoutine for PeriodTotalsRoutine {
    fn shape(&self) -> RollupShape {
        RollupShape::PeriodTotals
    }

    async fn recompute(
        &self,
        scope: RecomputeScope<'_>,
    ) -> Result<RecomputeOutcome> {
        // Widen the bound to the containing month so every recomputed
        // bucket is derived from its complete record set.
        let from_bucket = scope.since.map(MonthBucket::of);
        let filter =
            RawLogFilter::since(from_bucket.map(|bucket| bucket.start()))
                .for_subjects(scope.subjects);

        let records = self.raw.records(filter).await?;

        let mut skipped = 0u64;
        let mut acc: BTreeMap<(SubjectId, MonthBucket), TotalsAcc> =
            BTreeMap::new();
        for record in &records {
            if !record.is_well_formed() {
                skipped += 1;
                continue;
            }
            acc.entry((record.subject_id, MonthBucket::of(record.ended_at)))
                .or_default()
                .observe(record);
        }

        let rows: Vec<SubjectPeriodTotals> = acc
            .into_iter()
            .map(|((subject_id, bucket), totals)| {
                let (kd_ratio, kills_per_minute) = totals.ratios();
                SubjectPeriodTotals {
                    subject_id,
                    year: bucket.year,
                    month: bucket.month,
                    rounds: totals.rounds,
                    kills: totals.kills,
                    deaths: totals.deaths,
                    score: totals.score,
                    minutes: totals.minutes,
                    kd_ratio,
                    kills_per_minute,
                }
            })
            .collect();

        let rows_written = self
            .repo
            .replace(scope.subjects, from_bucket, &rows, scope.now)
            .await?;

        Ok(RecomputeOutcome {
            rows_written,
            records_skipped: skipped,
        })
    }
}
