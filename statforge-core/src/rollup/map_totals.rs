//! Recomputation of per-subject, per-map totals.
//!
//! Every record contributes two dimension rows: one scoped to its
//! server and one under the cross-server [`GLOBAL_SCOPE`] sentinel, so
//! readers never need a special aggregation path for "all servers".

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use statforge_model::{
    GLOBAL_SCOPE, MonthBucket, SubjectId, SubjectMapTotals,
};

use crate::database::Database;
use crate::database::map_totals::MapTotalsRepository;
use crate::database::participation::{
    RawLogFilter, RawLogReadPort, SqliteRawLog,
};
use crate::error::Result;

use super::{
    RecomputeOutcome, RecomputeRoutine, RecomputeScope, RollupShape,
    TotalsAcc,
};

pub struct MapTotalsRoutine {
    raw: Arc<dyn RawLogReadPort>,
    repo: MapTotalsRepository,
}

impl MapTotalsRoutine {
    pub fn new(db: Database) -> Self {
        Self {
            raw: Arc::new(SqliteRawLog::new(db.clone())),
            repo: MapTotalsRepository::new(db),
        }
    }
}

impl std::fmt::Debug for MapTotalsRoutine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapTotalsRoutine").finish_non_exhaustive()
    }
}

#[async_trait]
impl RecomputeRoutine for MapTotalsRoutine {
    fn shape(&self) -> RollupShape {
        RollupShape::MapTotals
    }

    async fn recompute(
        &self,
        scope: RecomputeScope<'_>,
    ) -> Result<RecomputeOutcome> {
        let from_bucket = scope.since.map(MonthBucket::of);
        let filter =
            RawLogFilter::since(from_bucket.map(|bucket| bucket.start()))
                .for_subjects(scope.subjects);

        let records = self.raw.records(filter).await?;

        type Key = (SubjectId, String, String, MonthBucket);
        let mut skipped = 0u64;
        let mut acc: BTreeMap<Key, TotalsAcc> = BTreeMap::new();
        for record in &records {
            if !record.is_well_formed() {
                skipped += 1;
                continue;
            }
            let bucket = MonthBucket::of(record.ended_at);
            for scope_value in [
                record.server_id.to_string(),
                GLOBAL_SCOPE.to_string(),
            ] {
                acc.entry((
                    record.subject_id,
                    record.map_name.clone(),
                    scope_value,
                    bucket,
                ))
                .or_default()
                .observe(record);
            }
        }

        let rows: Vec<SubjectMapTotals> = acc
            .into_iter()
            .map(|((subject_id, map_name, server_scope, bucket), totals)| {
                let (kd_ratio, kills_per_minute) = totals.ratios();
                SubjectMapTotals {
                    subject_id,
                    map_name,
                    server_scope,
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
