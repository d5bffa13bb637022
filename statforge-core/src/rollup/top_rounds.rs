//! Top-3 leaderboard maintenance.
//!
//! For each rolling period the routine re-derives a subject's best
//! rounds from the raw log within the period's calendar window and
//! replaces the persisted set wholesale: delete fully precedes insert
//! for the scoped subjects, under the leaderboards lease, so readers
//! never observe a partially rebuilt leaderboard.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use statforge_model::{
    ParticipationRecord, RollingPeriod, SubjectId, TopRoundEntry,
};

use crate::database::Database;
use crate::database::participation::{
    RawLogFilter, RawLogReadPort, SqliteRawLog,
};
use crate::database::top_rounds::TopRoundsRepository;
use crate::error::Result;

use super::{RecomputeOutcome, RecomputeRoutine, RecomputeScope, RollupShape};

const TOP_K: usize = 3;

pub struct TopRoundsRoutine {
    raw: Arc<dyn RawLogReadPort>,
    repo: TopRoundsRepository,
}

impl TopRoundsRoutine {
    pub fn new(db: Database) -> Self {
        Self {
            raw: Arc::new(SqliteRawLog::new(db.clone())),
            repo: TopRoundsRepository::new(db),
        }
    }
}

impl std::fmt::Debug for TopRoundsRoutine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopRoundsRoutine").finish_non_exhaustive()
    }
}

#[async_trait]
impl RecomputeRoutine for TopRoundsRoutine {
    fn shape(&self) -> RollupShape {
        RollupShape::TopRounds
    }

    async fn recompute(
        &self,
        scope: RecomputeScope<'_>,
    ) -> Result<RecomputeOutcome> {
        let mut rows_written = 0u64;
        let mut records_skipped = 0u64;

        // The window comes from the period label and `now`, never from
        // `scope.since`: a rolling window's lower bound moves with the
        // calendar, not with the refresh cadence.
        for period in RollingPeriod::ALL {
            let window_start = period.window_start(scope.now);
            let filter = RawLogFilter::since(Some(window_start))
                .for_subjects(scope.subjects);
            let records = self.raw.records(filter).await?;

            let mut by_subject: BTreeMap<
                SubjectId,
                Vec<&ParticipationRecord>,
            > = BTreeMap::new();
            for record in &records {
                if !record.is_well_formed() {
                    records_skipped += 1;
                    continue;
                }
                by_subject
                    .entry(record.subject_id)
                    .or_default()
                    .push(record);
            }

            let mut rows = Vec::new();
            for (subject_id, mut subject_records) in by_subject {
                // Score descending; equal scores break to the most
                // recent round first.
                subject_records.sort_by(|a, b| {
                    b.score
                        .cmp(&a.score)
                        .then(b.ended_at.cmp(&a.ended_at))
                });

                for (index, record) in
                    subject_records.iter().take(TOP_K).enumerate()
                {
                    rows.push(TopRoundEntry {
                        subject_id,
                        period,
                        rank: (index + 1) as i64,
                        round_id: record.round_id,
                        server_id: record.server_id,
                        map_name: record.map_name.clone(),
                        score: record.score,
                        kills: record.kills,
                        deaths: record.deaths,
                        achieved_at: record.ended_at,
                    });
                }
            }

            rows_written += self
                .repo
                .replace_for_period(period, scope.subjects, &rows, scope.now)
                .await?;
        }

        Ok(RecomputeOutcome {
            rows_written,
            records_skipped,
        })
    }
}
