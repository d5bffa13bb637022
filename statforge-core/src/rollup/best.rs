//! Per-server best-round recomputation.
//!
//! The argmax rollup: each subject's highest-scoring round per server,
//! with a back-reference to the source round. A full pass replaces the
//! scoped rows from complete history; a windowed pass merges, letting
//! an existing row survive unless a candidate strictly beats it.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use statforge_model::{ServerId, SubjectId, SubjectServerBest};

use crate::database::Database;
use crate::database::best::BestRepository;
use crate::database::participation::{
    RawLogFilter, RawLogReadPort, SqliteRawLog,
};
use crate::error::Result;

use super::{RecomputeOutcome, RecomputeRoutine, RecomputeScope, RollupShape};

pub struct ServerBestRoutine {
    raw: Arc<dyn RawLogReadPort>,
    repo: BestRepository,
}

impl ServerBestRoutine {
    pub fn new(db: Database) -> Self {
        Self {
            raw: Arc::new(SqliteRawLog::new(db.clone())),
            repo: BestRepository::new(db),
        }
    }
}

impl std::fmt::Debug for ServerBestRoutine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerBestRoutine").finish_non_exhaustive()
    }
}

#[async_trait]
impl RecomputeRoutine for ServerBestRoutine {
    fn shape(&self) -> RollupShape {
        RollupShape::ServerBest
    }

    async fn recompute(
        &self,
        scope: RecomputeScope<'_>,
    ) -> Result<RecomputeOutcome> {
        let filter =
            RawLogFilter::since(scope.since).for_subjects(scope.subjects);
        let records = self.raw.records(filter).await?;

        let mut skipped = 0u64;
        let mut best: BTreeMap<(SubjectId, ServerId), SubjectServerBest> =
            BTreeMap::new();
        for record in &records {
            if !record.is_well_formed() {
                skipped += 1;
                continue;
            }

            let candidate = SubjectServerBest {
                subject_id: record.subject_id,
                server_id: record.server_id,
                best_score: record.score,
                round_id: record.round_id,
                achieved_at: record.ended_at,
            };

            best.entry((record.subject_id, record.server_id))
                .and_modify(|current| {
                    // Ties keep the round that achieved the score first.
                    if candidate.best_score > current.best_score {
                        *current = candidate.clone();
                    }
                })
                .or_insert(candidate);
        }

        let rows: Vec<SubjectServerBest> = best.into_values().collect();

        let rows_written = if scope.since.is_some() {
            self.repo.merge(&rows, scope.now).await?
        } else {
            self.repo.replace(scope.subjects, &rows, scope.now).await?
        };

        Ok(RecomputeOutcome {
            rows_written,
            records_skipped: skipped,
        })
    }
}
