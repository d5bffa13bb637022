//! Write-owned repository for the per-server best-round rollup.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite};

use statforge_model::{SubjectId, SubjectServerBest};

use crate::database::{Database, INSERT_CHUNK};
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct BestRepository {
    db: Database,
}

impl BestRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Full replacement for the scoped subjects, used by backfill and
    /// targeted recomputation where the rows were derived from the
    /// subjects' complete history.
    pub async fn replace(
        &self,
        subjects: Option<&[SubjectId]>,
        rows: &[SubjectServerBest],
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let mut tx = self.db.pool().begin().await?;

        let mut delete = QueryBuilder::<Sqlite>::new(
            "DELETE FROM subject_server_best WHERE 1=1",
        );
        if let Some(subjects) = subjects {
            delete.push(" AND subject_id IN (");
            let mut separated = delete.separated(", ");
            for subject in subjects {
                separated.push_bind(subject.to_uuid());
            }
            delete.push(")");
        }
        delete.build().execute(&mut *tx).await?;

        let mut written = 0u64;
        for chunk in rows.chunks(INSERT_CHUNK) {
            written += Self::insert_chunk(&mut tx, chunk, now, false).await?;
        }

        tx.commit().await?;
        Ok(written)
    }

    /// Merge candidates derived from a trailing window: an existing
    /// row survives unless the candidate strictly beats its score, so
    /// repeated merges of the same window are idempotent.
    pub async fn merge(
        &self,
        rows: &[SubjectServerBest],
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let mut tx = self.db.pool().begin().await?;

        let mut written = 0u64;
        for chunk in rows.chunks(INSERT_CHUNK) {
            written += Self::insert_chunk(&mut tx, chunk, now, true).await?;
        }

        tx.commit().await?;
        Ok(written)
    }

    async fn insert_chunk(
        tx: &mut sqlx::Transaction<'_, Sqlite>,
        chunk: &[SubjectServerBest],
        now: DateTime<Utc>,
        merge: bool,
    ) -> Result<u64> {
        let mut insert = QueryBuilder::<Sqlite>::new(
            "INSERT INTO subject_server_best (subject_id, server_id, \
             best_score, round_id, achieved_at, updated_at) ",
        );
        insert.push_values(chunk, |mut b, row| {
            b.push_bind(row.subject_id.to_uuid())
                .push_bind(row.server_id.to_uuid())
                .push_bind(row.best_score)
                .push_bind(row.round_id.to_uuid())
                .push_bind(row.achieved_at)
                .push_bind(now);
        });
        if merge {
            insert.push(
                " ON CONFLICT (subject_id, server_id) DO UPDATE SET \
                 best_score = excluded.best_score, \
                 round_id = excluded.round_id, \
                 achieved_at = excluded.achieved_at, \
                 updated_at = excluded.updated_at \
                 WHERE excluded.best_score > subject_server_best.best_score",
            );
        }
        let result = insert.build().execute(&mut **tx).await?;
        Ok(result.rows_affected())
    }
}
