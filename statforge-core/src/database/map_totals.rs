//! Write-owned repository for `subject_map_totals`.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite};

use statforge_model::{MonthBucket, SubjectId, SubjectMapTotals};

use crate::database::{Database, INSERT_CHUNK};
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct MapTotalsRepository {
    db: Database,
}

impl MapTotalsRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Same two-phase contract as the period totals repository: the
    /// delete covers every (map, scope) row in the recomputed bucket
    /// range, so rows whose source records disappeared are removed
    /// rather than left stale.
    pub async fn replace(
        &self,
        subjects: Option<&[SubjectId]>,
        from: Option<MonthBucket>,
        rows: &[SubjectMapTotals],
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let mut tx = self.db.pool().begin().await?;

        let mut delete = QueryBuilder::<Sqlite>::new(
            "DELETE FROM subject_map_totals WHERE 1=1",
        );
        if let Some(from) = from {
            delete.push(" AND (year > ");
            delete.push_bind(from.year);
            delete.push(" OR (year = ");
            delete.push_bind(from.year);
            delete.push(" AND month >= ");
            delete.push_bind(from.month);
            delete.push("))");
        }
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
            let mut insert = QueryBuilder::<Sqlite>::new(
                "INSERT INTO subject_map_totals (subject_id, map_name, \
                 server_scope, year, month, rounds, kills, deaths, score, \
                 minutes, kd_ratio, kills_per_minute, updated_at) ",
            );
            insert.push_values(chunk, |mut b, row| {
                b.push_bind(row.subject_id.to_uuid())
                    .push_bind(row.map_name.clone())
                    .push_bind(row.server_scope.clone())
                    .push_bind(row.year)
                    .push_bind(row.month)
                    .push_bind(row.rounds)
                    .push_bind(row.kills)
                    .push_bind(row.deaths)
                    .push_bind(row.score)
                    .push_bind(row.minutes)
                    .push_bind(row.kd_ratio)
                    .push_bind(row.kills_per_minute)
                    .push_bind(now);
            });
            let result = insert.build().execute(&mut *tx).await?;
            written += result.rows_affected();
        }

        tx.commit().await?;
        Ok(written)
    }
}
