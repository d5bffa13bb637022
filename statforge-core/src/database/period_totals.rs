//! Write-owned repository for `subject_period_totals`.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite};

use statforge_model::{MonthBucket, SubjectId, SubjectPeriodTotals};

use crate::database::{Database, INSERT_CHUNK};
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct PeriodTotalsRepository {
    db: Database,
}

impl PeriodTotalsRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Two-phase replace: delete every bucket at or after `from` for
    /// the scoped subjects, then insert the freshly computed rows, all
    /// inside one transaction. Callers hold the category lease for the
    /// duration, so no reader observes the gap between phases beyond
    /// the lease hold time.
    pub async fn replace(
        &self,
        subjects: Option<&[SubjectId]>,
        from: Option<MonthBucket>,
        rows: &[SubjectPeriodTotals],
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let mut tx = self.db.pool().begin().await?;

        let mut delete = QueryBuilder::<Sqlite>::new(
            "DELETE FROM subject_period_totals WHERE 1=1",
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
                "INSERT INTO subject_period_totals (subject_id, year, \
                 month, rounds, kills, deaths, score, minutes, kd_ratio, \
                 kills_per_minute, updated_at) ",
            );
            insert.push_values(chunk, |mut b, row| {
                b.push_bind(row.subject_id.to_uuid())
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
