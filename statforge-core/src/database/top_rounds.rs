//! Write-owned repository for the Top-3 leaderboard table.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Row, Sqlite};

use statforge_model::{RollingPeriod, SubjectId, TopRoundEntry};

use crate::database::{Database, INSERT_CHUNK};
use crate::error::{Result, RollupError};

#[derive(Debug, Clone)]
pub struct TopRoundsRepository {
    db: Database,
}

impl TopRoundsRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Replace every entry for `period`, confined to the scoped
    /// subjects: delete fully precedes insert, inside one transaction.
    ///
    /// Before committing, the ≤3-rows-per-subject invariant is
    /// verified; a violation aborts the transaction and surfaces as
    /// [`RollupError::InvariantViolation`] since it means the
    /// delete-then-insert contract was broken, not normal data
    /// variance.
    pub async fn replace_for_period(
        &self,
        period: RollingPeriod,
        subjects: Option<&[SubjectId]>,
        rows: &[TopRoundEntry],
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let mut tx = self.db.pool().begin().await?;

        let mut delete = QueryBuilder::<Sqlite>::new(
            "DELETE FROM top_rounds WHERE period = ",
        );
        delete.push_bind(period.label());
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
                "INSERT INTO top_rounds (subject_id, period, rank, \
                 round_id, server_id, map_name, score, kills, deaths, \
                 achieved_at, updated_at) ",
            );
            insert.push_values(chunk, |mut b, row| {
                b.push_bind(row.subject_id.to_uuid())
                    .push_bind(row.period.label())
                    .push_bind(row.rank)
                    .push_bind(row.round_id.to_uuid())
                    .push_bind(row.server_id.to_uuid())
                    .push_bind(row.map_name.clone())
                    .push_bind(row.score)
                    .push_bind(row.kills)
                    .push_bind(row.deaths)
                    .push_bind(row.achieved_at)
                    .push_bind(now);
            });
            let result = insert.build().execute(&mut *tx).await?;
            written += result.rows_affected();
        }

        let violation = sqlx::query(
            "SELECT subject_id, COUNT(*) AS n FROM top_rounds \
             WHERE period = ? GROUP BY subject_id HAVING n > 3 LIMIT 1",
        )
        .bind(period.label())
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(row) = violation {
            let count: i64 = row.try_get("n")?;
            return Err(RollupError::InvariantViolation(format!(
                "{count} top_rounds rows persisted for one subject in \
                 period {period}"
            )));
        }

        tx.commit().await?;
        Ok(written)
    }

    /// Delete entries whose `achieved_at` predates the period's
    /// current window start. Used by the weekly pruner once the
    /// calendar rolls past them.
    pub async fn delete_stale(
        &self,
        period: RollingPeriod,
        window_start: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM top_rounds WHERE period = ? AND achieved_at < ?",
        )
        .bind(period.label())
        .bind(window_start)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected())
    }
}
