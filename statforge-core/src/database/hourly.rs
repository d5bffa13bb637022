//! Write-owned repositories for the hourly activity tables:
//! `server_hourly_observations` (daily raw observations, aged out by
//! the retention pruner) and `server_hourly_profile` (the aggregated
//! per-slot percentile profiles).

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{QueryBuilder, Row, Sqlite, sqlite::SqliteRow};

use statforge_model::{HourlyObservation, HourlyProfileRow, ServerId};

use crate::database::{Database, INSERT_CHUNK};
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct HourlyRepository {
    db: Database,
}

impl HourlyRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Replace all observations dated at or after `from` with the
    /// given rows.
    pub async fn replace_observations(
        &self,
        from: Option<NaiveDate>,
        rows: &[HourlyObservation],
    ) -> Result<u64> {
        let mut tx = self.db.pool().begin().await?;

        let mut delete = QueryBuilder::<Sqlite>::new(
            "DELETE FROM server_hourly_observations WHERE 1=1",
        );
        if let Some(from) = from {
            delete.push(" AND observed_date >= ");
            delete.push_bind(from);
        }
        delete.build().execute(&mut *tx).await?;

        let mut written = 0u64;
        for chunk in rows.chunks(INSERT_CHUNK) {
            let mut insert = QueryBuilder::<Sqlite>::new(
                "INSERT INTO server_hourly_observations (server_id, \
                 observed_date, hour, active_subjects) ",
            );
            insert.push_values(chunk, |mut b, row| {
                b.push_bind(row.server_id.to_uuid())
                    .push_bind(row.observed_date)
                    .push_bind(row.hour)
                    .push_bind(row.active_subjects);
            });
            let result = insert.build().execute(&mut *tx).await?;
            written += result.rows_affected();
        }

        tx.commit().await?;
        Ok(written)
    }

    /// Every stored observation, ordered for deterministic grouping.
    pub async fn all_observations(&self) -> Result<Vec<HourlyObservation>> {
        let rows = sqlx::query(
            "SELECT server_id, observed_date, hour, active_subjects \
             FROM server_hourly_observations \
             ORDER BY server_id, observed_date, hour",
        )
        .fetch_all(self.db.pool())
        .await?;

        rows.iter().map(Self::hydrate_observation).collect()
    }

    /// Full replacement of the profile table. The profile key space is
    /// small (servers x 7 weekdays x 24 hours), so recomputing it
    /// whole keeps slots whose observations were pruned from lingering.
    pub async fn replace_profiles(
        &self,
        rows: &[HourlyProfileRow],
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let mut tx = self.db.pool().begin().await?;

        sqlx::query("DELETE FROM server_hourly_profile")
            .execute(&mut *tx)
            .await?;

        let mut written = 0u64;
        for chunk in rows.chunks(INSERT_CHUNK) {
            let mut insert = QueryBuilder::<Sqlite>::new(
                "INSERT INTO server_hourly_profile (server_id, weekday, \
                 hour, avg, min, max, p25, p50, p75, p90, sample_count, \
                 updated_at) ",
            );
            insert.push_values(chunk, |mut b, row| {
                b.push_bind(row.server_id.to_uuid())
                    .push_bind(row.weekday)
                    .push_bind(row.hour)
                    .push_bind(row.avg)
                    .push_bind(row.min)
                    .push_bind(row.max)
                    .push_bind(row.profile.p25)
                    .push_bind(row.profile.p50)
                    .push_bind(row.profile.p75)
                    .push_bind(row.profile.p90)
                    .push_bind(row.sample_count)
                    .push_bind(now);
            });
            let result = insert.build().execute(&mut *tx).await?;
            written += result.rows_affected();
        }

        tx.commit().await?;
        Ok(written)
    }

    /// Delete at most `limit` observation rows older than `cutoff`.
    /// Returns the number deleted; the pruner loops until this hits
    /// zero, pausing between batches.
    pub async fn delete_observations_older_than(
        &self,
        cutoff: NaiveDate,
        limit: u32,
    ) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM server_hourly_observations WHERE rowid IN ( \
                 SELECT rowid FROM server_hourly_observations \
                 WHERE observed_date < ? LIMIT ?)",
        )
        .bind(cutoff)
        .bind(limit)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected())
    }

    fn hydrate_observation(row: &SqliteRow) -> Result<HourlyObservation> {
        Ok(HourlyObservation {
            server_id: ServerId(row.try_get("server_id")?),
            observed_date: row.try_get("observed_date")?,
            hour: row.try_get("hour")?,
            active_subjects: row.try_get("active_subjects")?,
        })
    }
}
