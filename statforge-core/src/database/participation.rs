//! Read-only access to the raw participation log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Row, Sqlite, sqlite::SqliteRow};
use uuid::Uuid;

use statforge_model::{
    ParticipationRecord, RoundId, ServerId, SubjectId,
};

use crate::database::Database;
use crate::error::Result;

/// Filter for raw-log queries.
///
/// Soft-deleted rows are excluded by default; `include_deleted` is the
/// explicit override used for undelete-triggered recomputation.
#[derive(Debug, Clone, Default)]
pub struct RawLogFilter {
    pub subjects: Option<Vec<SubjectId>>,
    pub server: Option<ServerId>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub include_deleted: bool,
}

impl RawLogFilter {
    pub fn since(since: Option<DateTime<Utc>>) -> Self {
        Self {
            since,
            ..Self::default()
        }
    }

    pub fn for_subjects(mut self, subjects: Option<&[SubjectId]>) -> Self {
        self.subjects = subjects.map(<[SubjectId]>::to_vec);
        self
    }
}

/// Query capability over the raw participation log, consumed by every
/// recomputation routine and by the recency tier classifier.
#[async_trait]
pub trait RawLogReadPort: Send + Sync {
    async fn records(
        &self,
        filter: RawLogFilter,
    ) -> Result<Vec<ParticipationRecord>>;

    /// Most recent activity timestamp per subject, the recency signal
    /// behind backfill tiering.
    async fn last_activity(
        &self,
    ) -> Result<Vec<(SubjectId, DateTime<Utc>)>>;
}

#[derive(Debug, Clone)]
pub struct SqliteRawLog {
    db: Database,
}

impl SqliteRawLog {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn hydrate_record(row: &SqliteRow) -> Result<ParticipationRecord> {
        Ok(ParticipationRecord {
            id: row.try_get("id")?,
            round_id: RoundId(row.try_get("round_id")?),
            subject_id: SubjectId(row.try_get("subject_id")?),
            server_id: ServerId(row.try_get("server_id")?),
            map_name: row.try_get("map_name")?,
            started_at: row.try_get("started_at")?,
            ended_at: row.try_get("ended_at")?,
            score: row.try_get("score")?,
            kills: row.try_get("kills")?,
            deaths: row.try_get("deaths")?,
            avg_latency_ms: row.try_get("avg_latency_ms")?,
            is_deleted: row.try_get("is_deleted")?,
        })
    }
}

#[async_trait]
impl RawLogReadPort for SqliteRawLog {
    async fn records(
        &self,
        filter: RawLogFilter,
    ) -> Result<Vec<ParticipationRecord>> {
        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT id, round_id, subject_id, server_id, map_name, \
             started_at, ended_at, score, kills, deaths, avg_latency_ms, \
             is_deleted FROM participation_records WHERE 1=1",
        );

        if !filter.include_deleted {
            builder.push(" AND is_deleted = 0");
        }

        if let Some(subjects) = &filter.subjects {
            builder.push(" AND subject_id IN (");
            let mut separated = builder.separated(", ");
            for subject in subjects {
                separated.push_bind(subject.to_uuid());
            }
            builder.push(")");
        }

        if let Some(server) = filter.server {
            builder.push(" AND server_id = ");
            builder.push_bind(server.to_uuid());
        }

        if let Some(since) = filter.since {
            builder.push(" AND ended_at >= ");
            builder.push_bind(since);
        }

        if let Some(until) = filter.until {
            builder.push(" AND ended_at < ");
            builder.push_bind(until);
        }

        builder.push(" ORDER BY ended_at ASC");

        let rows = builder.build().fetch_all(self.db.pool()).await?;

        rows.iter().map(Self::hydrate_record).collect()
    }

    async fn last_activity(
        &self,
    ) -> Result<Vec<(SubjectId, DateTime<Utc>)>> {
        let rows = sqlx::query(
            "SELECT subject_id, MAX(ended_at) AS last_active \
             FROM participation_records \
             WHERE is_deleted = 0 \
             GROUP BY subject_id",
        )
        .fetch_all(self.db.pool())
        .await?;

        rows.iter()
            .map(|row| {
                let subject: Uuid = row.try_get("subject_id")?;
                let last_active: DateTime<Utc> =
                    row.try_get("last_active")?;
                Ok((SubjectId(subject), last_active))
            })
            .collect()
    }
}
