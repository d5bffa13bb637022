//! Shared fixtures for the behaviour tests: a temp-file SQLite
//! database with migrations applied, raw-log seeding helpers, and
//! typed readers over the rollup tables.
#![allow(dead_code)]

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use sqlx::Row;
use tempfile::TempDir;
use uuid::Uuid;

use statforge_core::Database;
use statforge_model::{
    ParticipationRecord, RoundId, ServerId, SubjectId,
};

pub struct TestDb {
    pub db: Database,
    _dir: TempDir,
}

pub async fn test_db() -> Result<TestDb> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("statforge-test.db");
    let url = format!("sqlite://{}", path.display());
    let db = Database::connect(&url, 5).await?;
    Ok(TestDb { db, _dir: dir })
}

/// A finished round: `ended_at` minus `minutes` gives the start.
pub fn round(
    subject: SubjectId,
    server: ServerId,
    map: &str,
    ended_at: DateTime<Utc>,
    minutes: i64,
    score: i64,
    kills: i64,
    deaths: i64,
) -> ParticipationRecord {
    ParticipationRecord {
        id: Uuid::now_v7(),
        round_id: RoundId::new(),
        subject_id: subject,
        server_id: server,
        map_name: map.to_string(),
        started_at: ended_at - Duration::minutes(minutes),
        ended_at,
        score,
        kills,
        deaths,
        avg_latency_ms: 35.0,
        is_deleted: false,
    }
}

pub async fn seed_records(
    db: &Database,
    records: &[ParticipationRecord],
) -> Result<()> {
    for record in records {
        sqlx::query(
            "INSERT INTO participation_records (id, round_id, \
             subject_id, server_id, map_name, started_at, ended_at, \
             score, kills, deaths, avg_latency_ms, is_deleted) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.id)
        .bind(record.round_id.to_uuid())
        .bind(record.subject_id.to_uuid())
        .bind(record.server_id.to_uuid())
        .bind(record.map_name.clone())
        .bind(record.started_at)
        .bind(record.ended_at)
        .bind(record.score)
        .bind(record.kills)
        .bind(record.deaths)
        .bind(record.avg_latency_ms)
        .bind(record.is_deleted)
        .execute(db.pool())
        .await?;
    }
    Ok(())
}

pub async fn soft_delete_round(
    db: &Database,
    round_id: RoundId,
) -> Result<()> {
    sqlx::query(
        "UPDATE participation_records SET is_deleted = 1 \
         WHERE round_id = ?",
    )
    .bind(round_id.to_uuid())
    .execute(db.pool())
    .await?;
    Ok(())
}

/// (year, month, rounds, kills, deaths, score, minutes, kd_ratio,
/// kills_per_minute), ordered by bucket.
pub type TotalsRow = (i32, u32, i64, i64, i64, i64, i64, f64, f64);

pub async fn period_totals_for(
    db: &Database,
    subject: SubjectId,
) -> Result<Vec<TotalsRow>> {
    let rows = sqlx::query(
        "SELECT year, month, rounds, kills, deaths, score, minutes, \
         kd_ratio, kills_per_minute FROM subject_period_totals \
         WHERE subject_id = ? ORDER BY year, month",
    )
    .bind(subject.to_uuid())
    .fetch_all(db.pool())
    .await?;

    rows.iter()
        .map(|row| {
            Ok((
                row.try_get("year")?,
                row.try_get("month")?,
                row.try_get("rounds")?,
                row.try_get("kills")?,
                row.try_get("deaths")?,
                row.try_get("score")?,
                row.try_get("minutes")?,
                row.try_get("kd_ratio")?,
                row.try_get("kills_per_minute")?,
            ))
        })
        .collect()
}

/// Full dump of the period totals table including `updated_at`, for
/// byte-identical idempotence comparisons.
pub async fn dump_period_totals(
    db: &Database,
) -> Result<Vec<(String, i32, u32, i64, i64, i64, i64, i64, f64, f64, String)>>
{
    let rows = sqlx::query(
        "SELECT subject_id, year, month, rounds, kills, deaths, score, \
         minutes, kd_ratio, kills_per_minute, updated_at \
         FROM subject_period_totals ORDER BY subject_id, year, month",
    )
    .fetch_all(db.pool())
    .await?;

    rows.iter()
        .map(|row| {
            let subject: Uuid = row.try_get("subject_id")?;
            Ok((
                subject.to_string(),
                row.try_get("year")?,
                row.try_get("month")?,
                row.try_get("rounds")?,
                row.try_get("kills")?,
                row.try_get("deaths")?,
                row.try_get("score")?,
                row.try_get("minutes")?,
                row.try_get("kd_ratio")?,
                row.try_get("kills_per_minute")?,
                row.try_get("updated_at")?,
            ))
        })
        .collect()
}

/// (rank, round id, score, achieved_at) for one subject and period.
pub async fn top_rounds_for(
    db: &Database,
    subject: SubjectId,
    period: &str,
) -> Result<Vec<(i64, Uuid, i64, DateTime<Utc>)>> {
    let rows = sqlx::query(
        "SELECT rank, round_id, score, achieved_at FROM top_rounds \
         WHERE subject_id = ? AND period = ? ORDER BY rank",
    )
    .bind(subject.to_uuid())
    .bind(period)
    .fetch_all(db.pool())
    .await?;

    rows.iter()
        .map(|row| {
            Ok((
                row.try_get("rank")?,
                row.try_get("round_id")?,
                row.try_get("score")?,
                row.try_get("achieved_at")?,
            ))
        })
        .collect()
}

pub async fn count_rows(db: &Database, table: &str) -> Result<i64> {
    let row = sqlx::query(&format!("SELECT COUNT(*) AS n FROM {table}"))
        .fetch_one(db.pool())
        .await?;
    Ok(row.try_get("n")?)
}
