//! Behaviour tests for the recomputation routines: idempotence,
//! conservation, soft-delete exclusion, retroactive recompute, Top-K
//! bounds, dimension sentinel rows, and hourly profiles.

mod support;

use anyhow::Result;
use chrono::{DateTime, Duration, TimeZone, Utc};
use sqlx::Row;
use tokio_util::sync::CancellationToken;

use statforge_core::{Engine, EngineSettings};
use statforge_model::{ServerId, SubjectId};

use support::{
    count_rows, dump_period_totals, period_totals_for, round,
    seed_records, soft_delete_round, test_db, top_rounds_for,
};

fn ts(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

#[tokio::test]
async fn refresh_is_idempotent() -> Result<()> {
    let fixture = test_db().await?;
    let engine =
        Engine::new(fixture.db.clone(), EngineSettings::default())?;
    let cancel = CancellationToken::new();

    let subject = SubjectId::new();
    let server = ServerId::new();
    let now = ts(2025, 6, 18, 12, 0);
    seed_records(
        &fixture.db,
        &[
            round(subject, server, "de_dust2", ts(2025, 6, 10, 20, 30), 15, 2100, 18, 9),
            round(subject, server, "de_inferno", ts(2025, 6, 12, 21, 0), 20, 1800, 12, 15),
        ],
    )
    .await?;

    let first = engine.refresh_now(now, &cancel).await?;
    assert!(first.succeeded());
    let after_first = dump_period_totals(&fixture.db).await?;

    // Second invocation with identical arguments: a normal result and
    // byte-identical persisted rows.
    let second = engine.refresh_now(now, &cancel).await?;
    assert!(second.succeeded());
    let after_second = dump_period_totals(&fixture.db).await?;

    assert_eq!(after_first, after_second);
    Ok(())
}

#[tokio::test]
async fn period_totals_conserve_lifetime_counters() -> Result<()> {
    let fixture = test_db().await?;
    let engine =
        Engine::new(fixture.db.clone(), EngineSettings::default())?;
    let cancel = CancellationToken::new();

    let subject = SubjectId::new();
    let server = ServerId::new();
    let records = vec![
        round(subject, server, "de_dust2", ts(2025, 4, 3, 19, 0), 12, 900, 10, 4),
        round(subject, server, "de_dust2", ts(2025, 4, 28, 23, 50), 25, 1500, 21, 11),
        round(subject, server, "de_nuke", ts(2025, 5, 1, 0, 10), 8, 400, 3, 7),
        round(subject, server, "de_inferno", ts(2025, 6, 15, 18, 30), 30, 2600, 27, 13),
    ];
    seed_records(&fixture.db, &records).await?;

    let report = engine
        .backfill_full(ts(2025, 6, 18, 12, 0), &cancel)
        .await?;
    assert!(report.succeeded());

    let buckets = period_totals_for(&fixture.db, subject).await?;
    assert_eq!(buckets.len(), 3, "april, may, june");

    let kills: i64 = buckets.iter().map(|row| row.3).sum();
    let deaths: i64 = buckets.iter().map(|row| row.4).sum();
    let score: i64 = buckets.iter().map(|row| row.5).sum();
    let minutes: i64 = buckets.iter().map(|row| row.6).sum();

    assert_eq!(kills, records.iter().map(|r| r.kills).sum::<i64>());
    assert_eq!(deaths, records.iter().map(|r| r.deaths).sum::<i64>());
    assert_eq!(score, records.iter().map(|r| r.score).sum::<i64>());
    assert_eq!(
        minutes,
        records.iter().map(|r| r.minutes()).sum::<i64>()
    );
    Ok(())
}

#[tokio::test]
async fn soft_deleted_records_are_excluded_everywhere() -> Result<()> {
    let fixture = test_db().await?;
    let engine =
        Engine::new(fixture.db.clone(), EngineSettings::default())?;
    let cancel = CancellationToken::new();

    let subject = SubjectId::new();
    let server = ServerId::new();
    let mut records = vec![
        round(subject, server, "de_dust2", ts(2025, 6, 2, 20, 0), 10, 800, 9, 5),
        round(subject, server, "de_dust2", ts(2025, 6, 3, 20, 0), 10, 1200, 14, 6),
        round(subject, server, "de_dust2", ts(2025, 6, 4, 20, 0), 10, 700, 6, 8),
    ];
    records[1].is_deleted = true;
    seed_records(&fixture.db, &records).await?;

    let report = engine
        .backfill_full(ts(2025, 6, 18, 12, 0), &cancel)
        .await?;
    assert!(report.succeeded());

    let buckets = period_totals_for(&fixture.db, subject).await?;
    assert_eq!(buckets.len(), 1);
    let (_, _, rounds, kills, deaths, score, ..) = buckets[0];
    assert_eq!(rounds, 2);
    assert_eq!(kills, 9 + 6);
    assert_eq!(deaths, 5 + 8);
    assert_eq!(score, 800 + 700);
    Ok(())
}

#[tokio::test]
async fn retroactive_delete_shrinks_the_bucket() -> Result<()> {
    let fixture = test_db().await?;
    let engine =
        Engine::new(fixture.db.clone(), EngineSettings::default())?;
    let cancel = CancellationToken::new();
    let now = ts(2025, 7, 1, 9, 0);

    let subject = SubjectId::new();
    let lone = SubjectId::new();
    let server = ServerId::new();

    let contested =
        round(subject, server, "de_dust2", ts(2025, 6, 10, 20, 0), 10, 900, 10, 3);
    let keeper =
        round(subject, server, "de_dust2", ts(2025, 6, 11, 20, 0), 10, 600, 5, 4);
    let only =
        round(lone, server, "de_nuke", ts(2025, 5, 20, 20, 0), 10, 300, 4, 4);
    seed_records(&fixture.db, &[contested.clone(), keeper, only.clone()])
        .await?;

    assert!(engine.backfill_full(now, &cancel).await?.succeeded());
    let before = period_totals_for(&fixture.db, subject).await?;
    assert_eq!(before[0].3, 15, "both june rounds counted");

    // An administrator soft-deletes one round; only the affected
    // subjects are recomputed.
    soft_delete_round(&fixture.db, contested.round_id).await?;
    soft_delete_round(&fixture.db, only.round_id).await?;
    let report = engine
        .backfill_subjects(&[subject, lone], now, &cancel)
        .await?;
    assert!(report.succeeded());

    let after = period_totals_for(&fixture.db, subject).await?;
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].3, 5, "10 fewer kills in 2025-06");

    // The deleted round was the lone subject's only contribution, so
    // its bucket disappears entirely.
    assert!(period_totals_for(&fixture.db, lone).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn zero_denominator_ratios_yield_the_numerator() -> Result<()> {
    let fixture = test_db().await?;
    let engine =
        Engine::new(fixture.db.clone(), EngineSettings::default())?;
    let cancel = CancellationToken::new();

    let subject = SubjectId::new();
    let server = ServerId::new();
    seed_records(
        &fixture.db,
        &[round(subject, server, "de_train", ts(2025, 6, 5, 20, 0), 10, 700, 7, 0)],
    )
    .await?;

    assert!(
        engine
            .backfill_full(ts(2025, 6, 18, 12, 0), &cancel)
            .await?
            .succeeded()
    );

    let buckets = period_totals_for(&fixture.db, subject).await?;
    let (.., kd_ratio, kills_per_minute) = buckets[0];
    assert_eq!(kd_ratio, 7.0, "deathless round: ratio is the kill count");
    assert_eq!(kills_per_minute, 0.7);
    Ok(())
}

#[tokio::test]
async fn top_rounds_keep_at_most_three_ranked_entries() -> Result<()> {
    let fixture = test_db().await?;
    let engine =
        Engine::new(fixture.db.clone(), EngineSettings::default())?;
    let cancel = CancellationToken::new();

    // Wednesday; the ISO week started Monday 2025-06-16.
    let now = ts(2025, 6, 18, 12, 0);
    let subject = SubjectId::new();
    let server = ServerId::new();

    let early_tie =
        round(subject, server, "de_dust2", ts(2025, 6, 16, 20, 0), 10, 900, 9, 2);
    let late_tie =
        round(subject, server, "de_dust2", ts(2025, 6, 17, 20, 0), 10, 900, 8, 3);
    let best =
        round(subject, server, "de_inferno", ts(2025, 6, 16, 22, 0), 10, 1000, 11, 1);
    let fourth =
        round(subject, server, "de_nuke", ts(2025, 6, 17, 23, 0), 10, 800, 7, 5);
    let fifth =
        round(subject, server, "de_train", ts(2025, 6, 18, 1, 0), 10, 700, 6, 6);
    seed_records(
        &fixture.db,
        &[
            early_tie.clone(),
            late_tie.clone(),
            best.clone(),
            fourth,
            fifth,
        ],
    )
    .await?;

    let report =
        engine.backfill_subjects(&[subject], now, &cancel).await?;
    assert!(report.succeeded());

    let entries =
        top_rounds_for(&fixture.db, subject, "this_week").await?;
    assert_eq!(entries.len(), 3);
    assert_eq!(
        entries.iter().map(|e| e.0).collect::<Vec<_>>(),
        vec![1, 2, 3],
        "ranks are a contiguous prefix"
    );
    assert!(entries[0].2 >= entries[1].2);
    assert!(entries[1].2 >= entries[2].2);

    assert_eq!(entries[0].1, best.round_id.to_uuid());
    // Equal scores: the more recent round ranks higher.
    assert_eq!(entries[1].1, late_tie.round_id.to_uuid());
    assert_eq!(entries[2].1, early_tie.round_id.to_uuid());

    // Recomputing replaces rather than appends.
    assert!(
        engine
            .backfill_subjects(&[subject], now, &cancel)
            .await?
            .succeeded()
    );
    assert_eq!(
        top_rounds_for(&fixture.db, subject, "this_week")
            .await?
            .len(),
        3
    );
    Ok(())
}

#[tokio::test]
async fn map_totals_carry_a_global_scope_row() -> Result<()> {
    let fixture = test_db().await?;
    let engine =
        Engine::new(fixture.db.clone(), EngineSettings::default())?;
    let cancel = CancellationToken::new();

    let subject = SubjectId::new();
    let server_a = ServerId::new();
    let server_b = ServerId::new();
    seed_records(
        &fixture.db,
        &[
            round(subject, server_a, "de_dust2", ts(2025, 6, 2, 20, 0), 10, 500, 5, 2),
            round(subject, server_a, "de_dust2", ts(2025, 6, 3, 20, 0), 10, 600, 6, 3),
            round(subject, server_b, "de_dust2", ts(2025, 6, 4, 20, 0), 10, 700, 7, 4),
        ],
    )
    .await?;

    assert!(
        engine
            .backfill_full(ts(2025, 6, 18, 12, 0), &cancel)
            .await?
            .succeeded()
    );

    let rows = sqlx::query(
        "SELECT server_scope, rounds, kills FROM subject_map_totals \
         WHERE subject_id = ? AND map_name = 'de_dust2' \
         ORDER BY rounds DESC",
    )
    .bind(subject.to_uuid())
    .fetch_all(fixture.db.pool())
    .await?;

    assert_eq!(rows.len(), 3, "global sentinel plus two server scopes");
    let global: String = rows[0].try_get("server_scope")?;
    assert_eq!(global, "global");
    assert_eq!(rows[0].try_get::<i64, _>("rounds")?, 3);
    assert_eq!(rows[0].try_get::<i64, _>("kills")?, 18);
    assert_eq!(rows[1].try_get::<i64, _>("rounds")?, 2);
    assert_eq!(rows[2].try_get::<i64, _>("rounds")?, 1);
    Ok(())
}

#[tokio::test]
async fn hourly_profiles_aggregate_daily_observations() -> Result<()> {
    let fixture = test_db().await?;
    let settings = EngineSettings {
        min_sample_count: 1,
        ..EngineSettings::default()
    };
    let engine = Engine::new(fixture.db.clone(), settings)?;
    let cancel = CancellationToken::new();

    let server = ServerId::new();
    let solo = SubjectId::new();
    let other = SubjectId::new();
    // Three consecutive Mondays, 20:00 hour slot; the last one has two
    // subjects online at once.
    seed_records(
        &fixture.db,
        &[
            round(solo, server, "de_dust2", ts(2025, 6, 2, 20, 20), 15, 500, 5, 5),
            round(solo, server, "de_dust2", ts(2025, 6, 9, 20, 30), 25, 600, 6, 6),
            round(solo, server, "de_dust2", ts(2025, 6, 16, 20, 40), 30, 700, 7, 7),
            round(other, server, "de_dust2", ts(2025, 6, 16, 20, 25), 10, 300, 3, 3),
        ],
    )
    .await?;

    assert!(
        engine
            .backfill_full(ts(2025, 6, 18, 12, 0), &cancel)
            .await?
            .succeeded()
    );

    let row = sqlx::query(
        "SELECT avg, min, max, p25, p50, p75, p90, sample_count \
         FROM server_hourly_profile \
         WHERE server_id = ? AND weekday = 0 AND hour = 20",
    )
    .bind(server.to_uuid())
    .fetch_one(fixture.db.pool())
    .await?;

    assert_eq!(row.try_get::<i64, _>("sample_count")?, 3);
    assert_eq!(row.try_get::<i64, _>("min")?, 1);
    assert_eq!(row.try_get::<i64, _>("max")?, 2);

    let p25: f64 = row.try_get("p25")?;
    let p50: f64 = row.try_get("p50")?;
    let p75: f64 = row.try_get("p75")?;
    let p90: f64 = row.try_get("p90")?;
    assert_eq!(p50, 1.0, "samples are [1, 1, 2]");
    assert!(p25 <= p50 && p50 <= p75 && p75 <= p90);

    assert!(count_rows(&fixture.db, "server_hourly_observations").await? >= 3);
    Ok(())
}

#[tokio::test]
async fn malformed_records_are_skipped_and_counted() -> Result<()> {
    let fixture = test_db().await?;
    let engine =
        Engine::new(fixture.db.clone(), EngineSettings::default())?;
    let cancel = CancellationToken::new();

    let subject = SubjectId::new();
    let server = ServerId::new();
    let good =
        round(subject, server, "de_dust2", ts(2025, 6, 10, 20, 0), 10, 500, 5, 5);
    let mut inverted =
        round(subject, server, "de_dust2", ts(2025, 6, 11, 20, 0), 10, 400, 4, 4);
    inverted.started_at = inverted.ended_at + Duration::minutes(5);
    seed_records(&fixture.db, &[good, inverted]).await?;

    let report = engine
        .backfill_subjects(&[subject], ts(2025, 6, 18, 12, 0), &cancel)
        .await?;
    assert!(report.succeeded());
    assert!(report.records_skipped > 0);

    let buckets = period_totals_for(&fixture.db, subject).await?;
    assert_eq!(buckets[0].2, 1, "only the well-formed round counted");
    Ok(())
}
