//! Behaviour tests for weekly retention pruning.

mod support;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use statforge_core::{Database, Engine, EngineSettings};
use statforge_model::{ServerId, SubjectId};

use support::{
    count_rows, round, seed_records, test_db, top_rounds_for,
};

fn ts(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

async fn seed_observation(
    db: &Database,
    server: ServerId,
    date: NaiveDate,
    hour: u32,
    active: i64,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO server_hourly_observations (server_id, \
         observed_date, hour, active_subjects) VALUES (?, ?, ?, ?)",
    )
    .bind(server.to_uuid())
    .bind(date)
    .bind(hour)
    .bind(active)
    .execute(db.pool())
    .await?;
    Ok(())
}

#[tokio::test]
async fn stale_this_week_entries_are_pruned_and_stay_gone() -> Result<()> {
    let fixture = test_db().await?;
    let engine =
        Engine::new(fixture.db.clone(), EngineSettings::default())?;
    let cancel = CancellationToken::new();

    let subject = SubjectId::new();
    let server = ServerId::new();
    // A round played in the week of June 2nd.
    seed_records(
        &fixture.db,
        &[round(subject, server, "de_dust2", ts(2025, 6, 3, 20, 0), 10, 900, 9, 3)],
    )
    .await?;

    // Leaderboards computed while that week was current.
    let then = ts(2025, 6, 4, 12, 0);
    assert!(
        engine
            .backfill_subjects(&[subject], then, &cancel)
            .await?
            .succeeded()
    );
    assert_eq!(
        top_rounds_for(&fixture.db, subject, "this_week").await?.len(),
        1
    );

    // Two weeks later the window boundary has moved past the entry
    // even though no raw data changed.
    let now = ts(2025, 6, 18, 12, 0);
    let report = engine.prune_now(now, &cancel).await?;
    assert!(report.stale_top_rounds >= 1);
    assert!(
        top_rounds_for(&fixture.db, subject, "this_week")
            .await?
            .is_empty()
    );
    // The june round is still inside "this_month", so that entry
    // survives the prune.
    assert_eq!(
        top_rounds_for(&fixture.db, subject, "this_month").await?.len(),
        1
    );

    // A refresh for the new week must not resurrect the stale entry.
    assert!(engine.refresh_now(now, &cancel).await?.succeeded());
    assert!(
        top_rounds_for(&fixture.db, subject, "this_week")
            .await?
            .is_empty()
    );
    Ok(())
}

#[tokio::test]
async fn old_observations_are_deleted_in_bounded_batches() -> Result<()> {
    let fixture = test_db().await?;
    let settings = EngineSettings {
        prune_batch_size: 2,
        prune_pause_ms: 1,
        ..EngineSettings::default()
    };
    let engine = Engine::new(fixture.db.clone(), settings)?;
    let cancel = CancellationToken::new();
    let now = ts(2025, 6, 18, 12, 0);

    let server = ServerId::new();
    // Five rows far beyond the 180-day horizon, one recent row.
    for day in 1..=5 {
        seed_observation(
            &fixture.db,
            server,
            NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            20,
            3,
        )
        .await?;
    }
    seed_observation(
        &fixture.db,
        server,
        NaiveDate::from_ymd_opt(2025, 6, 10).unwrap(),
        20,
        4,
    )
    .await?;

    let report = engine.prune_now(now, &cancel).await?;
    assert_eq!(report.observation_rows, 5);
    assert_eq!(report.observation_batches, 3, "2 + 2 + 1");

    assert_eq!(
        count_rows(&fixture.db, "server_hourly_observations").await?,
        1,
        "the recent observation survives"
    );
    Ok(())
}

#[tokio::test]
async fn prune_terminates_when_nothing_is_stale() -> Result<()> {
    let fixture = test_db().await?;
    let engine =
        Engine::new(fixture.db.clone(), EngineSettings::default())?;
    let cancel = CancellationToken::new();

    let report =
        engine.prune_now(ts(2025, 6, 18, 12, 0), &cancel).await?;
    assert_eq!(report.stale_top_rounds, 0);
    assert_eq!(report.observation_rows, 0);
    assert_eq!(report.observation_batches, 0);
    Ok(())
}

#[tokio::test]
async fn pruned_entries_reappear_only_with_new_week_data() -> Result<()> {
    let fixture = test_db().await?;
    let engine =
        Engine::new(fixture.db.clone(), EngineSettings::default())?;
    let cancel = CancellationToken::new();

    let subject = SubjectId::new();
    let server = ServerId::new();
    let old_round =
        round(subject, server, "de_dust2", ts(2025, 6, 3, 20, 0), 10, 900, 9, 3);
    seed_records(&fixture.db, &[old_round]).await?;
    assert!(
        engine
            .backfill_subjects(&[subject], ts(2025, 6, 4, 12, 0), &cancel)
            .await?
            .succeeded()
    );

    let now = ts(2025, 6, 18, 12, 0);
    engine.prune_now(now, &cancel).await?;

    // New raw data inside the current week produces a fresh entry.
    let new_round =
        round(subject, server, "de_inferno", ts(2025, 6, 17, 21, 0), 10, 1100, 12, 2);
    seed_records(&fixture.db, &[new_round.clone()]).await?;
    assert!(engine.refresh_now(now, &cancel).await?.succeeded());

    let entries =
        top_rounds_for(&fixture.db, subject, "this_week").await?;
    assert_eq!(entries.len(), 1);
    let round_id: Uuid = entries[0].1;
    assert_eq!(round_id, new_round.round_id.to_uuid());
    Ok(())
}
