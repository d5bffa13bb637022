//! # Statforge
//!
//! Background rollup scheduler for game-round participation
//! statistics. Keeps the pre-aggregated rollup tables (period totals,
//! per-map totals, hourly activity profiles, Top-3 leaderboards,
//! per-server bests) fresh so leaderboard and profile queries are
//! answered from rollups instead of scanning the raw log.
//!
//! Subcommands: `run` starts the scheduler daemon; `backfill`,
//! `refresh`, and `prune` are one-shot administrative triggers for
//! initial population and disaster recovery.

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use statforge_core::{Database, Engine};
use statforge_model::{RecencyTier, SubjectId};
use statforge_server::config::Settings;
use statforge_server::scheduler::Scheduler;

#[derive(Debug, Parser)]
#[command(name = "statforge", version, about = "Game statistics rollup engine")]
struct Cli {
    /// Override the database URL from configuration.
    #[arg(long)]
    database: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the background scheduler (daily refresh, weekly prune).
    Run,
    /// Recompute rollups from full history, tier by tier, or for a
    /// specific tier or subject list.
    Backfill {
        /// Backfill only this recency tier (1..=4).
        #[arg(long, conflicts_with = "subjects")]
        tier: Option<u8>,
        /// Targeted recompute for these subject ids.
        #[arg(long, value_delimiter = ',')]
        subjects: Vec<Uuid>,
    },
    /// Run the daily incremental refresh once, now.
    Refresh,
    /// Run the weekly retention prune once, now.
    Prune,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut settings =
        Settings::load().context("failed to load configuration")?;
    if let Some(database) = cli.database {
        settings.database.url = database;
    }

    let db = Database::connect(
        &settings.database.url,
        settings.database.max_connections,
    )
    .await
    .with_context(|| {
        format!("failed to open database {}", settings.database.url)
    })?;

    let engine = Arc::new(Engine::new(db, settings.engine.clone())?);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, finishing current batch");
                cancel.cancel();
            }
        });
    }

    match cli.command {
        Command::Run => {
            let scheduler = Scheduler::new(
                engine,
                &settings.scheduler,
                cancel,
                Utc::now(),
            );
            scheduler.run().await?;
        }
        Command::Backfill { tier, subjects } => {
            let now = Utc::now();
            if let Some(tier) = tier {
                let tier = RecencyTier::from_number(tier)?;
                let report =
                    engine.backfill_tier(tier, now, &cancel).await?;
                info!(
                    %tier,
                    subjects = report.subjects,
                    batches = report.batches_completed,
                    rows_written = report.rows_written,
                    "tier backfill finished"
                );
                if !report.succeeded() {
                    anyhow::bail!(
                        "tier backfill finished with {} failed batches",
                        report.failures.len()
                    );
                }
            } else if !subjects.is_empty() {
                let subjects: Vec<SubjectId> =
                    subjects.into_iter().map(SubjectId).collect();
                let report = engine
                    .backfill_subjects(&subjects, now, &cancel)
                    .await?;
                info!(
                    subjects = report.subjects,
                    rows_written = report.rows_written,
                    "targeted recompute finished"
                );
                if !report.succeeded() {
                    anyhow::bail!(
                        "targeted recompute finished with {} failures",
                        report.failures.len()
                    );
                }
            } else {
                let report = engine.backfill_full(now, &cancel).await?;
                for tier_report in &report.tiers {
                    info!(
                        tier = %tier_report
                            .tier
                            .map(|t| t.to_string())
                            .unwrap_or_default(),
                        subjects = tier_report.subjects,
                        rows_written = tier_report.rows_written,
                        "tier finished"
                    );
                }
                if !report.succeeded() {
                    anyhow::bail!("full backfill finished with failures");
                }
            }
        }
        Command::Refresh => {
            let summary = engine.refresh_now(Utc::now(), &cancel).await?;
            info!(
                rows_written = summary.rows_written(),
                "refresh finished"
            );
            if !summary.succeeded() {
                anyhow::bail!(
                    "refresh finished with {} failed shapes",
                    summary.failed_shapes().len()
                );
            }
        }
        Command::Prune => {
            let report = engine.prune_now(Utc::now(), &cancel).await?;
            info!(
                stale_top_rounds = report.stale_top_rounds,
                observation_rows = report.observation_rows,
                "prune finished"
            );
        }
    }

    Ok(())
}
