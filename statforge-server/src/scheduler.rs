//! Explicit job scheduling.
//!
//! Each periodic job carries a `JobSchedule { next_run_at, policy }`
//! advanced by [`next_occurrence`], a pure function of the policy and
//! the last completion instant. The run loop owns all schedule state
//! and passes `now` explicitly into every invocation.
//!
//! The loop also owns the retry contract toward the engine: transient
//! store errors are retried with a bounded doubling backoff; anything
//! else is surfaced and the job waits for its next occurrence. The
//! engine itself never retries internally.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Duration as ChronoDuration, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use statforge_core::{Engine, Result, RollupError};

use crate::config::SchedulerSettings;

const TICK_INTERVAL: Duration = Duration::from_secs(30);
const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_secs(30);

/// When a job fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulePolicy {
    DailyAt {
        hour: u32,
        minute: u32,
    },
    WeeklyAt {
        /// Monday-based weekday index, 0..=6.
        weekday: u32,
        hour: u32,
        minute: u32,
    },
}

/// The earliest instant strictly after `after` matching the policy.
pub fn next_occurrence(
    policy: &SchedulePolicy,
    after: DateTime<Utc>,
) -> DateTime<Utc> {
    match *policy {
        SchedulePolicy::DailyAt { hour, minute } => {
            let candidate = at_time(after, hour, minute);
            if candidate > after {
                candidate
            } else {
                candidate + ChronoDuration::days(1)
            }
        }
        SchedulePolicy::WeeklyAt {
            weekday,
            hour,
            minute,
        } => {
            let today = after.weekday().num_days_from_monday();
            let days_ahead = (weekday + 7 - today) % 7;
            let candidate = at_time(after, hour, minute)
                + ChronoDuration::days(days_ahead as i64);
            if candidate > after {
                candidate
            } else {
                candidate + ChronoDuration::days(7)
            }
        }
    }
}

fn at_time(day: DateTime<Utc>, hour: u32, minute: u32) -> DateTime<Utc> {
    day.date_naive()
        .and_hms_opt(hour, minute, 0)
        .expect("validated wall-clock time")
        .and_utc()
}

/// Schedule state for one job, owned by the run loop.
#[derive(Debug, Clone, Copy)]
pub struct JobSchedule {
    pub next_run_at: DateTime<Utc>,
    pub policy: SchedulePolicy,
}

impl JobSchedule {
    pub fn starting(policy: SchedulePolicy, now: DateTime<Utc>) -> Self {
        Self {
            next_run_at: next_occurrence(&policy, now),
            policy,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.next_run_at
    }

    pub fn advance(&mut self, completed_at: DateTime<Utc>) {
        self.next_run_at = next_occurrence(&self.policy, completed_at);
    }
}

pub struct Scheduler {
    engine: Arc<Engine>,
    refresh: JobSchedule,
    prune: JobSchedule,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(
        engine: Arc<Engine>,
        settings: &SchedulerSettings,
        cancel: CancellationToken,
        now: DateTime<Utc>,
    ) -> Self {
        let refresh = JobSchedule::starting(
            SchedulePolicy::DailyAt {
                hour: settings.refresh_hour,
                minute: settings.refresh_minute,
            },
            now,
        );
        let prune = JobSchedule::starting(
            SchedulePolicy::WeeklyAt {
                weekday: settings.prune_weekday,
                hour: settings.prune_hour,
                minute: settings.prune_minute,
            },
            now,
        );

        Self {
            engine,
            refresh,
            prune,
            cancel,
        }
    }

    /// Run until cancelled. Jobs fire sequentially inside the loop;
    /// the engine's category leases already serialize any overlap with
    /// externally triggered backfills.
    pub async fn run(mut self) -> Result<()> {
        info!(
            next_refresh = %self.refresh.next_run_at,
            next_prune = %self.prune.next_run_at,
            "scheduler started"
        );

        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("scheduler shutting down");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }

            let now = Utc::now();

            if self.refresh.is_due(now) {
                let engine = Arc::clone(&self.engine);
                let cancel = self.cancel.clone();
                self.run_job("daily-refresh", || {
                    let engine = Arc::clone(&engine);
                    let cancel = cancel.clone();
                    async move {
                        engine
                            .refresh_now(Utc::now(), &cancel)
                            .await
                            .map(|summary| summary.rows_written())
                    }
                })
                .await;
                self.refresh.advance(Utc::now());
            }

            if self.prune.is_due(now) {
                let engine = Arc::clone(&self.engine);
                let cancel = self.cancel.clone();
                self.run_job("weekly-prune", || {
                    let engine = Arc::clone(&engine);
                    let cancel = cancel.clone();
                    async move {
                        engine.prune_now(Utc::now(), &cancel).await.map(
                            |report| {
                                report.stale_top_rounds
                                    + report.observation_rows
                            },
                        )
                    }
                })
                .await;
                self.prune.advance(Utc::now());
            }
        }
    }

    /// Invoke a job at most once per occurrence, retrying transient
    /// failures with a bounded doubling backoff.
    async fn run_job<F, Fut>(&self, name: &str, mut job: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<u64>>,
    {
        let mut delay = RETRY_BASE_DELAY;
        for attempt in 1..=RETRY_ATTEMPTS {
            match job().await {
                Ok(rows) => {
                    info!(job = name, attempt, rows, "job complete");
                    return;
                }
                Err(RollupError::Cancelled(reason)) => {
                    warn!(job = name, reason = %reason, "job cancelled");
                    return;
                }
                Err(err) if err.is_transient() && attempt < RETRY_ATTEMPTS => {
                    warn!(
                        job = name,
                        attempt,
                        error = %err,
                        retry_in_s = delay.as_secs(),
                        "transient failure, will retry"
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => return,
                        _ = tokio::time::sleep(delay) => {}
                    }
                    delay *= 2;
                }
                Err(err) => {
                    error!(job = name, attempt, error = %err, "job failed");
                    return;
                }
            }
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("refresh", &self.refresh)
            .field("prune", &self.prune)
            .finish_non_exhaustive()
    }
}
