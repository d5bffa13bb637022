//! Calendar and rolling period buckets.
//!
//! Rollup tables partition time two ways: totals tables use calendar
//! month buckets (`MonthBucket`), while Top-K leaderboards use rolling
//! periods (`RollingPeriod`) whose window start moves with the calendar
//! even when no new raw data arrives.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// A calendar month bucket, the canonical period partition for totals
/// rollups.
///
/// Summing every bucket of a subject reproduces lifetime totals; an
/// absent bucket means zero activity for that month.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
pub struct MonthBucket {
    pub year: i32,
    pub month: u32,
}

impl MonthBucket {
    /// Bucket containing the given instant.
    pub fn of(ts: DateTime<Utc>) -> Self {
        Self {
            year: ts.year(),
            month: ts.month(),
        }
    }

    /// First instant of the bucket (UTC midnight on the 1st).
    pub fn start(&self) -> DateTime<Utc> {
        first_instant(self.year, self.month, 1)
    }

    /// The following month's bucket.
    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }
}

impl std::fmt::Display for MonthBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Rolling periods tracked by the Top-K leaderboard maintainer.
///
/// The window lower bound is derived from the current instant, so a
/// row can fall out of its period without any raw-log change; the
/// retention pruner removes those stragglers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub enum RollingPeriod {
    /// Current ISO week, starting Monday 00:00 UTC.
    ThisWeek,
    /// Current calendar month, starting on the 1st 00:00 UTC.
    ThisMonth,
}

impl RollingPeriod {
    pub const ALL: [RollingPeriod; 2] =
        [RollingPeriod::ThisWeek, RollingPeriod::ThisMonth];

    /// Stable label persisted in the `top_rounds.period` column.
    pub fn label(&self) -> &'static str {
        match self {
            RollingPeriod::ThisWeek => "this_week",
            RollingPeriod::ThisMonth => "this_month",
        }
    }

    pub fn from_label(label: &str) -> Result<Self, ModelError> {
        match label {
            "this_week" => Ok(RollingPeriod::ThisWeek),
            "this_month" => Ok(RollingPeriod::ThisMonth),
            other => Err(ModelError::InvalidPeriodLabel(other.to_string())),
        }
    }

    /// First instant of the period's current window.
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            RollingPeriod::ThisWeek => {
                let date = now.date_naive();
                let monday = date
                    - Duration::days(
                        date.weekday().num_days_from_monday() as i64
                    );
                day_start(monday)
            }
            RollingPeriod::ThisMonth => {
                first_instant(now.year(), now.month(), 1)
            }
        }
    }
}

impl std::fmt::Display for RollingPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

fn first_instant(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    // Components come from a real chrono date, so this cannot fail.
    let date = NaiveDate::from_ymd_opt(year, month, day)
        .expect("valid calendar date");
    day_start(date)
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0)
        .expect("midnight exists for every date")
        .and_utc()
}
