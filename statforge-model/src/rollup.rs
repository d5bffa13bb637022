//! Row types for the rollup tables.
//!
//! All of these are created and overwritten exclusively by the
//! recomputation routines in `statforge-core`; absence of a row means
//! zero activity for that key, never an error.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{RoundId, ServerId, SubjectId};
use crate::period::RollingPeriod;

/// Sentinel `server_scope` value for cross-server ("global") dimension
/// rows. Stored as a distinct row rather than handled by a special
/// query path.
pub const GLOBAL_SCOPE: &str = "global";

/// Per-subject, per-calendar-month summed counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectPeriodTotals {
    pub subject_id: SubjectId,
    pub year: i32,
    pub month: u32,
    pub rounds: i64,
    pub kills: i64,
    pub deaths: i64,
    pub score: i64,
    pub minutes: i64,
    pub kd_ratio: f64,
    pub kills_per_minute: f64,
}

/// Per-subject, per-map totals with the same month bucketing, scoped
/// either to a single server or to the [`GLOBAL_SCOPE`] sentinel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectMapTotals {
    pub subject_id: SubjectId,
    pub map_name: String,
    pub server_scope: String,
    pub year: i32,
    pub month: u32,
    pub rounds: i64,
    pub kills: i64,
    pub deaths: i64,
    pub score: i64,
    pub minutes: i64,
    pub kd_ratio: f64,
    pub kills_per_minute: f64,
}

/// One daily observation: distinct subjects active on a server during
/// one clock hour of one calendar day. The percentile profile is
/// aggregated from repeated observations in the same weekday/hour slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourlyObservation {
    pub server_id: ServerId,
    pub observed_date: NaiveDate,
    pub hour: u32,
    pub active_subjects: i64,
}

/// Empirical quantiles of a sample set.
#[derive(
    Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize,
)]
pub struct PercentileProfile {
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
}

/// Activity-pattern profile for one (server, weekday, hour) slot.
///
/// `sample_count` gates statistical validity on the read side; slots
/// with few observations should be rendered as "insufficient data".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyProfileRow {
    pub server_id: ServerId,
    /// Monday-based weekday index, 0..=6.
    pub weekday: u32,
    pub hour: u32,
    pub avg: f64,
    pub min: i64,
    pub max: i64,
    pub profile: PercentileProfile,
    pub sample_count: i64,
}

/// One Top-K leaderboard entry: a subject's rank-N best round within a
/// rolling period. At most three entries exist per (subject, period).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopRoundEntry {
    pub subject_id: SubjectId,
    pub period: RollingPeriod,
    pub rank: i64,
    pub round_id: RoundId,
    pub server_id: ServerId,
    pub map_name: String,
    pub score: i64,
    pub kills: i64,
    pub deaths: i64,
    pub achieved_at: DateTime<Utc>,
}

/// Argmax rollup: a subject's highest-scoring round per server, with a
/// back-reference to the source round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectServerBest {
    pub subject_id: SubjectId,
    pub server_id: ServerId,
    pub best_score: i64,
    pub round_id: RoundId,
    pub achieved_at: DateTime<Utc>,
}
