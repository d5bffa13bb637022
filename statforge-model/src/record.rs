use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::{RoundId, ServerId, SubjectId};

/// One subject's participation in one completed game round.
///
/// Rows are immutable once written except for the soft-delete flag;
/// soft-deleted rows are excluded from every rollup. The engine only
/// ever reads this type from the raw log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipationRecord {
    pub id: Uuid,
    pub round_id: RoundId,
    pub subject_id: SubjectId,
    pub server_id: ServerId,
    pub map_name: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub score: i64,
    pub kills: i64,
    pub deaths: i64,
    pub avg_latency_ms: f64,
    pub is_deleted: bool,
}

impl ParticipationRecord {
    /// Whether the record carries usable data.
    ///
    /// Malformed records are skipped and counted by recomputation
    /// routines rather than failing the batch.
    pub fn is_well_formed(&self) -> bool {
        self.ended_at >= self.started_at
            && self.kills >= 0
            && self.deaths >= 0
            && !self.map_name.is_empty()
    }

    /// Whole minutes played, floor of the round duration.
    pub fn minutes(&self) -> i64 {
        (self.ended_at - self.started_at).num_seconds().max(0) / 60
    }
}
