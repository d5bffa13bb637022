//! Recency tier classification, driving backfill priority.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use statforge_model::{RecencyTier, SubjectId};

use crate::database::Database;
use crate::database::participation::{RawLogReadPort, SqliteRawLog};
use crate::error::Result;

pub struct TierClassifier {
    raw: Arc<dyn RawLogReadPort>,
}

impl TierClassifier {
    pub fn new(db: Database) -> Self {
        Self {
            raw: Arc::new(SqliteRawLog::new(db)),
        }
    }

    pub fn with_port(raw: Arc<dyn RawLogReadPort>) -> Self {
        Self { raw }
    }

    /// Subjects whose most recent activity falls in the tier's age
    /// range, most recently active first.
    pub async fn subjects_in_tier(
        &self,
        tier: RecencyTier,
        now: DateTime<Utc>,
    ) -> Result<Vec<SubjectId>> {
        let mut members: Vec<(SubjectId, DateTime<Utc>)> = self
            .raw
            .last_activity()
            .await?
            .into_iter()
            .filter(|(_, last_active)| {
                RecencyTier::classify(Some(*last_active), now) == tier
            })
            .collect();

        members.sort_by(|a, b| b.1.cmp(&a.1));

        Ok(members.into_iter().map(|(subject, _)| subject).collect())
    }
}

impl std::fmt::Debug for TierClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TierClassifier").finish_non_exhaustive()
    }
}
