use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Recency-based priority bucket used to order backfill work.
///
/// Derived at runtime from each subject's most recent activity; never
/// persisted. Tiers are processed low-to-high so that recently active
/// subjects become correct first.
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
pub enum RecencyTier {
    /// Active within the last 7 days.
    Tier1,
    /// Active 8-30 days ago.
    Tier2,
    /// Active 31-90 days ago.
    Tier3,
    /// Active more than 90 days ago, or never seen recently.
    Tier4,
}

impl RecencyTier {
    pub const ALL: [RecencyTier; 4] = [
        RecencyTier::Tier1,
        RecencyTier::Tier2,
        RecencyTier::Tier3,
        RecencyTier::Tier4,
    ];

    pub fn number(&self) -> u8 {
        match self {
            RecencyTier::Tier1 => 1,
            RecencyTier::Tier2 => 2,
            RecencyTier::Tier3 => 3,
            RecencyTier::Tier4 => 4,
        }
    }

    pub fn from_number(n: u8) -> Result<Self, ModelError> {
        match n {
            1 => Ok(RecencyTier::Tier1),
            2 => Ok(RecencyTier::Tier2),
            3 => Ok(RecencyTier::Tier3),
            4 => Ok(RecencyTier::Tier4),
            other => Err(ModelError::InvalidTier(other)),
        }
    }

    /// Classify a subject by its most recent activity timestamp.
    pub fn classify(
        last_active: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        let Some(last_active) = last_active else {
            return RecencyTier::Tier4;
        };

        let age_days = (now - last_active).num_days();
        if age_days <= 7 {
            RecencyTier::Tier1
        } else if age_days <= 30 {
            RecencyTier::Tier2
        } else if age_days <= 90 {
            RecencyTier::Tier3
        } else {
            RecencyTier::Tier4
        }
    }
}

impl std::fmt::Display for RecencyTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tier{}", self.number())
    }
}
