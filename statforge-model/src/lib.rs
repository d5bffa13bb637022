//! Domain types shared across the Statforge rollup engine.
//!
//! Everything in this crate is plain data: strongly typed identifiers,
//! calendar/rolling period buckets, the raw participation record, the
//! rollup row types, and the recency tier classification. No I/O lives
//! here; the database layer in `statforge-core` hydrates and persists
//! these types.

pub mod error;
pub mod ids;
pub mod period;
pub mod record;
pub mod rollup;
pub mod tier;

pub use error::ModelError;
pub use ids::{RoundId, ServerId, SubjectId};
pub use period::{MonthBucket, RollingPeriod};
pub use record::ParticipationRecord;
pub use rollup::{
    GLOBAL_SCOPE, HourlyObservation, HourlyProfileRow, PercentileProfile,
    SubjectMapTotals, SubjectPeriodTotals, SubjectServerBest, TopRoundEntry,
};
pub use tier::RecencyTier;
