use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RollupError};

/// Tuning knobs for the rollup engine.
///
/// Defaults match the production cadence: daily refresh over trailing
/// windows of roughly two months, weekly pruning with a 180-day
/// observation horizon, and backfill batches of 100 subjects.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Trailing window for hourly observation recomputation, in days.
    pub hourly_window_days: i64,
    /// Trailing window for subject period totals, in days.
    pub totals_window_days: i64,
    /// Trailing window for per-map totals, in days.
    pub map_window_days: i64,
    /// Trailing window for the per-server best rollup, in days.
    pub best_window_days: i64,
    /// Subjects per backfill batch.
    pub backfill_batch_size: usize,
    /// Rows deleted per pruning batch.
    pub prune_batch_size: u32,
    /// Pause between pruning batches, keeping write locks short.
    pub prune_pause_ms: u64,
    /// Age at which hourly observation rows are deleted, in days.
    pub observation_retention_days: i64,
    /// Observations required before a profile slot is considered
    /// statistically valid.
    pub min_sample_count: i64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            hourly_window_days: 60,
            totals_window_days: 62,
            map_window_days: 62,
            best_window_days: 62,
            backfill_batch_size: 100,
            prune_batch_size: 10_000,
            prune_pause_ms: 250,
            observation_retention_days: 180,
            min_sample_count: 3,
        }
    }
}

impl EngineSettings {
    pub fn prune_pause(&self) -> Duration {
        Duration::from_millis(self.prune_pause_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.backfill_batch_size == 0 {
            return Err(RollupError::Config(
                "backfill_batch_size must be at least 1".into(),
            ));
        }
        if self.prune_batch_size == 0 {
            return Err(RollupError::Config(
                "prune_batch_size must be at least 1".into(),
            ));
        }
        for (name, days) in [
            ("hourly_window_days", self.hourly_window_days),
            ("totals_window_days", self.totals_window_days),
            ("map_window_days", self.map_window_days),
            ("best_window_days", self.best_window_days),
            (
                "observation_retention_days",
                self.observation_retention_days,
            ),
        ] {
            if days <= 0 {
                return Err(RollupError::Config(format!(
                    "{name} must be positive, got {days}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(EngineSettings::default().validate().is_ok());
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let settings = EngineSettings {
            backfill_batch_size: 0,
            ..EngineSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn negative_window_is_rejected() {
        let settings = EngineSettings {
            totals_window_days: -5,
            ..EngineSettings::default()
        };
        assert!(settings.validate().is_err());
    }
}
