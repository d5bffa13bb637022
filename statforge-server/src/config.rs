//! Layered configuration: defaults, then an optional `statforge.toml`,
//! then `STATFORGE_*` environment overrides (double underscore as the
//! section separator, e.g. `STATFORGE_DATABASE__URL`).

use config::ConfigError;
use serde::Deserialize;

use statforge_core::EngineSettings;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub scheduler: SchedulerSettings,
    pub engine: EngineSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: DatabaseSettings::default(),
            scheduler: SchedulerSettings::default(),
            engine: EngineSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: "sqlite://statforge.db".into(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// UTC hour of the daily refresh.
    pub refresh_hour: u32,
    pub refresh_minute: u32,
    /// Monday-based weekday (0..=6) of the weekly prune.
    pub prune_weekday: u32,
    /// UTC hour of the weekly prune.
    pub prune_hour: u32,
    pub prune_minute: u32,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            refresh_hour: 4,
            refresh_minute: 0,
            prune_weekday: 6,
            prune_hour: 5,
            prune_minute: 0,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        let settings: Settings = config::Config::builder()
            .add_source(
                config::File::with_name("statforge").required(false),
            )
            .add_source(
                config::Environment::with_prefix("STATFORGE")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database.max_connections == 0 {
            return Err(ConfigError::Message(
                "database.max_connections must be at least 1".into(),
            ));
        }
        for (name, value, bound) in [
            ("scheduler.refresh_hour", self.scheduler.refresh_hour, 24),
            (
                "scheduler.refresh_minute",
                self.scheduler.refresh_minute,
                60,
            ),
            ("scheduler.prune_weekday", self.scheduler.prune_weekday, 7),
            ("scheduler.prune_hour", self.scheduler.prune_hour, 24),
            ("scheduler.prune_minute", self.scheduler.prune_minute, 60),
        ] {
            if value >= bound {
                return Err(ConfigError::Message(format!(
                    "{name} must be below {bound}, got {value}"
                )));
            }
        }
        self.engine
            .validate()
            .map_err(|err| ConfigError::Message(err.to_string()))
    }
}
