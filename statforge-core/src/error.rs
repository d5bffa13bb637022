use thiserror::Error;

#[derive(Error, Debug)]
pub enum RollupError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl RollupError {
    /// Transient store errors may be retried by the scheduling loop;
    /// everything else indicates a bug or an explicit cancellation.
    pub fn is_transient(&self) -> bool {
        matches!(self, RollupError::Database(_))
    }
}

pub type Result<T> = std::result::Result<T, RollupError>;
