use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Invalid period label: {0}")]
    InvalidPeriodLabel(String),

    #[error("Invalid tier number: {0}")]
    InvalidTier(u8),

    #[error("Invalid identifier: {0}")]
    InvalidId(String),
}
