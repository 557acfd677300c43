use thiserror::Error;

#[derive(Error, Debug)]
pub enum RentGridError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Scraping error: {0}")]
    Scraping(String),

    #[error("Enrichment error: {0}")]
    Enrichment(String),

    #[error("Analyzer unavailable: {0}")]
    ApiUnavailable(String),

    #[error("Commute estimation error: {0}")]
    Commute(String),

    #[error("Notification delivery failed permanently: {0}")]
    PermanentDeliveryFailure(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, RentGridError>;
