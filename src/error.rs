use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid value for {metric}: {reason}")]
    Validation { metric: String, reason: String },

    #[error("Unknown metric: {0}")]
    UnknownMetric(String),

    #[error("Metric already registered: {0}")]
    DuplicateMetric(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Insight unavailable: {0}")]
    InsightUnavailable(String),

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl Error {
    /// Shorthand for a validation failure on a named metric.
    pub fn validation(metric: &str, reason: impl Into<String>) -> Self {
        Error::Validation {
            metric: metric.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Database(e.to_string())
    }
}

impl From<rusqlite_migration::Error> for Error {
    fn from(e: rusqlite_migration::Error) -> Self {
        Error::Migration(e.to_string())
    }
}

impl<E: fmt::Display> From<tokio_rusqlite::Error<E>> for Error {
    fn from(e: tokio_rusqlite::Error<E>) -> Self {
        Error::Database(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
