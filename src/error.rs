// src/error.rs
//! Error taxonomy for the ingestion service.
//!
//! Library code returns these typed errors; binaries wrap them in `anyhow`.

use thiserror::Error;

/// Startup configuration problems. Fatal, never retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("DATABASE_URL environment variable is required")]
    MissingDatabaseUrl,
    #[error("DATABASE_URL is malformed: {0}")]
    InvalidDatabaseUrl(String),
    #[error("bucket size must divide 60 evenly and lie in 1..=60 minutes, got {0}")]
    InvalidBucketSize(u32),
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
    #[error("reading config file {path}: {reason}")]
    File { path: String, reason: String },
}

/// Transport or response-shape failure from the remote feed.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("feed request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("feed responded with status: {0}")]
    Status(reqwest::StatusCode),
    #[error("feed response could not be decoded: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Storage failures, split by whether the surrounding transaction survives them.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connection loss, pool timeout, protocol breakage. The transaction is gone.
    #[error("storage connection error: {0}")]
    Connection(String),
    /// A single statement was rejected (bad data, unexpected constraint).
    #[error("storage query error: {0}")]
    Query(String),
}

impl StoreError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::Connection(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Database(db) => StoreError::Query(db.to_string()),
            sqlx::Error::RowNotFound
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::Decode(_)
            | sqlx::Error::TypeNotFound { .. } => StoreError::Query(e.to_string()),
            other => StoreError::Connection(other.to_string()),
        }
    }
}

/// Failure while deriving or writing one feed item. Logged, never propagated.
#[derive(Debug, Error)]
pub enum ItemProcessingError {
    #[error("item at position {position} is missing required field `{field}`")]
    MissingField {
        position: usize,
        field: &'static str,
    },
    #[error("item at position {position} could not be decoded: {reason}")]
    Malformed { position: usize, reason: String },
    #[error("item {external_id}: {source}")]
    Store {
        external_id: String,
        #[source]
        source: StoreError,
    },
}

/// Whole-run failures of the ingestion orchestrator.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to fetch feed: {0}")]
    Fetch(#[from] FetchError),
    #[error("no items fetched from feed")]
    EmptyFeed,
    #[error("ingestion transaction failed: {0}")]
    Transaction(#[source] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_connection_errors_are_fatal() {
        assert!(StoreError::Connection("reset".into()).is_fatal());
        assert!(!StoreError::Query("check violation".into()).is_fatal());
    }

    #[test]
    fn pool_timeout_maps_to_connection() {
        let e: StoreError = sqlx::Error::PoolTimedOut.into();
        assert!(e.is_fatal());
        let e: StoreError = sqlx::Error::RowNotFound.into();
        assert!(!e.is_fatal());
    }

    #[test]
    fn empty_feed_message_is_human_readable() {
        assert_eq!(IngestError::EmptyFeed.to_string(), "no items fetched from feed");
    }
}
