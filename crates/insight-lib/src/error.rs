//! Error types for the insight engine
//!
//! Insufficient data is never an error: detectors return `None` for it.
//! The only true faults are failing store reads and invalid configuration.

use thiserror::Error;

/// Failure reported by a [`MetricsStore`](crate::store::MetricsStore) implementation
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("metrics store unavailable: {0}")]
    Unavailable(String),

    #[error("failed to read snapshot: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to decode snapshot: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum InsightError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T, E = InsightError> = std::result::Result<T, E>;
