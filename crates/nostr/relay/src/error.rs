//! Relay store error types

use nostr::{EventError, FilterError};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    /// The event failed verification, validation or classification
    #[error("event rejected: {0}")]
    Rejected(#[from] EventError),

    #[error("database error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid filter: {0}")]
    InvalidFilter(#[from] FilterError),

    /// The writer thread is gone
    #[error("relay store is closed")]
    Closed,

    #[error("submission timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelayError {
    /// Transient failures; the same request may succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RelayError::Storage(_) | RelayError::Pool(_) | RelayError::Timeout(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
