//! Indexer error types

use nostr::EventError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexerError {
    /// The event failed verification, validation or classification
    #[error("event rejected: {0}")]
    Rejected(#[from] EventError),

    /// The writer task is gone
    #[error("indexer is closed")]
    Closed,

    /// The queue stayed full, or the writer did not answer in time
    #[error("submission timed out after {0:?}")]
    Timeout(Duration),
}

impl IndexerError {
    /// Errors worth retrying with the same event.
    pub fn is_retryable(&self) -> bool {
        matches!(self, IndexerError::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, IndexerError>;
