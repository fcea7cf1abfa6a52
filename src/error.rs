//! Error handling module
//!
//! Errors that escape message processing and reach the worker boundary.
//! Classified processing failures live in `classify`.

use crate::queue::QueueError;

/// Worker-wide Result type
pub type WorkerResult<T> = Result<T, WorkerError>;

/// Errors outside the retryable/terminal classification
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// Queue transport fault while fetching or finishing a message
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database schema incomplete: missing table {0}")]
    SchemaIncomplete(String),
}
