//! Error Classification
//!
//! Decides whether a processing failure is worth retrying. The verdict is
//! fixed where the error is created and every layer above passes it on as is.

use crate::store::StoreError;

/// Failure classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Environmental; the same event may succeed on a later attempt
    Retryable,
    /// Property of the event itself; retrying cannot help
    Terminal,
}

/// Errors that can occur while processing one queue message
#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    /// Target account does not exist
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Event type is neither Credit nor Debit
    #[error("Invalid event kind: {0}")]
    InvalidEventKind(String),

    /// Applying the amount would take the balance out of the representable range
    #[error("Balance overflow on account {0}")]
    BalanceOverflow(String),

    /// Message body could not be decoded into an event
    #[error("Malformed message body: {0}")]
    MalformedPayload(#[source] serde_json::Error),

    /// Store fault during the unit of work
    #[error("Transient error during transaction processing: {0}")]
    Transient(#[source] StoreError),
}

impl ProcessingError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ProcessingError::AccountNotFound(_)
            | ProcessingError::InvalidEventKind(_)
            | ProcessingError::BalanceOverflow(_)
            | ProcessingError::MalformedPayload(_) => FailureKind::Terminal,
            ProcessingError::Transient(_) => FailureKind::Retryable,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == FailureKind::Retryable
    }

    pub fn is_terminal(&self) -> bool {
        self.kind() == FailureKind::Terminal
    }
}

impl From<StoreError> for ProcessingError {
    fn from(err: StoreError) -> Self {
        ProcessingError::Transient(err)
    }
}

/// Classify a processing failure
pub fn classify(err: &ProcessingError) -> FailureKind {
    err.kind()
}
