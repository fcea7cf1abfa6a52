//! Banking Event Receiver Library
//!
//! Re-exports modules for the binaries and integration testing.

pub mod classify;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod jobs;
pub mod processor;
pub mod queue;
pub mod store;
pub mod worker;

pub use classify::{classify, FailureKind, ProcessingError};
pub use config::Config;
pub use domain::{Account, Event, EventKind};
pub use error::{WorkerError, WorkerResult};
pub use processor::{AppliedTransaction, TransactionProcessor};
