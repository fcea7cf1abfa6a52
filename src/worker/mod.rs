//! Worker module
//!
//! Consumes balance events from the message queue one at a time and applies
//! them through the transaction processor with bounded retries.

mod poll_loop;
mod retry;
pub mod shutdown;

use std::time::Duration;

pub use poll_loop::{LoopStats, PollLoop, PollStatus};
pub use retry::{
    AttemptState, BackoffSchedule, Outcome, Resolution, RetryController, MAX_RETRIES,
};
pub use shutdown::{Shutdown, ShutdownTrigger};

/// Worker tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Wait after an empty poll or a transport fault (default: 10 seconds)
    pub poll_interval: Duration,
    pub schedule: BackoffSchedule,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            schedule: BackoffSchedule::default(),
        }
    }
}
