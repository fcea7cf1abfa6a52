//! Retry Controller
//!
//! Drives one queue message to a terminal outcome:
//!
//! ```text
//! Dispatched ──ok──────────────▶ Succeeded      (acknowledge)
//!     │ retryable, n <= max
//!     ├──▶ Retrying(n) ─wait─▶ Dispatched
//!     │ retryable, n > max / terminal
//!     └──▶ DeadLettered                         (dead_letter)
//! ```
//!
//! A shutdown observed while waiting turns the message into a reschedule.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::classify::{FailureKind, ProcessingError};
use crate::domain::Event;
use crate::processor::{AppliedTransaction, TransactionProcessor};
use crate::queue::{MessageQueue, QueueError, QueueMessage};
use crate::store::AccountStore;

use super::Shutdown;

/// Retries allowed after the first attempt
pub const MAX_RETRIES: u32 = 3;

// =========================================================================
// Backoff schedule
// =========================================================================

/// Fixed exponential schedule: 5s, 25s, 125s
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffSchedule {
    max_retries: u32,
    initial_delay: Duration,
    multiplier: u32,
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            initial_delay: Duration::from_secs(5),
            multiplier: 5,
        }
    }
}

impl BackoffSchedule {
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before retry number `retry_count` (1-based), `None` once the budget is spent
    pub fn delay_for(&self, retry_count: u32) -> Option<Duration> {
        if retry_count == 0 || retry_count > self.max_retries {
            return None;
        }
        let factor = self.multiplier.saturating_pow(retry_count - 1);
        Some(self.initial_delay.saturating_mul(factor))
    }

    /// Sum of every delay in the schedule
    pub fn total_delay(&self) -> Duration {
        (1..=self.max_retries)
            .filter_map(|n| self.delay_for(n))
            .sum()
    }
}

// =========================================================================
// Attempt state and outcome
// =========================================================================

/// Per-message retry bookkeeping, owned by the in-flight call only
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptState {
    pub message_id: Uuid,
    pub retry_count: u32,
}

impl AttemptState {
    pub fn new(message_id: Uuid) -> Self {
        Self {
            message_id,
            retry_count: 0,
        }
    }

    /// Count one more retryable failure and return the new count
    pub fn record_failure(&mut self) -> u32 {
        self.retry_count += 1;
        self.retry_count
    }
}

/// Terminal outcome of a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Succeeded(AppliedTransaction),
    DeadLettered { kind: FailureKind, reason: String },
    /// Shutdown arrived during a backoff wait
    Rescheduled { not_before: DateTime<Utc> },
}

/// What happened to one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub message_id: Uuid,
    pub event_id: Option<Uuid>,
    pub outcome: Outcome,
    /// Retryable failures recorded. An exhausted sequence reports one more
    /// than the retries it waited for, since the last failure is not retried.
    pub retry_count: u32,
    /// Backoff delays actually waited, in order
    pub backoffs: Vec<Duration>,
}

impl Resolution {
    pub fn is_succeeded(&self) -> bool {
        matches!(self.outcome, Outcome::Succeeded(_))
    }

    pub fn is_dead_lettered(&self) -> bool {
        matches!(self.outcome, Outcome::DeadLettered { .. })
    }
}

// =========================================================================
// Controller
// =========================================================================

/// Applies a message with bounded retries and issues the final queue action
pub struct RetryController<S, Q> {
    processor: TransactionProcessor<S>,
    queue: Arc<Q>,
    schedule: BackoffSchedule,
    shutdown: Shutdown,
}

impl<S: AccountStore, Q: MessageQueue> RetryController<S, Q> {
    pub fn new(processor: TransactionProcessor<S>, queue: Arc<Q>, shutdown: Shutdown) -> Self {
        Self::with_schedule(processor, queue, BackoffSchedule::default(), shutdown)
    }

    pub fn with_schedule(
        processor: TransactionProcessor<S>,
        queue: Arc<Q>,
        schedule: BackoffSchedule,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            processor,
            queue,
            schedule,
            shutdown,
        }
    }

    /// Drive `message` to a terminal outcome.
    ///
    /// Errors are queue faults while issuing the final action; the message
    /// is then still claimed and the caller decides what to do with it.
    pub async fn process(&self, message: &QueueMessage) -> Result<Resolution, QueueError> {
        let mut attempt = AttemptState::new(message.id);

        let event = match Event::from_json(&message.body) {
            Ok(event) => event,
            Err(e) => {
                let err = ProcessingError::MalformedPayload(e);
                return self.dead_letter(message, None, &err, &attempt, Vec::new()).await;
            }
        };

        let mut shutdown = self.shutdown.clone();
        let mut backoffs = Vec::new();

        loop {
            let err = match self.processor.apply(&event).await {
                Ok(applied) => {
                    self.queue.acknowledge(message.id).await?;
                    tracing::info!(
                        message_id = %message.id,
                        event_id = %event.id,
                        kind = %event.kind,
                        amount = %event.amount,
                        account = %event.target_account,
                        retries = attempt.retry_count,
                        "Message completed"
                    );
                    return Ok(Resolution {
                        message_id: message.id,
                        event_id: Some(event.id),
                        outcome: Outcome::Succeeded(applied),
                        retry_count: attempt.retry_count,
                        backoffs,
                    });
                }
                Err(err) => err,
            };

            if err.is_terminal() {
                return self
                    .dead_letter(message, Some(&event), &err, &attempt, backoffs)
                    .await;
            }

            let retry_count = attempt.record_failure();
            let Some(delay) = self.schedule.delay_for(retry_count) else {
                return self
                    .dead_letter(message, Some(&event), &err, &attempt, backoffs)
                    .await;
            };

            tracing::warn!(
                message_id = %message.id,
                event_id = %event.id,
                error = %err,
                "Transient error, retrying in {}s (attempt {}/{})",
                delay.as_secs(),
                retry_count,
                self.schedule.max_retries()
            );

            let not_before = Utc::now()
                + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());

            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    backoffs.push(delay);
                }
                _ = shutdown.triggered() => {
                    self.queue.reschedule(message.id, not_before).await?;
                    tracing::info!(
                        message_id = %message.id,
                        event_id = %event.id,
                        %not_before,
                        "Shutdown during backoff, message rescheduled"
                    );
                    return Ok(Resolution {
                        message_id: message.id,
                        event_id: Some(event.id),
                        outcome: Outcome::Rescheduled { not_before },
                        retry_count: attempt.retry_count,
                        backoffs,
                    });
                }
            }
        }
    }

    async fn dead_letter(
        &self,
        message: &QueueMessage,
        event: Option<&Event>,
        err: &ProcessingError,
        attempt: &AttemptState,
        backoffs: Vec<Duration>,
    ) -> Result<Resolution, QueueError> {
        let kind = err.kind();
        let reason = match kind {
            FailureKind::Terminal => err.to_string(),
            FailureKind::Retryable => format!(
                "Exceeded {} retries: {}",
                self.schedule.max_retries(),
                err
            ),
        };

        self.queue.dead_letter(message.id, &reason).await?;

        match event {
            Some(event) => tracing::error!(
                message_id = %message.id,
                event_id = %event.id,
                kind = %event.kind,
                amount = %event.amount,
                account = %event.target_account,
                retries = attempt.retry_count,
                %reason,
                "Message moved to dead-letter"
            ),
            None => tracing::error!(
                message_id = %message.id,
                %reason,
                "Undecodable message moved to dead-letter"
            ),
        }

        Ok(Resolution {
            message_id: message.id,
            event_id: event.map(|e| e.id),
            outcome: Outcome::DeadLettered { kind, reason },
            retry_count: attempt.retry_count,
            backoffs,
        })
    }
}
