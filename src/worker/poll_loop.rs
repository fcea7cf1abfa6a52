//! Poll Loop
//!
//! Fetches one message at a time and hands it to the retry controller.
//! The loop has two suspension points, the idle wait and the processing of
//! a message; shutdown is honoured at both, but never inside a unit of work.

use std::sync::Arc;
use std::time::Duration;

use crate::error::WorkerError;
use crate::processor::TransactionProcessor;
use crate::queue::MessageQueue;
use crate::store::AccountStore;

use super::{Outcome, Resolution, RetryController, Shutdown, WorkerConfig};

/// Result of one poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    /// Nothing to do
    Idle,
    Processed(Resolution),
}

/// Counters reported when the loop exits
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub succeeded: u64,
    pub dead_lettered: u64,
    pub rescheduled: u64,
    pub errors: u64,
}

impl LoopStats {
    fn record(&mut self, resolution: &Resolution) {
        match resolution.outcome {
            Outcome::Succeeded(_) => self.succeeded += 1,
            Outcome::DeadLettered { .. } => self.dead_lettered += 1,
            Outcome::Rescheduled { .. } => self.rescheduled += 1,
        }
    }
}

/// Single-consumer poll loop
pub struct PollLoop<S, Q> {
    queue: Arc<Q>,
    controller: RetryController<S, Q>,
    poll_interval: Duration,
    shutdown: Shutdown,
}

impl<S: AccountStore, Q: MessageQueue> PollLoop<S, Q> {
    pub fn new(
        processor: TransactionProcessor<S>,
        queue: Arc<Q>,
        config: WorkerConfig,
        shutdown: Shutdown,
    ) -> Self {
        let controller = RetryController::with_schedule(
            processor,
            queue.clone(),
            config.schedule,
            shutdown.clone(),
        );
        Self {
            queue,
            controller,
            poll_interval: config.poll_interval,
            shutdown,
        }
    }

    /// Fetch one message and drive it to a terminal outcome.
    ///
    /// A queue fault while finishing the message releases its lock on a
    /// best-effort basis and is returned.
    pub async fn poll_once(&self) -> Result<PollStatus, WorkerError> {
        let Some(message) = self.queue.peek_next().await? else {
            return Ok(PollStatus::Idle);
        };

        tracing::debug!(
            message_id = %message.id,
            delivery_count = message.delivery_count,
            "Message received"
        );

        match self.controller.process(&message).await {
            Ok(resolution) => Ok(PollStatus::Processed(resolution)),
            Err(e) => {
                if let Err(abandon_err) = self.queue.abandon(message.id).await {
                    tracing::warn!(
                        message_id = %message.id,
                        error = %abandon_err,
                        "Failed to abandon message, lock will expire"
                    );
                }
                Err(e.into())
            }
        }
    }

    /// Run until shutdown is triggered
    pub async fn run(self) -> LoopStats {
        tracing::info!(
            poll_interval_secs = self.poll_interval.as_secs(),
            "Poll loop started"
        );

        let mut shutdown = self.shutdown.clone();
        let mut stats = LoopStats::default();

        while !shutdown.is_triggered() {
            let wait = match self.poll_once().await {
                Ok(PollStatus::Idle) => {
                    tracing::debug!("No messages available");
                    true
                }
                Ok(PollStatus::Processed(resolution)) => {
                    stats.record(&resolution);
                    false
                }
                Err(e) => {
                    tracing::error!(error = %e, "Unexpected error in poll loop");
                    stats.errors += 1;
                    true
                }
            };

            if wait {
                tokio::select! {
                    _ = tokio::time::sleep(self.poll_interval) => {}
                    _ = shutdown.triggered() => break,
                }
            }
        }

        tracing::info!(
            succeeded = stats.succeeded,
            dead_lettered = stats.dead_lettered,
            rescheduled = stats.rescheduled,
            errors = stats.errors,
            "Poll loop stopped"
        );

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Account, Event, EventKind};
    use crate::queue::InMemoryQueue;
    use crate::store::InMemoryAccountStore;
    use crate::worker::shutdown;
    use rust_decimal_macros::dec;

    fn poll_loop(
        store: &InMemoryAccountStore,
        queue: &Arc<InMemoryQueue>,
        listener: Shutdown,
    ) -> PollLoop<InMemoryAccountStore, InMemoryQueue> {
        PollLoop::new(
            TransactionProcessor::new(store.clone()),
            queue.clone(),
            WorkerConfig::default(),
            listener,
        )
    }

    #[tokio::test]
    async fn test_poll_once_idle_on_empty_queue() {
        let store = InMemoryAccountStore::new();
        let queue = Arc::new(InMemoryQueue::new());
        let (_trigger, listener) = shutdown::channel();

        let status = poll_loop(&store, &queue, listener).poll_once().await.unwrap();
        assert_eq!(status, PollStatus::Idle);
    }

    #[tokio::test]
    async fn test_poll_once_processes_one_message() {
        let store = InMemoryAccountStore::with_accounts([Account::new("ACC-1", dec!(0))]);
        let queue = Arc::new(InMemoryQueue::new());
        let (_trigger, listener) = shutdown::channel();
        let first = queue
            .push(Event::new(EventKind::Credit, dec!(1), "ACC-1").to_json().unwrap())
            .await;
        let second = queue
            .push(Event::new(EventKind::Credit, dec!(2), "ACC-1").to_json().unwrap())
            .await;

        let worker = poll_loop(&store, &queue, listener);
        let status = worker.poll_once().await.unwrap();

        assert!(matches!(status, PollStatus::Processed(ref r) if r.message_id == first));
        assert!(queue.is_acknowledged(first).await);
        assert!(!queue.is_acknowledged(second).await);
        assert_eq!(store.balance_of("ACC-1").await, Some(dec!(1)));
    }

    #[tokio::test]
    async fn test_poll_once_abandons_on_queue_fault() {
        let store = InMemoryAccountStore::with_accounts([Account::new("ACC-1", dec!(0))]);
        let queue = Arc::new(InMemoryQueue::new());
        let (_trigger, listener) = shutdown::channel();
        queue.fail_next_acknowledges(1).await;
        let id = queue
            .push(Event::new(EventKind::Credit, dec!(1), "ACC-1").to_json().unwrap())
            .await;

        let err = poll_loop(&store, &queue, listener).poll_once().await.unwrap_err();

        assert!(matches!(err, WorkerError::Queue(_)));
        assert_eq!(
            queue.outcomes_for(id).await,
            vec![crate::queue::QueueAction::Abandoned(id)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_survives_peek_fault_and_stops_on_shutdown() {
        let store = InMemoryAccountStore::with_accounts([Account::new("ACC-1", dec!(50))]);
        let queue = Arc::new(InMemoryQueue::new());
        let (trigger, listener) = shutdown::channel();
        queue.fail_next_peeks(1).await;
        let id = queue
            .push(Event::new(EventKind::Credit, dec!(100), "ACC-1").to_json().unwrap())
            .await;

        let handle = tokio::spawn(poll_loop(&store, &queue, listener).run());

        // First poll fails, the second (after one interval) processes the message
        tokio::time::sleep(Duration::from_secs(15)).await;
        trigger.trigger();
        let stats = handle.await.unwrap();

        assert_eq!(stats.errors, 1);
        assert_eq!(stats.succeeded, 1);
        assert!(queue.is_acknowledged(id).await);
        assert_eq!(store.balance_of("ACC-1").await, Some(dec!(150)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_exits_immediately_when_already_shut_down() {
        let store = InMemoryAccountStore::new();
        let queue = Arc::new(InMemoryQueue::new());
        let (trigger, listener) = shutdown::channel();
        queue.push("{}").await;
        trigger.trigger();

        let stats = poll_loop(&store, &queue, listener).run().await;

        assert_eq!(stats, LoopStats::default());
        assert_eq!(queue.pending_count().await, 1);
    }
}
