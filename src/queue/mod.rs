//! Message Queue module
//!
//! Durable queue the worker consumes from. Messages are peeked under a
//! lease and stay claimed until the worker acknowledges, dead-letters,
//! abandons or reschedules them.

mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use memory::{InMemoryQueue, QueueAction};
pub use postgres::PgMessageQueue;

/// A message claimed from the queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    /// Transport id; handle for every queue action
    pub id: Uuid,
    /// Raw message body (JSON event)
    pub body: String,
    /// How many times this message has been handed out, this delivery included
    pub delivery_count: i32,
    pub enqueued_at: DateTime<Utc>,
}

/// Queue transport errors
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The message is no longer claimed by this consumer
    #[error("Lock lost for message {0}")]
    LockLost(Uuid),

    /// The transport could not be reached
    #[error("Queue unavailable: {0}")]
    Unavailable(String),
}

/// Consumer side of a durable message queue
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Claim the next available message without removing it
    async fn peek_next(&self) -> Result<Option<QueueMessage>, QueueError>;

    /// Complete the message; it will not be delivered again
    async fn acknowledge(&self, id: Uuid) -> Result<(), QueueError>;

    /// Move the message to the dead-letter sink
    async fn dead_letter(&self, id: Uuid, reason: &str) -> Result<(), QueueError>;

    /// Release the lock without any other action
    async fn abandon(&self, id: Uuid) -> Result<(), QueueError>;

    /// Release the lock and hide the message until `not_before`
    async fn reschedule(&self, id: Uuid, not_before: DateTime<Utc>) -> Result<(), QueueError>;
}
