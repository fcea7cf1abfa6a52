//! In-Memory Message Queue
//!
//! Queue kept in process memory. Every action taken by the consumer is
//! recorded so callers can check which terminal outcome a message reached.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{MessageQueue, QueueError, QueueMessage};

/// Action the consumer took on a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueAction {
    Peeked(Uuid),
    Acknowledged(Uuid),
    DeadLettered { id: Uuid, reason: String },
    Abandoned(Uuid),
    Rescheduled { id: Uuid, not_before: DateTime<Utc> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Pending,
    Locked,
    Completed,
    DeadLettered,
}

#[derive(Debug)]
struct Entry {
    message: QueueMessage,
    status: Status,
    available_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct State {
    entries: Vec<Entry>,
    actions: Vec<QueueAction>,
    failing_peeks: u32,
    failing_acknowledges: u32,
}

impl State {
    fn locked_entry(&mut self, id: Uuid) -> Result<&mut Entry, QueueError> {
        self.entries
            .iter_mut()
            .find(|e| e.message.id == id && e.status == Status::Locked)
            .ok_or(QueueError::LockLost(id))
    }
}

/// In-memory message queue; clones share the same state
#[derive(Debug, Clone, Default)]
pub struct InMemoryQueue {
    state: Arc<RwLock<State>>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a raw message body; returns the transport id
    pub async fn push(&self, body: impl Into<String>) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let mut state = self.state.write().await;
        state.entries.push(Entry {
            message: QueueMessage {
                id,
                body: body.into(),
                delivery_count: 0,
                enqueued_at: now,
            },
            status: Status::Pending,
            available_at: now,
        });
        id
    }

    /// Make the next `times` peeks fail with a transport error
    pub async fn fail_next_peeks(&self, times: u32) {
        self.state.write().await.failing_peeks += times;
    }

    /// Make the next `times` acknowledgements fail with a transport error
    pub async fn fail_next_acknowledges(&self, times: u32) {
        self.state.write().await.failing_acknowledges += times;
    }

    /// Every action recorded so far, in order
    pub async fn actions(&self) -> Vec<QueueAction> {
        self.state.read().await.actions.clone()
    }

    /// Actions recorded for one message, peeks excluded
    pub async fn outcomes_for(&self, id: Uuid) -> Vec<QueueAction> {
        self.state
            .read()
            .await
            .actions
            .iter()
            .filter(|action| match action {
                QueueAction::Peeked(_) => false,
                QueueAction::Acknowledged(a) | QueueAction::Abandoned(a) => *a == id,
                QueueAction::DeadLettered { id: a, .. } | QueueAction::Rescheduled { id: a, .. } => {
                    *a == id
                }
            })
            .cloned()
            .collect()
    }

    pub async fn is_acknowledged(&self, id: Uuid) -> bool {
        self.status(id).await == Some(Status::Completed)
    }

    pub async fn is_dead_lettered(&self, id: Uuid) -> bool {
        self.status(id).await == Some(Status::DeadLettered)
    }

    /// Number of messages that could still be delivered
    pub async fn pending_count(&self) -> usize {
        self.state
            .read()
            .await
            .entries
            .iter()
            .filter(|e| matches!(e.status, Status::Pending | Status::Locked))
            .count()
    }

    /// Put a message back on the queue whatever its state, as a faulty
    /// transport would
    pub async fn redeliver(&self, id: Uuid) -> bool {
        let mut state = self.state.write().await;
        match state.entries.iter_mut().find(|e| e.message.id == id) {
            Some(entry) => {
                entry.status = Status::Pending;
                entry.available_at = Utc::now();
                true
            }
            None => false,
        }
    }

    async fn status(&self, id: Uuid) -> Option<Status> {
        self.state
            .read()
            .await
            .entries
            .iter()
            .find(|e| e.message.id == id)
            .map(|e| e.status)
    }
}

#[async_trait]
impl MessageQueue for InMemoryQueue {
    async fn peek_next(&self) -> Result<Option<QueueMessage>, QueueError> {
        let mut state = self.state.write().await;
        if state.failing_peeks > 0 {
            state.failing_peeks -= 1;
            return Err(QueueError::Unavailable("injected peek fault".to_string()));
        }

        let now = Utc::now();
        let Some(entry) = state
            .entries
            .iter_mut()
            .find(|e| e.status == Status::Pending && e.available_at <= now)
        else {
            return Ok(None);
        };

        entry.status = Status::Locked;
        entry.message.delivery_count += 1;
        let message = entry.message.clone();
        state.actions.push(QueueAction::Peeked(message.id));

        Ok(Some(message))
    }

    async fn acknowledge(&self, id: Uuid) -> Result<(), QueueError> {
        let mut state = self.state.write().await;
        if state.failing_acknowledges > 0 {
            state.failing_acknowledges -= 1;
            return Err(QueueError::Unavailable("injected acknowledge fault".to_string()));
        }

        state.locked_entry(id)?.status = Status::Completed;
        state.actions.push(QueueAction::Acknowledged(id));
        Ok(())
    }

    async fn dead_letter(&self, id: Uuid, reason: &str) -> Result<(), QueueError> {
        let mut state = self.state.write().await;
        state.locked_entry(id)?.status = Status::DeadLettered;
        state.actions.push(QueueAction::DeadLettered {
            id,
            reason: reason.to_string(),
        });
        Ok(())
    }

    async fn abandon(&self, id: Uuid) -> Result<(), QueueError> {
        let mut state = self.state.write().await;
        state.locked_entry(id)?.status = Status::Pending;
        state.actions.push(QueueAction::Abandoned(id));
        Ok(())
    }

    async fn reschedule(&self, id: Uuid, not_before: DateTime<Utc>) -> Result<(), QueueError> {
        let mut state = self.state.write().await;
        let entry = state.locked_entry(id)?;
        entry.status = Status::Pending;
        entry.available_at = not_before;
        state.actions.push(QueueAction::Rescheduled { id, not_before });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_peeked_message_is_not_handed_out_twice() {
        let queue = InMemoryQueue::new();
        let id = queue.push("{}").await;

        let first = queue.peek_next().await.unwrap().unwrap();
        assert_eq!(first.id, id);
        assert_eq!(first.delivery_count, 1);
        assert!(queue.peek_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_abandon_makes_message_visible_again() {
        let queue = InMemoryQueue::new();
        let id = queue.push("{}").await;

        queue.peek_next().await.unwrap();
        queue.abandon(id).await.unwrap();

        let again = queue.peek_next().await.unwrap().unwrap();
        assert_eq!(again.id, id);
        assert_eq!(again.delivery_count, 2);
    }

    #[tokio::test]
    async fn test_reschedule_hides_message_until_not_before() {
        let queue = InMemoryQueue::new();
        let id = queue.push("{}").await;

        queue.peek_next().await.unwrap();
        queue
            .reschedule(id, Utc::now() + chrono::Duration::hours(1))
            .await
            .unwrap();

        assert!(queue.peek_next().await.unwrap().is_none());
        assert_eq!(queue.pending_count().await, 1);
    }

    #[tokio::test]
    async fn test_actions_require_lock() {
        let queue = InMemoryQueue::new();
        let id = queue.push("{}").await;

        assert!(matches!(queue.acknowledge(id).await, Err(QueueError::LockLost(_))));

        queue.peek_next().await.unwrap();
        queue.acknowledge(id).await.unwrap();
        assert!(queue.is_acknowledged(id).await);
        assert!(matches!(queue.dead_letter(id, "late").await, Err(QueueError::LockLost(_))));
    }
}
