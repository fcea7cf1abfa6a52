//! Postgres Message Queue
//!
//! Queue stored in the `event_queue` table. Peeking claims a row with
//! `FOR UPDATE SKIP LOCKED` and stamps a lease in `locked_until`; a row whose
//! lease ran out becomes visible again.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

use super::{MessageQueue, QueueError, QueueMessage};

/// Message queue over a Postgres pool
#[derive(Debug, Clone)]
pub struct PgMessageQueue {
    pool: PgPool,
    lock_duration: Duration,
}

impl PgMessageQueue {
    pub fn new(pool: PgPool, lock_duration: Duration) -> Self {
        Self {
            pool,
            lock_duration,
        }
    }

    /// Publish a message body; returns the transport id
    pub async fn enqueue(&self, body: &str) -> Result<Uuid, QueueError> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO event_queue (id, body)
            VALUES ($1, $2)
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(body)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    /// Current status of a message (`pending`, `locked`, `completed`, `dead_lettered`)
    pub async fn status_of(&self, id: Uuid) -> Result<Option<String>, QueueError> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM event_queue WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(status)
    }
}

/// Map an update that touched no row to a lost lock
fn ensure_locked(id: Uuid, rows_affected: u64) -> Result<(), QueueError> {
    if rows_affected == 0 {
        return Err(QueueError::LockLost(id));
    }
    Ok(())
}

#[async_trait]
impl MessageQueue for PgMessageQueue {
    async fn peek_next(&self) -> Result<Option<QueueMessage>, QueueError> {
        let row: Option<(Uuid, String, i32, DateTime<Utc>)> = sqlx::query_as(
            r#"
            UPDATE event_queue
            SET
                status = 'locked',
                locked_until = NOW() + make_interval(secs => $1),
                delivery_count = delivery_count + 1,
                updated_at = NOW()
            WHERE id = (
                SELECT id FROM event_queue
                WHERE (status = 'pending' AND available_at <= NOW())
                   OR (status = 'locked' AND locked_until < NOW())
                ORDER BY enqueued_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, body, delivery_count, enqueued_at
            "#,
        )
        .bind(self.lock_duration.as_secs_f64())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, body, delivery_count, enqueued_at)| QueueMessage {
            id,
            body,
            delivery_count,
            enqueued_at,
        }))
    }

    async fn acknowledge(&self, id: Uuid) -> Result<(), QueueError> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE event_queue
            SET status = 'completed', locked_until = NULL, updated_at = NOW()
            WHERE id = $1 AND status = 'locked'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        ensure_locked(id, rows_affected)
    }

    async fn dead_letter(&self, id: Uuid, reason: &str) -> Result<(), QueueError> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE event_queue
            SET status = 'dead_lettered', dead_letter_reason = $2,
                locked_until = NULL, updated_at = NOW()
            WHERE id = $1 AND status = 'locked'
            "#,
        )
        .bind(id)
        .bind(reason)
        .execute(&self.pool)
        .await?
        .rows_affected();

        ensure_locked(id, rows_affected)
    }

    async fn abandon(&self, id: Uuid) -> Result<(), QueueError> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE event_queue
            SET status = 'pending', locked_until = NULL, updated_at = NOW()
            WHERE id = $1 AND status = 'locked'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        ensure_locked(id, rows_affected)
    }

    async fn reschedule(&self, id: Uuid, not_before: DateTime<Utc>) -> Result<(), QueueError> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE event_queue
            SET status = 'pending', available_at = $2,
                locked_until = NULL, updated_at = NOW()
            WHERE id = $1 AND status = 'locked'
            "#,
        )
        .bind(id)
        .bind(not_before)
        .execute(&self.pool)
        .await?
        .rows_affected();

        ensure_locked(id, rows_affected)
    }
}
