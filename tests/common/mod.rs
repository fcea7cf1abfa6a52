//! Common test utilities
#![allow(dead_code)]

use std::sync::Arc;

use banking_event_receiver::queue::InMemoryQueue;
use banking_event_receiver::store::InMemoryAccountStore;
use banking_event_receiver::worker::{shutdown, PollLoop, ShutdownTrigger, WorkerConfig};
use banking_event_receiver::{Account, Event, EventKind, TransactionProcessor};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

/// Worker wired to in-memory collaborators
pub struct Harness {
    pub store: InMemoryAccountStore,
    pub queue: Arc<InMemoryQueue>,
    pub worker: PollLoop<InMemoryAccountStore, InMemoryQueue>,
    pub trigger: ShutdownTrigger,
}

pub fn harness(accounts: &[(&str, Decimal)]) -> Harness {
    let store = InMemoryAccountStore::with_accounts(
        accounts
            .iter()
            .map(|(external_id, balance)| Account::new(*external_id, *balance)),
    );
    let queue = Arc::new(InMemoryQueue::new());
    let (trigger, listener) = shutdown::channel();
    let worker = PollLoop::new(
        TransactionProcessor::new(store.clone()),
        queue.clone(),
        WorkerConfig::default(),
        listener,
    );

    Harness {
        store,
        queue,
        worker,
        trigger,
    }
}

/// Publish an event; returns the transport id and the event
pub async fn enqueue(
    queue: &InMemoryQueue,
    kind: EventKind,
    amount: Decimal,
    account: &str,
) -> (Uuid, Event) {
    let event = Event::new(kind, amount, account);
    let id = queue.push(event.to_json().expect("event serializes")).await;
    (id, event)
}

/// Setup test database - create schema, truncate tables
pub async fn setup_test_db() -> PgPool {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set for tests");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    for statement in include_str!("../../migrations/0001_init.sql")
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        sqlx::query(statement)
            .execute(&pool)
            .await
            .expect("Failed to apply migration");
    }

    sqlx::query("TRUNCATE TABLE event_queue, bank_accounts")
        .execute(&pool)
        .await
        .expect("Failed to clean up DB");

    pool
}
