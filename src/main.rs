//! Banking Event Receiver
//!
//! Consumes credit/debit events from the event queue and applies them to
//! bank account balances. Failed messages are retried on a fixed backoff
//! schedule and dead-lettered once the budget is spent.

use std::sync::Arc;

use banking_event_receiver::config::LogFormat;
use banking_event_receiver::jobs::{HousekeepingConfig, HousekeepingJob};
use banking_event_receiver::queue::PgMessageQueue;
use banking_event_receiver::store::PgAccountStore;
use banking_event_receiver::worker::{shutdown, PollLoop};
use banking_event_receiver::{db, Config, TransactionProcessor};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging
fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "banking_event_receiver=debug,event_receiver=debug".into());

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(config.log_format);

    tracing::info!(environment = %config.environment, "Starting banking event receiver");
    tracing::info!("Connecting to database...");

    let pool = db::connect(&config).await?;
    db::verify_connection(&pool).await?;
    db::check_schema(&pool).await?;

    tracing::info!("Database connected successfully");

    let (trigger, listener) = shutdown::channel();

    let housekeeping = HousekeepingJob::with_config(
        pool.clone(),
        HousekeepingConfig {
            interval: config.housekeeping_interval,
            retention: config.queue_retention,
        },
    )
    .start(listener.clone());

    let processor = TransactionProcessor::new(PgAccountStore::new(pool.clone()));
    let queue = Arc::new(PgMessageQueue::new(pool.clone(), config.lock_duration));
    let worker = tokio::spawn(
        PollLoop::new(processor, queue, config.worker_config(), listener).run(),
    );

    shutdown_signal().await;
    trigger.trigger();

    // The in-flight unit of work finishes or rolls back before the loop returns
    let stats = worker.await?;
    housekeeping.await?;

    tracing::info!(
        succeeded = stats.succeeded,
        dead_lettered = stats.dead_lettered,
        "Worker stopped"
    );

    pool.close().await;
    tracing::info!("Database connections closed. Goodbye!");

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
