//! Scheduled Jobs
//!
//! Background housekeeping for the event queue. Acknowledged messages are
//! purged once they are older than the retention period; dead-lettered
//! messages are kept for inspection.

use sqlx::PgPool;
use std::time::Duration;
use tokio::time::interval;

use crate::worker::Shutdown;

// =========================================================================
// Completed Message Purge
// =========================================================================

/// Delete acknowledged messages last touched more than `retention` ago
pub async fn purge_completed_messages(pool: &PgPool, retention: Duration) -> Result<u64, JobError> {
    let result = sqlx::query(
        r#"
        DELETE FROM event_queue
        WHERE status = 'completed'
          AND updated_at < NOW() - make_interval(secs => $1)
        "#,
    )
    .bind(retention.as_secs_f64())
    .execute(pool)
    .await?;

    let rows_deleted = result.rows_affected();

    if rows_deleted > 0 {
        tracing::info!(
            rows_deleted = rows_deleted,
            "Purged completed queue messages"
        );
    }

    Ok(rows_deleted)
}

/// Count messages sitting in the dead-letter sink
pub async fn count_dead_lettered(pool: &PgPool) -> Result<i64, JobError> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM event_queue WHERE status = 'dead_lettered'")
            .fetch_one(pool)
            .await?;

    Ok(count)
}

// =========================================================================
// Housekeeping Job
// =========================================================================

/// Configuration for the housekeeping job
#[derive(Debug, Clone)]
pub struct HousekeepingConfig {
    /// How often the job runs (default: 1 hour)
    pub interval: Duration,
    /// Age after which completed messages are purged (default: 7 days)
    pub retention: Duration,
}

impl Default for HousekeepingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
            retention: Duration::from_secs(7 * 24 * 3600),
        }
    }
}

/// Periodic queue maintenance
pub struct HousekeepingJob {
    pool: PgPool,
    config: HousekeepingConfig,
}

impl HousekeepingJob {
    pub fn with_config(pool: PgPool, config: HousekeepingConfig) -> Self {
        Self { pool, config }
    }

    /// Start the job in the background; it stops when `shutdown` triggers
    pub fn start(self, shutdown: Shutdown) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run(shutdown).await;
        })
    }

    async fn run(&self, mut shutdown: Shutdown) {
        tracing::info!("Housekeeping job started");

        let mut ticker = interval(self.config.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_once().await;
                }
                _ = shutdown.triggered() => break,
            }
        }

        tracing::info!("Housekeeping job stopped");
    }

    /// Run every maintenance step once
    pub async fn run_once(&self) {
        if let Err(e) = purge_completed_messages(&self.pool, self.config.retention).await {
            tracing::error!(error = %e, "Completed message purge failed");
        }

        match count_dead_lettered(&self.pool).await {
            Ok(count) if count > 0 => {
                tracing::warn!(dead_lettered = count, "Dead-lettered messages awaiting inspection");
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "Dead-letter count failed"),
        }
    }
}

/// Job execution errors
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}
