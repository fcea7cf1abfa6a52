//! Database module
//!
//! Connection and schema verification utilities.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::Config;
use crate::error::{WorkerError, WorkerResult};

/// Tables the worker reads and writes
const REQUIRED_TABLES: [&str; 2] = ["bank_accounts", "event_queue"];

/// Create the connection pool
pub async fn connect(config: &Config) -> WorkerResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;

    Ok(pool)
}

/// Verify database connectivity
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Check that every required table exists.
/// Tables are created by the SQL files in `migrations/`.
pub async fn check_schema(pool: &PgPool) -> WorkerResult<()> {
    for table in REQUIRED_TABLES {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )
            "#,
        )
        .bind(table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("Required table '{}' does not exist", table);
            return Err(WorkerError::SchemaIncomplete(table.to_string()));
        }
    }

    Ok(())
}
