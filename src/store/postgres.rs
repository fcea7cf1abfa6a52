//! Postgres Account Store
//!
//! Backs the account store with the `bank_accounts` table. A unit of work is
//! a database transaction; the looked-up row stays locked until it ends.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::Account;

use super::{AccountStore, StoreError};

/// Account store over a Postgres pool
#[derive(Debug, Clone)]
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new account (used for seeding and tests)
    pub async fn create_account(&self, account: &Account) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO bank_accounts (id, external_id, balance)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(account.id)
        .bind(&account.external_id)
        .bind(account.balance)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Read the committed balance of an account outside any unit of work
    pub async fn balance_of(&self, external_id: &str) -> Result<Option<Decimal>, StoreError> {
        let balance: Option<Decimal> = sqlx::query_scalar(
            "SELECT balance FROM bank_accounts WHERE external_id = $1",
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(balance)
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    type Tx = Transaction<'static, Postgres>;

    async fn begin_unit_of_work(&self) -> Result<Self::Tx, StoreError> {
        Ok(self.pool.begin().await?)
    }

    async fn find_account_by_external_id(
        &self,
        tx: &mut Self::Tx,
        external_id: &str,
    ) -> Result<Option<Account>, StoreError> {
        let row: Option<(Uuid, String, Decimal)> = sqlx::query_as(
            r#"
            SELECT id, external_id, balance
            FROM bank_accounts
            WHERE external_id = $1
            FOR UPDATE
            "#,
        )
        .bind(external_id)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(row.map(|(id, external_id, balance)| Account {
            id,
            external_id,
            balance,
        }))
    }

    async fn persist(&self, tx: &mut Self::Tx, account: &Account) -> Result<(), StoreError> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE bank_accounts
            SET balance = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(account.id)
        .bind(account.balance)
        .execute(&mut **tx)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            return Err(StoreError::RowMissing(account.id));
        }

        Ok(())
    }

    async fn commit(&self, tx: Self::Tx) -> Result<(), StoreError> {
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&self, tx: Self::Tx) -> Result<(), StoreError> {
        tx.rollback().await?;
        Ok(())
    }
}
