//! Account Store module
//!
//! The account store is the only shared mutable state touched while
//! processing a message. All access goes through a unit of work that is
//! either committed as a whole or rolled back.

mod error;
mod memory;
mod postgres;

use async_trait::async_trait;

use crate::domain::Account;

pub use error::StoreError;
pub use memory::{InMemoryAccountStore, MemoryTx, StoreFault};
pub use postgres::PgAccountStore;

/// Transactional access to bank accounts.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Handle for one atomic unit of work
    type Tx: Send;

    /// Open a new unit of work
    async fn begin_unit_of_work(&self) -> Result<Self::Tx, StoreError>;

    /// Find an account by external id, locking it for the rest of the unit of work
    async fn find_account_by_external_id(
        &self,
        tx: &mut Self::Tx,
        external_id: &str,
    ) -> Result<Option<Account>, StoreError>;

    /// Stage an updated account inside the unit of work
    async fn persist(&self, tx: &mut Self::Tx, account: &Account) -> Result<(), StoreError>;

    async fn commit(&self, tx: Self::Tx) -> Result<(), StoreError>;

    async fn rollback(&self, tx: Self::Tx) -> Result<(), StoreError>;
}
