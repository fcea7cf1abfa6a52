//! In-Memory Account Store
//!
//! Account store kept in process memory. Writes are staged per unit of work
//! and only become visible on commit. Faults can be injected per step so the
//! retry paths can be exercised without a database.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::Account;

use super::{AccountStore, StoreError};

/// Step of a unit of work at which an injected fault fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreFault {
    Begin,
    Lookup,
    Persist,
    Commit,
    Rollback,
}

#[derive(Debug, Default)]
struct State {
    accounts: HashMap<String, Account>,
    faults: HashMap<StoreFault, u32>,
    begins: u32,
    commits: u32,
    rollbacks: u32,
}

impl State {
    fn take_fault(&mut self, fault: StoreFault) -> Result<(), StoreError> {
        match self.faults.get_mut(&fault) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(match fault {
                    StoreFault::Commit => {
                        StoreError::Conflict("injected commit conflict".to_string())
                    }
                    other => StoreError::Unavailable(format!("injected {:?} fault", other)),
                })
            }
            _ => Ok(()),
        }
    }
}

/// Unit of work over the in-memory store
#[derive(Debug, Default)]
pub struct MemoryTx {
    staged: HashMap<String, Account>,
}

/// In-memory account store; clones share the same state
#[derive(Debug, Clone, Default)]
pub struct InMemoryAccountStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with the given accounts
    pub fn with_accounts(accounts: impl IntoIterator<Item = Account>) -> Self {
        let state = State {
            accounts: accounts
                .into_iter()
                .map(|a| (a.external_id.clone(), a))
                .collect(),
            ..State::default()
        };
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    /// Make the next `times` executions of `fault`'s step fail
    pub async fn fail_next(&self, fault: StoreFault, times: u32) {
        let mut state = self.state.write().await;
        *state.faults.entry(fault).or_insert(0) += times;
    }

    /// Committed balance of an account
    pub async fn balance_of(&self, external_id: &str) -> Option<Decimal> {
        let state = self.state.read().await;
        state.accounts.get(external_id).map(|a| a.balance)
    }

    pub async fn begin_count(&self) -> u32 {
        self.state.read().await.begins
    }

    pub async fn commit_count(&self) -> u32 {
        self.state.read().await.commits
    }

    pub async fn rollback_count(&self) -> u32 {
        self.state.read().await.rollbacks
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    type Tx = MemoryTx;

    async fn begin_unit_of_work(&self) -> Result<Self::Tx, StoreError> {
        let mut state = self.state.write().await;
        state.take_fault(StoreFault::Begin)?;
        state.begins += 1;
        Ok(MemoryTx::default())
    }

    async fn find_account_by_external_id(
        &self,
        tx: &mut Self::Tx,
        external_id: &str,
    ) -> Result<Option<Account>, StoreError> {
        let mut state = self.state.write().await;
        state.take_fault(StoreFault::Lookup)?;

        if let Some(staged) = tx.staged.get(external_id) {
            return Ok(Some(staged.clone()));
        }
        Ok(state.accounts.get(external_id).cloned())
    }

    async fn persist(&self, tx: &mut Self::Tx, account: &Account) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.take_fault(StoreFault::Persist)?;

        if !state.accounts.contains_key(&account.external_id) {
            return Err(StoreError::RowMissing(account.id));
        }
        tx.staged
            .insert(account.external_id.clone(), account.clone());
        Ok(())
    }

    async fn commit(&self, tx: Self::Tx) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.take_fault(StoreFault::Commit)?;

        for (external_id, account) in tx.staged {
            state.accounts.insert(external_id, account);
        }
        state.commits += 1;
        Ok(())
    }

    async fn rollback(&self, _tx: Self::Tx) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.take_fault(StoreFault::Rollback)?;
        state.rollbacks += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_staged_writes_invisible_until_commit() {
        let store = InMemoryAccountStore::with_accounts([Account::new("ACC-1", dec!(50))]);

        let mut tx = store.begin_unit_of_work().await.unwrap();
        let account = store
            .find_account_by_external_id(&mut tx, "ACC-1")
            .await
            .unwrap()
            .unwrap();
        store
            .persist(&mut tx, &account.adjusted_by(dec!(100)).unwrap())
            .await
            .unwrap();

        assert_eq!(store.balance_of("ACC-1").await, Some(dec!(50)));
        store.commit(tx).await.unwrap();
        assert_eq!(store.balance_of("ACC-1").await, Some(dec!(150)));
        assert_eq!(store.commit_count().await, 1);
    }

    #[tokio::test]
    async fn test_rollback_discards_staged_writes() {
        let store = InMemoryAccountStore::with_accounts([Account::new("ACC-1", dec!(50))]);

        let mut tx = store.begin_unit_of_work().await.unwrap();
        let account = store
            .find_account_by_external_id(&mut tx, "ACC-1")
            .await
            .unwrap()
            .unwrap();
        store
            .persist(&mut tx, &account.adjusted_by(dec!(-10)).unwrap())
            .await
            .unwrap();
        store.rollback(tx).await.unwrap();

        assert_eq!(store.balance_of("ACC-1").await, Some(dec!(50)));
        assert_eq!(store.rollback_count().await, 1);
        assert_eq!(store.commit_count().await, 0);
    }

    #[tokio::test]
    async fn test_injected_faults_fire_once_each() {
        let store = InMemoryAccountStore::new();
        store.fail_next(StoreFault::Begin, 2).await;

        assert!(store.begin_unit_of_work().await.is_err());
        assert!(store.begin_unit_of_work().await.is_err());
        assert!(store.begin_unit_of_work().await.is_ok());
        assert_eq!(store.begin_count().await, 1);
    }

    #[tokio::test]
    async fn test_commit_fault_is_conflict() {
        let store = InMemoryAccountStore::new();
        store.fail_next(StoreFault::Commit, 1).await;

        let tx = store.begin_unit_of_work().await.unwrap();
        let err = store.commit(tx).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_rollback_fault_still_discards_staged_writes() {
        let store = InMemoryAccountStore::with_accounts([Account::new("ACC-1", dec!(50))]);
        store.fail_next(StoreFault::Rollback, 1).await;

        let mut tx = store.begin_unit_of_work().await.unwrap();
        let account = store
            .find_account_by_external_id(&mut tx, "ACC-1")
            .await
            .unwrap()
            .unwrap();
        store
            .persist(&mut tx, &account.adjusted_by(dec!(5)).unwrap())
            .await
            .unwrap();

        assert!(store.rollback(tx).await.is_err());
        assert_eq!(store.balance_of("ACC-1").await, Some(dec!(50)));
        assert_eq!(store.rollback_count().await, 0);
    }
}
