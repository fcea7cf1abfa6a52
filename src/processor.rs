//! Transaction Processor
//!
//! Applies one event to the account store inside a single unit of work.

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::classify::ProcessingError;
use crate::domain::{Account, Event};
use crate::store::AccountStore;

/// Result of a committed balance mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedTransaction {
    pub account_id: Uuid,
    pub external_id: String,
    pub previous_balance: Decimal,
    pub new_balance: Decimal,
}

/// Applies events atomically against an account store
#[derive(Debug, Clone)]
pub struct TransactionProcessor<S> {
    store: S,
}

impl<S: AccountStore> TransactionProcessor<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Apply an event as exactly one committed balance change.
    ///
    /// On any error nothing is committed. Terminal errors are returned as
    /// they were raised; store faults come back as `Transient`.
    pub async fn apply(&self, event: &Event) -> Result<AppliedTransaction, ProcessingError> {
        let mut tx = self.store.begin_unit_of_work().await?;

        let (account, new_balance) = match self.mutate(&mut tx, event).await {
            Ok(mutated) => mutated,
            Err(e) => {
                if let Err(rollback_err) = self.store.rollback(tx).await {
                    tracing::warn!(
                        event_id = %event.id,
                        error = %rollback_err,
                        "Rollback failed, relying on transaction drop"
                    );
                }
                return Err(e);
            }
        };

        if let Err(e) = self.store.commit(tx).await {
            tracing::debug!(
                event_id = %event.id,
                conflict = e.is_conflict(),
                error = %e,
                "Commit failed"
            );
            return Err(e.into());
        }

        let applied = AppliedTransaction {
            account_id: account.id,
            external_id: account.external_id,
            previous_balance: account.balance,
            new_balance,
        };

        tracing::info!(
            event_id = %event.id,
            kind = %event.kind,
            amount = %event.amount,
            account = %applied.external_id,
            new_balance = %applied.new_balance,
            "Transaction processed"
        );

        Ok(applied)
    }

    /// Steps inside the unit of work; returns the account as it was before
    /// the change together with its new balance
    async fn mutate(
        &self,
        tx: &mut S::Tx,
        event: &Event,
    ) -> Result<(Account, Decimal), ProcessingError> {
        let account = self
            .store
            .find_account_by_external_id(tx, &event.target_account)
            .await?
            .ok_or_else(|| ProcessingError::AccountNotFound(event.target_account.clone()))?;

        let delta = event
            .signed_amount()
            .ok_or_else(|| ProcessingError::InvalidEventKind(event.kind.to_string()))?;

        let updated = account
            .adjusted_by(delta)
            .ok_or_else(|| ProcessingError::BalanceOverflow(account.external_id.clone()))?;

        self.store.persist(tx, &updated).await?;

        Ok((account, updated.balance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::FailureKind;
    use crate::domain::EventKind;
    use crate::store::{InMemoryAccountStore, StoreFault};
    use rust_decimal_macros::dec;

    fn processor_with(external_id: &str, balance: Decimal) -> TransactionProcessor<InMemoryAccountStore> {
        TransactionProcessor::new(InMemoryAccountStore::with_accounts([Account::new(
            external_id,
            balance,
        )]))
    }

    #[tokio::test]
    async fn test_credit_adds_amount_with_one_commit() {
        let processor = processor_with("ACC-1", dec!(50));
        let event = Event::new(EventKind::Credit, dec!(100), "ACC-1");

        let applied = processor.apply(&event).await.unwrap();

        assert_eq!(applied.previous_balance, dec!(50));
        assert_eq!(applied.new_balance, dec!(150));
        assert_eq!(processor.store().balance_of("ACC-1").await, Some(dec!(150)));
        assert_eq!(processor.store().commit_count().await, 1);
        assert_eq!(processor.store().rollback_count().await, 0);
    }

    #[tokio::test]
    async fn test_debit_may_go_negative() {
        let processor = processor_with("ACC-1", dec!(10));
        let event = Event::new(EventKind::Debit, dec!(30), "ACC-1");

        let applied = processor.apply(&event).await.unwrap();

        assert_eq!(applied.new_balance, dec!(-20));
        assert_eq!(processor.store().balance_of("ACC-1").await, Some(dec!(-20)));
    }

    #[tokio::test]
    async fn test_unknown_account_is_terminal_without_commit() {
        let processor = processor_with("ACC-1", dec!(50));
        let event = Event::new(EventKind::Credit, dec!(100), "ACC-404");

        let err = processor.apply(&event).await.unwrap_err();

        assert!(matches!(err, ProcessingError::AccountNotFound(ref id) if id == "ACC-404"));
        assert_eq!(err.kind(), FailureKind::Terminal);
        assert_eq!(processor.store().commit_count().await, 0);
        assert_eq!(processor.store().rollback_count().await, 1);
        assert_eq!(processor.store().balance_of("ACC-1").await, Some(dec!(50)));
    }

    #[tokio::test]
    async fn test_invalid_kind_is_terminal_without_commit() {
        let processor = processor_with("ACC-1", dec!(50));
        let event = Event::new(EventKind::Unrecognized("Refund".to_string()), dec!(5), "ACC-1");

        let err = processor.apply(&event).await.unwrap_err();

        assert!(matches!(err, ProcessingError::InvalidEventKind(ref kind) if kind == "Refund"));
        assert!(err.is_terminal());
        assert_eq!(processor.store().commit_count().await, 0);
        assert_eq!(processor.store().balance_of("ACC-1").await, Some(dec!(50)));
    }

    #[tokio::test]
    async fn test_persist_failure_rolls_back_as_retryable() {
        let processor = processor_with("ACC-1", dec!(50));
        processor.store().fail_next(StoreFault::Persist, 1).await;
        let event = Event::new(EventKind::Credit, dec!(100), "ACC-1");

        let err = processor.apply(&event).await.unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(processor.store().rollback_count().await, 1);
        assert_eq!(processor.store().balance_of("ACC-1").await, Some(dec!(50)));
    }

    #[tokio::test]
    async fn test_commit_conflict_leaves_no_partial_change() {
        let processor = processor_with("ACC-1", dec!(50));
        processor.store().fail_next(StoreFault::Commit, 1).await;
        let event = Event::new(EventKind::Debit, dec!(20), "ACC-1");

        let err = processor.apply(&event).await.unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(processor.store().commit_count().await, 0);
        assert_eq!(processor.store().balance_of("ACC-1").await, Some(dec!(50)));

        // The same event succeeds once the store recovers
        processor.apply(&event).await.unwrap();
        assert_eq!(processor.store().balance_of("ACC-1").await, Some(dec!(30)));
    }

    #[tokio::test]
    async fn test_begin_failure_is_retryable() {
        let processor = processor_with("ACC-1", dec!(50));
        processor.store().fail_next(StoreFault::Begin, 1).await;
        let event = Event::new(EventKind::Credit, dec!(1), "ACC-1");

        let err = processor.apply(&event).await.unwrap_err();

        assert!(matches!(err, ProcessingError::Transient(_)));
        assert_eq!(processor.store().rollback_count().await, 0);
    }

    #[tokio::test]
    async fn test_lookup_failure_is_retryable() {
        let processor = processor_with("ACC-1", dec!(50));
        processor.store().fail_next(StoreFault::Lookup, 1).await;
        let event = Event::new(EventKind::Credit, dec!(1), "ACC-1");

        let err = processor.apply(&event).await.unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(processor.store().rollback_count().await, 1);
    }

    #[tokio::test]
    async fn test_balance_overflow_is_terminal_without_commit() {
        let processor = processor_with("ACC-1", dec!(50));
        let event = Event::new(EventKind::Credit, Decimal::MAX, "ACC-1");

        let err = processor.apply(&event).await.unwrap_err();

        assert!(matches!(err, ProcessingError::BalanceOverflow(ref id) if id == "ACC-1"));
        assert!(err.is_terminal());
        assert_eq!(processor.store().commit_count().await, 0);
        assert_eq!(processor.store().rollback_count().await, 1);
        assert_eq!(processor.store().balance_of("ACC-1").await, Some(dec!(50)));
    }

    #[tokio::test]
    async fn test_debit_overflow_below_minimum_is_terminal() {
        let processor = processor_with("ACC-1", Decimal::MIN);
        let event = Event::new(EventKind::Debit, dec!(1), "ACC-1");

        let err = processor.apply(&event).await.unwrap_err();

        assert!(matches!(err, ProcessingError::BalanceOverflow(_)));
        assert_eq!(processor.store().balance_of("ACC-1").await, Some(Decimal::MIN));
    }

    #[tokio::test]
    async fn test_failed_rollback_keeps_original_error() {
        let processor = processor_with("ACC-1", dec!(50));
        processor.store().fail_next(StoreFault::Rollback, 1).await;
        let event = Event::new(EventKind::Credit, dec!(10), "ACC-404");

        let err = processor.apply(&event).await.unwrap_err();

        assert!(matches!(err, ProcessingError::AccountNotFound(ref id) if id == "ACC-404"));
        assert!(err.is_terminal());
        assert_eq!(processor.store().commit_count().await, 0);
        assert_eq!(processor.store().balance_of("ACC-1").await, Some(dec!(50)));
    }
}
