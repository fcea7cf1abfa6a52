//! Bank Account
//!
//! Persisted account state as read from and written to the account store.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A bank account, looked up by its external id.
///
/// Balances are allowed to go negative; no overdraft rule applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Store key
    pub id: Uuid,

    /// Identifier referenced by events (`AccountId` on the wire)
    pub external_id: String,

    pub balance: Decimal,
}

impl Account {
    pub fn new(external_id: impl Into<String>, balance: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            external_id: external_id.into(),
            balance,
        }
    }

    /// Return a copy of this account with `delta` added to the balance,
    /// or `None` if the new balance is outside the `Decimal` range.
    pub fn adjusted_by(&self, delta: Decimal) -> Option<Self> {
        let balance = self.balance.checked_add(delta)?;
        Some(Self {
            balance,
            ..self.clone()
        })
    }
}
