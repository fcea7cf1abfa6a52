//! Balance Events
//!
//! Events are decoded from queue message bodies and are immutable afterwards.
//! An event lives only for the duration of processing one queue item.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Kind of balance mutation requested by an event.
///
/// Anything other than `Credit` or `Debit` on the wire is kept as
/// `Unrecognized` so that the transaction processor can reject it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    Credit,
    Debit,
    Unrecognized(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Credit => "Credit",
            EventKind::Debit => "Debit",
            EventKind::Unrecognized(raw) => raw,
        }
    }
}

impl From<String> for EventKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Credit" => EventKind::Credit,
            "Debit" => EventKind::Debit,
            _ => EventKind::Unrecognized(s),
        }
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One queued instruction to credit or debit an account.
///
/// # Wire format
/// ```json
/// {"Id": "<uuid>", "Type": "Credit", "Amount": 100.00, "AccountId": "ACC-1"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "Id")]
    pub id: Uuid,

    #[serde(rename = "Type")]
    pub kind: EventKind,

    /// Decoded from the literal digits, never through a float
    #[serde(rename = "Amount", with = "rust_decimal::serde::arbitrary_precision")]
    pub amount: Decimal,

    /// External id of the account to mutate
    #[serde(rename = "AccountId")]
    pub target_account: String,
}

impl Event {
    pub fn new(kind: EventKind, amount: Decimal, target_account: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            amount,
            target_account: target_account.into(),
        }
    }

    /// Decode an event from a queue message body.
    pub fn from_json(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Signed balance change for this event, `None` for an unrecognized kind.
    pub fn signed_amount(&self) -> Option<Decimal> {
        match self.kind {
            EventKind::Credit => Some(self.amount),
            EventKind::Debit => Some(-self.amount),
            EventKind::Unrecognized(_) => None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Event {{ id: {}, kind: {}, amount: {}, account: {} }}",
            self.id, self.kind, self.amount, self.target_account
        )
    }
}
