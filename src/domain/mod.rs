//! Domain module
//!
//! Core domain types: balance events and bank accounts.

pub mod account;
pub mod event;

pub use account::Account;
pub use event::{Event, EventKind};
