//! # Domain Module
//!
//! Core domain types for the Message Router.

pub mod errors;
pub mod ledger;
pub mod retry;
pub mod value_objects;

pub use errors::*;
pub use ledger::{LedgerEntry, MessageLedger};
pub use retry::RetryPolicy;
pub use value_objects::*;
