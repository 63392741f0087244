//! Database module for the ledger server
//!
//! Relational persistence of users, accounts and transactions behind the
//! [`CredentialStore`] and [`LedgerStore`] traits, with a Postgres
//! implementation and an in-process one.

pub mod memory;
pub mod models;
pub mod operations;
pub mod store;

pub use memory::MemoryStore;
pub use models::{Account, ReportFilter, Transaction, TransactionKind, User};
pub use operations::DbOperations;
pub use store::{CredentialStore, LedgerStore};
