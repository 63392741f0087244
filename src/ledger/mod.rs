//! Accounts, income/expense transactions and report export.

pub mod handlers;
pub mod service;

pub use service::LedgerService;
