use async_trait::async_trait;
use uuid::Uuid;

use crate::db::models::{Account, ReportFilter, Transaction, User};
use crate::error::DatabaseError;

/// Persistence of user records.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, DatabaseError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, DatabaseError>;

    /// Fails with [`DatabaseError::Duplicate`] if the username is taken.
    async fn insert(&self, user: &User) -> Result<User, DatabaseError>;
}

/// Persistence of accounts and their transactions.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn account_number_exists(&self, number: &str) -> Result<bool, DatabaseError>;

    async fn insert_account(&self, account: &Account) -> Result<Account, DatabaseError>;

    async fn accounts_for_user(&self, user_id: Uuid) -> Result<Vec<Account>, DatabaseError>;

    async fn account_for_user(
        &self,
        user_id: Uuid,
        account_id: Uuid,
    ) -> Result<Option<Account>, DatabaseError>;

    async fn update_account(&self, account: &Account) -> Result<Account, DatabaseError>;

    /// Stores the transaction and applies its balance delta to the account as
    /// one unit. Returns the account as it stands afterwards.
    async fn record_transaction(&self, tx: &Transaction) -> Result<Account, DatabaseError>;

    async fn transactions_for_user(&self, user_id: Uuid) -> Result<Vec<Transaction>, DatabaseError>;

    async fn transaction_by_id(&self, id: Uuid) -> Result<Option<Transaction>, DatabaseError>;

    /// Transactions on the user's accounts matching `filter`, oldest first.
    async fn report_transactions(
        &self,
        user_id: Uuid,
        filter: &ReportFilter,
    ) -> Result<Vec<Transaction>, DatabaseError>;
}
