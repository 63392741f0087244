use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::models::{Account, ReportFilter, Transaction, User};
use crate::db::store::{CredentialStore, LedgerStore};
use crate::error::DatabaseError;

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    accounts: HashMap<Uuid, Account>,
    transactions: Vec<Transaction>,
}

/// In-process implementation of the credential and ledger stores.
///
/// Every operation takes the table lock once, so compound operations such as
/// [`LedgerStore::record_transaction`] are atomic with respect to each other.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn user_count(&self) -> usize {
        self.tables.read().await.users.len()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, DatabaseError> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.username == username).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, DatabaseError> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn insert(&self, user: &User) -> Result<User, DatabaseError> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.username == user.username) || tables.users.contains_key(&user.id) {
            return Err(DatabaseError::Duplicate);
        }
        tables.users.insert(user.id, user.clone());
        Ok(user.clone())
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn account_number_exists(&self, number: &str) -> Result<bool, DatabaseError> {
        let tables = self.tables.read().await;
        Ok(tables.accounts.values().any(|a| a.number == number))
    }

    async fn insert_account(&self, account: &Account) -> Result<Account, DatabaseError> {
        let mut tables = self.tables.write().await;
        if tables.accounts.values().any(|a| a.number == account.number) {
            return Err(DatabaseError::Duplicate);
        }
        tables.accounts.insert(account.id, account.clone());
        Ok(account.clone())
    }

    async fn accounts_for_user(&self, user_id: Uuid) -> Result<Vec<Account>, DatabaseError> {
        let tables = self.tables.read().await;
        let mut accounts: Vec<Account> = tables
            .accounts
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        accounts.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(accounts)
    }

    async fn account_for_user(
        &self,
        user_id: Uuid,
        account_id: Uuid,
    ) -> Result<Option<Account>, DatabaseError> {
        let tables = self.tables.read().await;
        Ok(tables
            .accounts
            .get(&account_id)
            .filter(|a| a.user_id == user_id)
            .cloned())
    }

    async fn update_account(&self, account: &Account) -> Result<Account, DatabaseError> {
        let mut tables = self.tables.write().await;
        if tables
            .accounts
            .values()
            .any(|a| a.number == account.number && a.id != account.id)
        {
            return Err(DatabaseError::Duplicate);
        }
        let stored = tables
            .accounts
            .get_mut(&account.id)
            .filter(|a| a.user_id == account.user_id)
            .ok_or(DatabaseError::NotFound)?;
        stored.number = account.number.clone();
        stored.balance = account.balance;
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn record_transaction(&self, tx: &Transaction) -> Result<Account, DatabaseError> {
        let mut tables = self.tables.write().await;
        let account = tables
            .accounts
            .get_mut(&tx.account_id)
            .ok_or(DatabaseError::NotFound)?;
        account.balance += tx.kind.balance_delta(tx.amount);
        account.updated_at = Utc::now();
        let account = account.clone();
        tables.transactions.push(tx.clone());
        Ok(account)
    }

    async fn transactions_for_user(&self, user_id: Uuid) -> Result<Vec<Transaction>, DatabaseError> {
        self.report_transactions(user_id, &ReportFilter::default()).await
    }

    async fn transaction_by_id(&self, id: Uuid) -> Result<Option<Transaction>, DatabaseError> {
        let tables = self.tables.read().await;
        Ok(tables.transactions.iter().find(|t| t.id == id).cloned())
    }

    async fn report_transactions(
        &self,
        user_id: Uuid,
        filter: &ReportFilter,
    ) -> Result<Vec<Transaction>, DatabaseError> {
        let tables = self.tables.read().await;
        let mut selected: Vec<Transaction> = tables
            .transactions
            .iter()
            .filter(|t| {
                tables
                    .accounts
                    .get(&t.account_id)
                    .map_or(false, |a| a.user_id == user_id)
            })
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        selected.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        if let Some(limit) = filter.limit {
            selected = selected
                .into_iter()
                .skip(filter.offset() as usize)
                .take(limit as usize)
                .collect();
        }
        Ok(selected)
    }
}
