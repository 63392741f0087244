use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::db::models::{Account, ReportFilter, Transaction, TransactionKind, User};
use crate::db::store::{CredentialStore, LedgerStore};
use crate::error::{AppError, DatabaseError};
use crate::report;

pub const MAX_ACCOUNT_NUMBER_LENGTH: usize = 34;

/// Account and transaction operations, always on behalf of one user.
pub struct LedgerService {
    store: Arc<dyn LedgerStore>,
    users: Arc<dyn CredentialStore>,
}

impl LedgerService {
    pub fn new(store: Arc<dyn LedgerStore>, users: Arc<dyn CredentialStore>) -> Self {
        Self { store, users }
    }

    pub async fn create_account(
        &self,
        user_id: Uuid,
        number: &str,
        balance: f64,
    ) -> Result<Account, AppError> {
        let number = validate_account_number(number)?;
        validate_finite("balance", balance)?;

        if self.store.account_number_exists(&number).await? {
            return Err(duplicate_number(&number));
        }

        match self.store.insert_account(&Account::new(user_id, number.clone(), balance)).await {
            Ok(account) => {
                info!("Created account {} for user {}", account.id, user_id);
                Ok(account)
            }
            Err(DatabaseError::Duplicate) => Err(duplicate_number(&number)),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn list_accounts(&self, user_id: Uuid) -> Result<Vec<Account>, AppError> {
        Ok(self.store.accounts_for_user(user_id).await?)
    }

    pub async fn get_account(&self, user_id: Uuid, account_id: Uuid) -> Result<Account, AppError> {
        self.store
            .account_for_user(user_id, account_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("account {}", account_id)))
    }

    pub async fn update_account(
        &self,
        user_id: Uuid,
        account_id: Uuid,
        number: Option<&str>,
        balance: Option<f64>,
    ) -> Result<Account, AppError> {
        let mut account = self.get_account(user_id, account_id).await?;

        if let Some(number) = number {
            let number = validate_account_number(number)?;
            if number != account.number && self.store.account_number_exists(&number).await? {
                return Err(duplicate_number(&number));
            }
            account.number = number;
        }
        if let Some(balance) = balance {
            validate_finite("balance", balance)?;
            account.balance = balance;
        }

        match self.store.update_account(&account).await {
            Ok(account) => Ok(account),
            Err(DatabaseError::Duplicate) => Err(duplicate_number(&account.number)),
            Err(e) => Err(e.into()),
        }
    }

    /// Records an income or expense and returns it with the updated account.
    pub async fn record_transaction(
        &self,
        user_id: Uuid,
        account_id: Uuid,
        kind: TransactionKind,
        amount: f64,
    ) -> Result<(Transaction, Account), AppError> {
        validate_finite("amount", amount)?;
        if amount <= 0.0 {
            return Err(AppError::ValidationError("amount must be positive".into()));
        }

        self.get_account(user_id, account_id).await?;

        let tx = Transaction::new(account_id, kind, amount);
        let account = self.store.record_transaction(&tx).await?;
        info!("Recorded {} of {} on account {}", kind, amount, account_id);
        Ok((tx, account))
    }

    pub async fn list_transactions(&self, user_id: Uuid) -> Result<Vec<Transaction>, AppError> {
        Ok(self.store.transactions_for_user(user_id).await?)
    }

    pub async fn get_transaction(&self, user_id: Uuid, id: Uuid) -> Result<Transaction, AppError> {
        let not_found = || AppError::NotFound(format!("transaction {}", id));

        let tx = self.store.transaction_by_id(id).await?.ok_or_else(not_found)?;
        // Someone else's transaction looks the same as a missing one.
        self.store
            .account_for_user(user_id, tx.account_id)
            .await?
            .ok_or_else(not_found)?;
        Ok(tx)
    }

    /// Builds the spreadsheet for the user's transactions matching `filter`.
    pub async fn export_report(&self, user_id: Uuid, filter: &ReportFilter) -> Result<Vec<u8>, AppError> {
        let user: User = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {}", user_id)))?;
        let accounts = self.store.accounts_for_user(user_id).await?;
        let transactions = self.store.report_transactions(user_id, filter).await?;

        info!("Exporting {} transactions for user {}", transactions.len(), user_id);
        report::render_workbook(&user, &accounts, &transactions)
    }
}

fn validate_account_number(number: &str) -> Result<String, AppError> {
    let number = number.trim();
    if number.is_empty() || number.chars().count() > MAX_ACCOUNT_NUMBER_LENGTH {
        return Err(AppError::ValidationError(format!(
            "account number must be 1 to {} characters",
            MAX_ACCOUNT_NUMBER_LENGTH
        )));
    }
    Ok(number.to_string())
}

fn validate_finite(field: &str, value: f64) -> Result<(), AppError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(AppError::ValidationError(format!("{} must be a finite number", field)))
    }
}

fn duplicate_number(number: &str) -> AppError {
    AppError::ConflictError(format!("account `{}` already exists", number))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    async fn service_with_user() -> (LedgerService, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let user = store.insert(&User::new("alice".into(), "hash".into())).await.unwrap();
        (LedgerService::new(store.clone(), store), user.id)
    }

    #[tokio::test]
    async fn test_create_and_fetch_account() {
        let (ledger, user_id) = service_with_user().await;
        let account = ledger.create_account(user_id, " KZ001 ", 10.0).await.unwrap();
        assert_eq!(account.number, "KZ001");

        assert_eq!(ledger.get_account(user_id, account.id).await.unwrap(), account);
        assert!(matches!(
            ledger.get_account(Uuid::new_v4(), account.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_account_number() {
        let (ledger, user_id) = service_with_user().await;
        ledger.create_account(user_id, "KZ001", 0.0).await.unwrap();

        let err = ledger.create_account(user_id, "KZ001", 0.0).await.unwrap_err();
        assert!(matches!(err, AppError::ConflictError(_)));
    }

    #[tokio::test]
    async fn test_update_account() {
        let (ledger, user_id) = service_with_user().await;
        let account = ledger.create_account(user_id, "KZ001", 0.0).await.unwrap();
        ledger.create_account(user_id, "KZ002", 0.0).await.unwrap();

        let updated = ledger
            .update_account(user_id, account.id, Some("KZ003"), Some(42.0))
            .await
            .unwrap();
        assert_eq!(updated.number, "KZ003");
        assert_eq!(updated.balance, 42.0);

        let err = ledger
            .update_account(user_id, account.id, Some("KZ002"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ConflictError(_)));
    }

    #[tokio::test]
    async fn test_record_transaction_validation() {
        let (ledger, user_id) = service_with_user().await;
        let account = ledger.create_account(user_id, "KZ001", 100.0).await.unwrap();

        for amount in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            let err = ledger
                .record_transaction(user_id, account.id, TransactionKind::Income, amount)
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::ValidationError(_)), "accepted {}", amount);
        }

        let err = ledger
            .record_transaction(Uuid::new_v4(), account.id, TransactionKind::Income, 1.0)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let (_, after) = ledger
            .record_transaction(user_id, account.id, TransactionKind::Expense, 25.0)
            .await
            .unwrap();
        assert_eq!(after.balance, 75.0);
    }

    #[tokio::test]
    async fn test_foreign_transaction_is_hidden() {
        let (ledger, user_id) = service_with_user().await;
        let account = ledger.create_account(user_id, "KZ001", 0.0).await.unwrap();
        let (tx, _) = ledger
            .record_transaction(user_id, account.id, TransactionKind::Income, 5.0)
            .await
            .unwrap();

        assert_eq!(ledger.get_transaction(user_id, tx.id).await.unwrap(), tx);
        assert!(matches!(
            ledger.get_transaction(Uuid::new_v4(), tx.id).await,
            Err(AppError::NotFound(_))
        ));
    }
}
