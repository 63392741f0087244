use async_trait::async_trait;
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction as PgTransaction};
use std::time::Duration;
use uuid::Uuid;

use crate::db::models::{Account, ReportFilter, Transaction, User};
use crate::db::store::{CredentialStore, LedgerStore};
use crate::error::DatabaseError;

const USER_COLUMNS: &str = "id, username, password_hash, created_at";
const ACCOUNT_COLUMNS: &str = "id, user_id, number, balance, created_at, updated_at";
const TRANSACTION_COLUMNS: &str = "t.id, t.account_id, t.kind, t.amount, t.created_at";

#[derive(Clone)]
pub struct DbOperations {
    pool: PgPool,
}

impl DbOperations {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn new_with_options(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, DatabaseError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await
            .map_err(|e| DatabaseError::ConnectionError(e.to_string()))?;

        Ok(Self::new(pool))
    }

    pub async fn run_migrations(&self) -> Result<(), DatabaseError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DatabaseError::QueryError(e.to_string()))
    }

    pub fn get_pool_status(&self) -> DbPoolStatus {
        let size = self.pool.size();
        let idle = self.pool.num_idle() as u32;

        DbPoolStatus {
            total_connections: size,
            active_connections: size.saturating_sub(idle),
            idle_connections: idle,
        }
    }

    pub async fn begin_transaction(&self) -> Result<PgTransaction<'_, Postgres>, DatabaseError> {
        Ok(self.pool.begin().await?)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl CredentialStore for DbOperations {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, DatabaseError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, DatabaseError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn insert(&self, user: &User) -> Result<User, DatabaseError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, username, password_hash, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }
}

#[async_trait]
impl LedgerStore for DbOperations {
    async fn account_number_exists(&self, number: &str) -> Result<bool, DatabaseError> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM accounts WHERE number = $1)")
            .bind(number)
            .fetch_one(&self.pool)
            .await?;

        Ok(exists)
    }

    async fn insert_account(&self, account: &Account) -> Result<Account, DatabaseError> {
        let account = sqlx::query_as::<_, Account>(&format!(
            r#"
            INSERT INTO accounts (id, user_id, number, balance, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {ACCOUNT_COLUMNS}
            "#
        ))
        .bind(account.id)
        .bind(account.user_id)
        .bind(&account.number)
        .bind(account.balance)
        .bind(account.created_at)
        .bind(account.updated_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(account)
    }

    async fn accounts_for_user(&self, user_id: Uuid) -> Result<Vec<Account>, DatabaseError> {
        let accounts = sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE user_id = $1 ORDER BY created_at, id"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(accounts)
    }

    async fn account_for_user(
        &self,
        user_id: Uuid,
        account_id: Uuid,
    ) -> Result<Option<Account>, DatabaseError> {
        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE user_id = $1 AND id = $2"
        ))
        .bind(user_id)
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    async fn update_account(&self, account: &Account) -> Result<Account, DatabaseError> {
        let account = sqlx::query_as::<_, Account>(&format!(
            r#"
            UPDATE accounts SET number = $1, balance = $2, updated_at = now()
            WHERE id = $3 AND user_id = $4
            RETURNING {ACCOUNT_COLUMNS}
            "#
        ))
        .bind(&account.number)
        .bind(account.balance)
        .bind(account.id)
        .bind(account.user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(account)
    }

    async fn record_transaction(&self, tx: &Transaction) -> Result<Account, DatabaseError> {
        let mut transaction = self.begin_transaction().await?;

        let result = async {
            let account = sqlx::query_as::<_, Account>(&format!(
                r#"
                UPDATE accounts SET balance = balance + $1, updated_at = now()
                WHERE id = $2
                RETURNING {ACCOUNT_COLUMNS}
                "#
            ))
            .bind(tx.kind.balance_delta(tx.amount))
            .bind(tx.account_id)
            .fetch_one(&mut *transaction)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO transactions (id, account_id, kind, amount, created_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(tx.id)
            .bind(tx.account_id)
            .bind(tx.kind.as_str())
            .bind(tx.amount)
            .bind(tx.created_at)
            .execute(&mut *transaction)
            .await?;

            Ok::<_, sqlx::Error>(account)
        }
        .await;

        match result {
            Ok(account) => {
                transaction.commit().await?;
                Ok(account)
            }
            Err(e) => {
                transaction.rollback().await?;
                Err(e.into())
            }
        }
    }

    async fn transactions_for_user(&self, user_id: Uuid) -> Result<Vec<Transaction>, DatabaseError> {
        let transactions = sqlx::query_as::<_, Transaction>(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS} FROM transactions t
            JOIN accounts a ON a.id = t.account_id
            WHERE a.user_id = $1
            ORDER BY t.created_at, t.id
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(transactions)
    }

    async fn transaction_by_id(&self, id: Uuid) -> Result<Option<Transaction>, DatabaseError> {
        let transaction = sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions t WHERE t.id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(transaction)
    }

    async fn report_transactions(
        &self,
        user_id: Uuid,
        filter: &ReportFilter,
    ) -> Result<Vec<Transaction>, DatabaseError> {
        let mut query: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions t \
             JOIN accounts a ON a.id = t.account_id WHERE a.user_id = "
        ));
        query.push_bind(user_id);

        if let Some(account_id) = filter.account_id {
            query.push(" AND t.account_id = ").push_bind(account_id);
        }
        if let Some(kind) = filter.kind {
            query.push(" AND t.kind = ").push_bind(kind.as_str());
        }
        if let Some(from) = filter.from {
            query.push(" AND t.created_at >= ").push_bind(from);
        }
        if let Some(until) = filter.until {
            query.push(" AND t.created_at < ").push_bind(until);
        }

        query.push(" ORDER BY t.created_at, t.id");

        if let Some(limit) = filter.limit {
            query.push(" LIMIT ").push_bind(i64::from(limit));
            query.push(" OFFSET ").push_bind(filter.offset() as i64);
        }

        let transactions = query
            .build_query_as::<Transaction>()
            .fetch_all(&self.pool)
            .await?;

        Ok(transactions)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DbPoolStatus {
    pub total_connections: u32,
    pub active_connections: u32,
    pub idle_connections: u32,
}
