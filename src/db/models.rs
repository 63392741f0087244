use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(username: String, password_hash: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            username,
            password_hash,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Account {
    pub id: Uuid,
    pub user_id: Uuid,
    pub number: String,
    pub balance: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn new(user_id: Uuid, number: String, balance: f64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            number,
            balance,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Income,
    Expense,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Income => "income",
            TransactionKind::Expense => "expense",
        }
    }

    /// Signed change a transaction of this kind applies to an account balance.
    pub fn balance_delta(&self, amount: f64) -> f64 {
        match self {
            TransactionKind::Income => amount,
            TransactionKind::Expense => -amount,
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown transaction type `{0}`, expected `income` or `expense`")]
pub struct UnknownTransactionKind(pub String);

impl FromStr for TransactionKind {
    type Err = UnknownTransactionKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "income" => Ok(TransactionKind::Income),
            "expense" => Ok(TransactionKind::Expense),
            other => Err(UnknownTransactionKind(other.to_string())),
        }
    }
}

impl TryFrom<String> for TransactionKind {
    type Error = UnknownTransactionKind;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Transaction {
    pub id: Uuid,
    pub account_id: Uuid,
    #[serde(rename = "type")]
    #[sqlx(try_from = "String")]
    pub kind: TransactionKind,
    pub amount: f64,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(account_id: Uuid, kind: TransactionKind, amount: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            kind,
            amount,
            created_at: Utc::now(),
        }
    }
}

/// Filter applied when selecting transactions for a report. Bounds are
/// half-open: `from <= created_at < until`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportFilter {
    pub account_id: Option<Uuid>,
    pub kind: Option<TransactionKind>,
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub page: u32,
}

impl ReportFilter {
    pub fn matches(&self, tx: &Transaction) -> bool {
        self.account_id.map_or(true, |id| tx.account_id == id)
            && self.kind.map_or(true, |kind| tx.kind == kind)
            && self.from.map_or(true, |from| tx.created_at >= from)
            && self.until.map_or(true, |until| tx.created_at < until)
    }

    /// Rows to skip before the requested page.
    pub fn offset(&self) -> u64 {
        match self.limit {
            Some(limit) => u64::from(self.page.max(1) - 1) * u64::from(limit),
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_transaction_kind_parsing() {
        assert_eq!("income".parse::<TransactionKind>().unwrap(), TransactionKind::Income);
        assert_eq!("expense".parse::<TransactionKind>().unwrap(), TransactionKind::Expense);
        assert!("refund".parse::<TransactionKind>().is_err());
        assert!("Income".parse::<TransactionKind>().is_err());
    }

    #[test]
    fn test_balance_delta() {
        assert_eq!(TransactionKind::Income.balance_delta(10.5), 10.5);
        assert_eq!(TransactionKind::Expense.balance_delta(10.5), -10.5);
    }

    #[test]
    fn test_user_serialization_hides_hash() {
        let user = User::new("alice".into(), "$2b$12$hash".into());
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["username"], "alice");
        assert!(json.get("password_hash").is_none());
    }

    #[test]
    fn test_transaction_serializes_kind_as_type() {
        let tx = Transaction::new(Uuid::new_v4(), TransactionKind::Expense, 3.0);
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["type"], "expense");
    }

    #[test]
    fn test_report_filter_matches() {
        let account = Uuid::new_v4();
        let tx = Transaction::new(account, TransactionKind::Income, 1.0);

        assert!(ReportFilter::default().matches(&tx));
        assert!(ReportFilter { account_id: Some(account), ..Default::default() }.matches(&tx));
        assert!(!ReportFilter { account_id: Some(Uuid::new_v4()), ..Default::default() }.matches(&tx));
        assert!(!ReportFilter { kind: Some(TransactionKind::Expense), ..Default::default() }.matches(&tx));

        let window = ReportFilter {
            from: Some(tx.created_at - Duration::hours(1)),
            until: Some(tx.created_at),
            ..Default::default()
        };
        assert!(!window.matches(&tx), "upper bound is exclusive");
    }

    #[test]
    fn test_report_filter_offset() {
        let filter = ReportFilter { limit: Some(10), page: 3, ..Default::default() };
        assert_eq!(filter.offset(), 20);

        let filter = ReportFilter { limit: Some(10), page: 0, ..Default::default() };
        assert_eq!(filter.offset(), 0);

        let filter = ReportFilter { limit: None, page: 5, ..Default::default() };
        assert_eq!(filter.offset(), 0);
    }
}
