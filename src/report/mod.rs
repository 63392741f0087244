//! Transaction reports exported as xlsx workbooks.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use rust_xlsxwriter::{Format, Workbook};
use serde::Deserialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::db::models::{Account, ReportFilter, Transaction, TransactionKind, User};
use crate::error::AppError;

pub const SHEET_NAME: &str = "Report";
pub const HEADERS: [&str; 5] = ["Username", "Account", "Type", "Amount", "Created at"];
pub const CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const DATE_FORMAT: &str = "%d-%m-%Y";

/// Report request body. Empty strings are treated as absent.
#[derive(Debug, Default, Deserialize)]
pub struct ReportRequest {
    pub account_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub limit: Option<u32>,
    pub page: Option<u32>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
}

impl ReportRequest {
    pub fn into_filter(self) -> Result<ReportFilter, AppError> {
        let account_id = non_empty(self.account_id)
            .map(|id| {
                Uuid::parse_str(id.trim()).map_err(|_| {
                    AppError::ValidationError(format!("`{}` is not a valid account id", id))
                })
            })
            .transpose()?;

        let kind = match non_empty(self.kind) {
            Some(kind) => Some(
                kind.parse::<TransactionKind>()
                    .map_err(|e| AppError::ValidationError(e.to_string()))?,
            ),
            None => None,
        };

        let from = non_empty(self.date_from)
            .map(|d| parse_day(&d))
            .transpose()?
            .map(start_of_day);
        // Inclusive of the whole `date_to` day.
        let until = non_empty(self.date_to)
            .map(|d| parse_day(&d))
            .transpose()?
            .map(|day| start_of_day(day) + Duration::days(1));

        if let (Some(from), Some(until)) = (from, until) {
            if from >= until {
                return Err(AppError::ValidationError(
                    "date_from must not be after date_to".into(),
                ));
            }
        }

        Ok(ReportFilter {
            account_id,
            kind,
            from,
            until,
            limit: self.limit.filter(|limit| *limit > 0),
            page: self.page.unwrap_or(1).max(1),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_day(value: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| {
        AppError::ValidationError(format!("`{}` is not a DD-MM-YYYY date", value))
    })
}

fn start_of_day(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(NaiveTime::MIN).and_utc()
}

/// One header row, then one row per transaction in the given order.
pub fn render_workbook(
    user: &User,
    accounts: &[Account],
    transactions: &[Transaction],
) -> Result<Vec<u8>, AppError> {
    let numbers: HashMap<Uuid, &str> = accounts
        .iter()
        .map(|account| (account.id, account.number.as_str()))
        .collect();

    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SHEET_NAME)?;

    for (col, header) in HEADERS.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *header, &bold)?;
    }

    for (i, tx) in transactions.iter().enumerate() {
        let row = (i + 1) as u32;
        let number = numbers.get(&tx.account_id).copied().unwrap_or_default();

        worksheet.write_string(row, 0, &user.username)?;
        worksheet.write_string(row, 1, number)?;
        worksheet.write_string(row, 2, tx.kind.as_str())?;
        worksheet.write_number(row, 3, tx.amount)?;
        worksheet.write_string(row, 4, tx.created_at.format("%Y-%m-%d %H:%M:%S").to_string())?;
    }

    Ok(workbook.save_to_buffer()?)
}
