use actix_web::http::header;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::auth::AccessDetails;
use crate::db::models::TransactionKind;
use crate::error::AppError;
use crate::report::{ReportRequest, CONTENT_TYPE};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub number: String,
    #[serde(default)]
    pub balance: f64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAccountRequest {
    pub id: Uuid,
    pub number: Option<String>,
    pub balance: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTransactionRequest {
    pub account_id: Uuid,
    #[serde(rename = "type")]
    pub kind: String,
    pub amount: f64,
}

pub async fn create_account(
    access: AccessDetails,
    req: web::Json<CreateAccountRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let account = state
        .ledger
        .create_account(access.user_id, &req.number, req.balance)
        .await?;

    Ok(HttpResponse::Created().json(account))
}

pub async fn list_accounts(
    access: AccessDetails,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let accounts = state.ledger.list_accounts(access.user_id).await?;
    Ok(HttpResponse::Ok().json(accounts))
}

pub async fn get_account(
    access: AccessDetails,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let account = state
        .ledger
        .get_account(access.user_id, path.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(account))
}

pub async fn update_account(
    access: AccessDetails,
    req: web::Json<UpdateAccountRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let req = req.into_inner();
    let account = state
        .ledger
        .update_account(access.user_id, req.id, req.number.as_deref(), req.balance)
        .await?;

    info!("Account {} updated by user {}", account.id, access.user_id);
    Ok(HttpResponse::Ok().json(account))
}

pub async fn create_transaction(
    access: AccessDetails,
    req: web::Json<CreateTransactionRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let kind = req
        .kind
        .parse::<TransactionKind>()
        .map_err(|e| AppError::ValidationError(e.to_string()))?;

    let (transaction, account) = state
        .ledger
        .record_transaction(access.user_id, req.account_id, kind, req.amount)
        .await?;

    Ok(HttpResponse::Created().json(serde_json::json!({
        "transaction": transaction,
        "balance": account.balance
    })))
}

pub async fn list_transactions(
    access: AccessDetails,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let transactions = state.ledger.list_transactions(access.user_id).await?;
    Ok(HttpResponse::Ok().json(transactions))
}

pub async fn get_transaction(
    access: AccessDetails,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let transaction = state
        .ledger
        .get_transaction(access.user_id, path.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(transaction))
}

pub async fn export_report(
    access: AccessDetails,
    req: web::Json<ReportRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let filter = req.into_inner().into_filter()?;

    match state.ledger.export_report(access.user_id, &filter).await {
        Ok(bytes) => Ok(HttpResponse::Ok()
            .content_type(CONTENT_TYPE)
            .insert_header((header::CONTENT_DISPOSITION, "attachment; filename=\"report.xlsx\""))
            .body(bytes)),
        Err(e) => {
            error!("Report export failed for user {}: {}", access.user_id, e);
            Err(e)
        }
    }
}
