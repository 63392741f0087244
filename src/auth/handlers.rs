use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use crate::AppState;
use crate::auth::service::AccessDetails;
use crate::auth::token::TokenPair;
use crate::error::AppError;
use tracing::{info, error};

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: i64,
    pub refresh_expires_at: i64,
    pub token_type: &'static str,
}

impl From<TokenPair> for TokenResponse {
    fn from(pair: TokenPair) -> Self {
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            access_expires_at: pair.access_expires_at,
            refresh_expires_at: pair.refresh_expires_at,
            token_type: "Bearer",
        }
    }
}

pub async fn register(
    req: web::Json<CredentialsRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    info!("Received registration request for username: {}", req.username);

    match state.auth_service.register(&req.username, &req.password).await {
        Ok(user) => {
            info!("Registration successful for username: {}", req.username);
            Ok(HttpResponse::Created().json(RegisterResponse {
                user_id: user.id.to_string(),
            }))
        }
        Err(e) => {
            error!("Registration failed for username: {}: {}", req.username, e);
            Err(e)
        }
    }
}

pub async fn login(
    req: web::Json<CredentialsRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    info!("Received login request for username: {}", req.username);

    match state.auth_service.login(&req.username, &req.password).await {
        Ok(pair) => {
            info!("Login successful for username: {}", req.username);
            Ok(HttpResponse::Ok().json(TokenResponse::from(pair)))
        }
        Err(e) => {
            error!("Login failed for username: {}: {}", req.username, e);
            Err(e)
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

pub async fn refresh(
    req: web::Json<RefreshRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let pair = state.auth_service.refresh(&req.refresh_token).await.map_err(|e| {
        error!("Token refresh failed: {}", e);
        e
    })?;

    Ok(HttpResponse::Ok().json(TokenResponse::from(pair)))
}

#[derive(Debug, Default, Deserialize)]
pub struct LogoutRequest {
    pub refresh_token: Option<String>,
}

pub async fn logout(
    access: AccessDetails,
    req: Option<web::Json<LogoutRequest>>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let refresh_token = req.and_then(|body| body.into_inner().refresh_token);
    state
        .auth_service
        .logout(&access, refresh_token.as_deref())
        .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Successfully logged out"
    })))
}

/// Identity behind the presented access token.
pub async fn me(access: AccessDetails) -> HttpResponse {
    HttpResponse::Ok().json(access)
}
