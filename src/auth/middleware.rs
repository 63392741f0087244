//! Request guard for protected routes.
//!
//! Wrap a scope or resource with `from_fn(require_session)`. A request either
//! leaves the guard with [`AccessDetails`] in its extensions or is answered
//! with 401 (bad token, dead session) or 500 (session store failure) without
//! reaching the handler.

use actix_web::body::MessageBody;
use actix_web::dev::{Payload, ServiceRequest, ServiceResponse};
use actix_web::http::header::{HeaderMap, AUTHORIZATION};
use actix_web::middleware::Next;
use actix_web::{web, FromRequest, HttpMessage, HttpRequest, ResponseError};
use std::future::{ready, Ready};
use tracing::{error, warn};

use crate::auth::service::AccessDetails;
use crate::error::{AppError, AuthError};
use crate::AppState;

/// Header older clients send the token in.
pub const LEGACY_TOKEN_HEADER: &str = "token";

/// Pulls the token out of a header value. `"<scheme> <token>"` yields the
/// second segment; a value without a space is taken as-is.
pub fn extract_token(raw: &str) -> Option<&str> {
    let parts: Vec<&str> = raw.split(' ').collect();
    let token = if parts.len() == 2 { parts[1] } else { parts[0] };
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .or_else(|| headers.get(LEGACY_TOKEN_HEADER))
        .and_then(|value| value.to_str().ok())
        .and_then(extract_token)
        .map(str::to_string)
}

async fn authorize(req: &ServiceRequest) -> Result<AccessDetails, AppError> {
    let state = req
        .app_data::<web::Data<AppState>>()
        .ok_or_else(|| AppError::InternalError("application state is not registered".into()))?;
    let token = token_from_headers(req.headers()).ok_or(AuthError::MissingToken)?;

    state.auth_service.authenticate(&token).await
}

pub async fn require_session(
    req: ServiceRequest,
    next: Next<impl MessageBody + 'static>,
) -> Result<ServiceResponse<impl MessageBody>, actix_web::Error> {
    match authorize(&req).await {
        Ok(details) => {
            req.extensions_mut().insert(details);
            Ok(next.call(req).await?.map_into_left_body())
        }
        Err(err) => {
            if err.is_dependency_failure() {
                error!("Session check failed for {}: {}", req.path(), err);
            } else {
                warn!("Rejected request to {}: {}", req.path(), err);
            }
            let response = err.error_response();
            Ok(req.into_response(response).map_into_right_body())
        }
    }
}

impl FromRequest for AccessDetails {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<AccessDetails>()
                .cloned()
                .ok_or(AppError::AuthError(AuthError::MissingToken)),
        )
    }
}
