use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::password::{validate_credentials, PasswordHasher};
use crate::auth::session::SessionStore;
use crate::auth::token::{TokenIssuer, TokenPair};
use crate::db::models::User;
use crate::db::store::CredentialStore;
use crate::error::{AppError, AuthError, DatabaseError, SessionError};

/// Identity resolved from a verified access token and a live session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessDetails {
    pub session_id: String,
    pub user_id: Uuid,
}

pub struct AuthService {
    credentials: Arc<dyn CredentialStore>,
    sessions: Arc<dyn SessionStore>,
    hasher: PasswordHasher,
    issuer: TokenIssuer,
    // Verified against when the username is unknown, so both paths pay for bcrypt.
    dummy_digest: OnceCell<String>,
}

const DUMMY_PASSWORD: &str = "not-a-real-password";

impl AuthService {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        sessions: Arc<dyn SessionStore>,
        hasher: PasswordHasher,
        issuer: TokenIssuer,
    ) -> Self {
        Self {
            credentials,
            sessions,
            hasher,
            issuer,
            dummy_digest: OnceCell::new(),
        }
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    /// Creates a user after the credential policy and uniqueness checks pass.
    pub async fn register(&self, username: &str, password: &str) -> Result<User, AppError> {
        validate_credentials(username, password)?;

        if self.credentials.find_by_username(username).await?.is_some() {
            return Err(AppError::ConflictError(format!("username `{}` is already registered", username)));
        }

        let hasher = self.hasher;
        let plaintext = password.to_string();
        let password_hash = tokio::task::spawn_blocking(move || hasher.hash(&plaintext)).await??;

        let user = User::new(username.to_string(), password_hash);
        match self.credentials.insert(&user).await {
            Ok(user) => Ok(user),
            // Lost a race with a concurrent registration of the same name.
            Err(DatabaseError::Duplicate) => Err(AppError::ConflictError(format!(
                "username `{}` is already registered",
                username
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Verifies credentials, then issues and binds a new token pair.
    pub async fn login(&self, username: &str, password: &str) -> Result<TokenPair, AppError> {
        let user = self.credentials.find_by_username(username).await?;
        let digest = match &user {
            Some(user) => user.password_hash.clone(),
            None => self.placeholder_digest().await?.to_string(),
        };

        let hasher = self.hasher;
        let plaintext = password.to_string();
        let matches = tokio::task::spawn_blocking(move || hasher.verify(&digest, &plaintext)).await??;

        let user = match user {
            Some(user) if matches => user,
            _ => return Err(AuthError::InvalidCredentials.into()),
        };

        let pair = self.issuer.issue(user.id)?;
        self.bind(&pair, user.id).await?;
        info!("Issued session pair for user {}", user.id);
        Ok(pair)
    }

    async fn placeholder_digest(&self) -> Result<&str, AppError> {
        let hasher = self.hasher;
        let digest = self
            .dummy_digest
            .get_or_try_init(|| async move {
                tokio::task::spawn_blocking(move || hasher.hash(DUMMY_PASSWORD))
                    .await?
                    .map_err(AppError::from)
            })
            .await?;
        Ok(digest.as_str())
    }

    /// Records both session ids of `pair` with TTLs matching token expiry.
    ///
    /// There is no rollback: if the refresh write fails the access entry is
    /// left to expire on its own.
    pub async fn bind(&self, pair: &TokenPair, user_id: Uuid) -> Result<(), AppError> {
        let now = Utc::now().timestamp();
        let owner = user_id.to_string();

        let access_ttl = ttl_until(pair.access_expires_at, now)?;
        let refresh_ttl = ttl_until(pair.refresh_expires_at, now)?;

        self.sessions.set(&pair.access_session_id, &owner, access_ttl).await?;
        self.sessions.set(&pair.refresh_session_id, &owner, refresh_ttl).await?;
        Ok(())
    }

    /// Resolves a bearer token to the identity of a live session.
    pub async fn authenticate(&self, token: &str) -> Result<AccessDetails, AppError> {
        let claims = self.issuer.verify_access(token)?;
        let user_id = claims.user_id()?;

        match self.sessions.get(&claims.sid).await? {
            Some(owner) if owner == claims.sub => Ok(AccessDetails {
                session_id: claims.sid,
                user_id,
            }),
            Some(_) => {
                warn!("Session {} is bound to a different user than its token", claims.sid);
                Err(AuthError::InvalidToken.into())
            }
            None => Err(AuthError::SessionNotFound.into()),
        }
    }

    /// Exchanges a live refresh token for a new pair. The old refresh session
    /// is revoked so each refresh token works once.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AppError> {
        let claims = self.issuer.verify_refresh(refresh_token)?;
        let user_id = claims.user_id()?;

        match self.sessions.get(&claims.sid).await? {
            Some(owner) if owner == claims.sub => {}
            _ => return Err(AuthError::SessionNotFound.into()),
        }

        if !self.revoke(&claims.sid).await? {
            // Another request consumed it between the lookup and the delete.
            return Err(AuthError::SessionNotFound.into());
        }

        let pair = self.issuer.issue(user_id)?;
        self.bind(&pair, user_id).await?;
        info!("Rotated refresh session for user {}", user_id);
        Ok(pair)
    }

    /// Ends the caller's access session and, if given a refresh token of the
    /// same user, its refresh session too. The refresh token is checked before
    /// anything is revoked, so a rejected logout leaves both sessions alive.
    pub async fn logout(
        &self,
        access: &AccessDetails,
        refresh_token: Option<&str>,
    ) -> Result<(), AppError> {
        let refresh_session = match refresh_token {
            Some(token) => {
                let claims = self.issuer.verify_refresh(token)?;
                if claims.user_id()? != access.user_id {
                    return Err(AuthError::InvalidToken.into());
                }
                Some(claims.sid)
            }
            None => None,
        };

        self.revoke(&access.session_id).await?;
        if let Some(sid) = refresh_session {
            self.revoke(&sid).await?;
        }

        info!("User {} logged out", access.user_id);
        Ok(())
    }

    pub async fn revoke(&self, session_id: &str) -> Result<bool, SessionError> {
        self.sessions.delete(session_id).await
    }
}

fn ttl_until(expires_at: i64, now: i64) -> Result<Duration, SessionError> {
    let remaining = expires_at - now;
    if remaining <= 0 {
        return Err(SessionError::InvalidTtl(remaining));
    }
    Ok(Duration::from_secs(remaining as u64))
}
