//! Issuance and verification of access/refresh token pairs.
//!
//! Access tokens live for minutes, refresh tokens for days. Each token embeds
//! a random session id that is mirrored in the session store, which is what
//! lets the server invalidate a token before its `exp`.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::TokenError;

const ALGORITHM: Algorithm = Algorithm::HS256;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    pub sub: String,  // User ID
    pub sid: String,  // Session ID
    pub exp: i64,     // Expiration time
    pub iat: i64,     // Issued at
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorized: Option<bool>,
}

impl Claims {
    pub fn user_id(&self) -> Result<Uuid, TokenError> {
        Uuid::parse_str(&self.sub).map_err(|_| TokenError::Invalid("subject is not a user id".into()))
    }
}

/// A freshly minted pair. Only the session ids and owner are persisted; the
/// signed strings go to the client.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(skip_serializing)]
    pub access_session_id: String,
    #[serde(skip_serializing)]
    pub refresh_session_id: String,
    pub access_expires_at: i64,
    pub refresh_expires_at: i64,
}

#[derive(Clone)]
struct SigningKey {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKey {
    fn from_secret(name: &str, secret: &str) -> Result<Self, TokenError> {
        if secret.is_empty() {
            return Err(TokenError::Signing(format!("{} secret is not configured", name)));
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        })
    }
}

#[derive(Clone)]
pub struct TokenIssuer {
    access_key: SigningKey,
    refresh_key: SigningKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
    validation: Validation,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig) -> Result<Self, TokenError> {
        let mut validation = Validation::new(ALGORITHM);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            access_key: SigningKey::from_secret("access", &config.access_secret)?,
            refresh_key: SigningKey::from_secret("refresh", &config.refresh_secret)?,
            access_ttl: Duration::minutes(config.access_ttl_minutes),
            refresh_ttl: Duration::days(config.refresh_ttl_days),
            validation,
        })
    }

    pub fn issue(&self, user_id: Uuid) -> Result<TokenPair, TokenError> {
        self.issue_at(user_id, Utc::now())
    }

    /// Same as [`issue`](Self::issue) with an explicit clock reading.
    pub fn issue_at(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<TokenPair, TokenError> {
        let access_session_id = new_session_id();
        let refresh_session_id = new_session_id();
        let access_expires_at = (now + self.access_ttl).timestamp();
        let refresh_expires_at = (now + self.refresh_ttl).timestamp();

        let access_claims = Claims {
            sub: user_id.to_string(),
            sid: access_session_id.clone(),
            exp: access_expires_at,
            iat: now.timestamp(),
            authorized: Some(true),
        };
        let refresh_claims = Claims {
            sub: user_id.to_string(),
            sid: refresh_session_id.clone(),
            exp: refresh_expires_at,
            iat: now.timestamp(),
            authorized: None,
        };

        let header = Header::new(ALGORITHM);
        let access_token = encode(&header, &access_claims, &self.access_key.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))?;
        let refresh_token = encode(&header, &refresh_claims, &self.refresh_key.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            access_session_id,
            refresh_session_id,
            access_expires_at,
            refresh_expires_at,
        })
    }

    /// Checks signature, algorithm and expiry of an access token.
    pub fn verify_access(&self, token: &str) -> Result<Claims, TokenError> {
        let claims = decode::<Claims>(token, &self.access_key.decoding, &self.validation)?.claims;
        if claims.authorized != Some(true) {
            return Err(TokenError::Invalid("access token is not authorized".into()));
        }
        Ok(claims)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<Claims, TokenError> {
        let claims = decode::<Claims>(token, &self.refresh_key.decoding, &self.validation)?.claims;
        if claims.authorized.is_some() {
            return Err(TokenError::Invalid("not a refresh token".into()));
        }
        Ok(claims)
    }
}

/// 128 random bits, hex encoded.
pub fn new_session_id() -> String {
    format!("{:032x}", rand::thread_rng().gen::<u128>())
}
