//! Password hashing and the registration credential policy.

use crate::error::{AppError, HashingError};

/// Characters a password may not contain.
///
/// This is an exclusion list, not a strength meter. It is kept for
/// compatibility with accounts created under the existing policy.
pub const FORBIDDEN_PASSWORD_CHARS: &[char] = &[
    '_', '-', '@', '#', '$', '%', '&', '*', '(', ')', ':', '.', '/', '\\', ',', ';', '?', '"',
    '!', '~',
];

pub const USERNAME_LENGTH: std::ops::RangeInclusive<usize> = 3..=20;
pub const PASSWORD_LENGTH: std::ops::RangeInclusive<usize> = 6..=20;

/// Checks a username/password pair against the registration policy.
pub fn validate_credentials(username: &str, password: &str) -> Result<(), AppError> {
    let username_len = username.chars().count();
    if !USERNAME_LENGTH.contains(&username_len) {
        return Err(AppError::ValidationError(format!(
            "username must be between {} and {} characters",
            USERNAME_LENGTH.start(),
            USERNAME_LENGTH.end()
        )));
    }

    let password_len = password.chars().count();
    if !PASSWORD_LENGTH.contains(&password_len) {
        return Err(AppError::ValidationError(format!(
            "password must be between {} and {} characters",
            PASSWORD_LENGTH.start(),
            PASSWORD_LENGTH.end()
        )));
    }

    if let Some(c) = password.chars().find(|c| FORBIDDEN_PASSWORD_CHARS.contains(c)) {
        return Err(AppError::ValidationError(format!(
            "password must not contain `{}`",
            c
        )));
    }

    Ok(())
}

/// Salted bcrypt hashing.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self { cost: bcrypt::DEFAULT_COST }
    }
}

impl PasswordHasher {
    /// Lower costs are only meant for tests; bcrypt rejects anything outside 4..=31.
    pub fn with_cost(cost: u32) -> Self {
        Self { cost }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    pub fn hash(&self, plaintext: &str) -> Result<String, HashingError> {
        bcrypt::hash(plaintext, self.cost).map_err(|e| HashingError::Hash(e.to_string()))
    }

    /// Comparison of the derived hash is constant time.
    pub fn verify(&self, digest: &str, plaintext: &str) -> Result<bool, HashingError> {
        bcrypt::verify(plaintext, digest).map_err(|e| HashingError::Verify(e.to_string()))
    }
}
