use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::AppError;

/// Work factor for stored password hashes.
const BCRYPT_COST: u32 = 13;

static LOWERCASE: Lazy<Regex> = Lazy::new(|| Regex::new("[a-z]").unwrap());
static UPPERCASE: Lazy<Regex> = Lazy::new(|| Regex::new("[A-Z]").unwrap());
static DIGIT: Lazy<Regex> = Lazy::new(|| Regex::new("[0-9]").unwrap());
static SPECIAL: Lazy<Regex> = Lazy::new(|| Regex::new("[^A-Za-z0-9]").unwrap());

pub fn hash(password: &str) -> Result<String, AppError> {
    bcrypt::hash(password, BCRYPT_COST).map_err(|e| AppError::Internal(e.into()))
}

pub fn verify(password: &str, hashed: &str) -> Result<bool, AppError> {
    bcrypt::verify(password, hashed).map_err(|e| AppError::Internal(e.into()))
}

/// Fail-fast strength check. Rules run in a fixed order and only the
/// first violation is reported.
pub fn validate_strength(password: &str) -> Result<(), AppError> {
    if !LOWERCASE.is_match(password) {
        return Err(AppError::Validation(
            "password must contain at least one lowercase letter".into(),
        ));
    }
    if !UPPERCASE.is_match(password) {
        return Err(AppError::Validation(
            "password must contain at least one uppercase letter".into(),
        ));
    }
    if !DIGIT.is_match(password) {
        return Err(AppError::Validation(
            "password must contain at least one number".into(),
        ));
    }
    if !SPECIAL.is_match(password) {
        return Err(AppError::Validation(
            "password must contain at least one special character".into(),
        ));
    }
    if password.chars().count() < 8 {
        return Err(AppError::Validation(
            "password must be at least 8 characters long".into(),
        ));
    }
    Ok(())
}

// ── Tests ───────────────────────────────────────────────────────────────
