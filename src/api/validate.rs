//! Field validators shared by the request DTOs. Checks run in field
//! order and stop at the first violation, so a response always names
//! exactly one problem.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::AppError;
use crate::models::blog::BlogStatus;
use crate::models::user::{AccountStatus, Role};
use crate::store::SortOrder;

static EMAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

const MAX_TAGS: usize = 3;

pub fn require(value: &str, field: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{} should not be empty", field)));
    }
    Ok(())
}

/// Absent is fine; present but blank is not.
pub fn require_if_present(value: Option<&str>, field: &str) -> Result<(), AppError> {
    match value {
        Some(v) => require(v, field),
        None => Ok(()),
    }
}

pub fn email(value: &str) -> Result<(), AppError> {
    if !EMAIL.is_match(value) {
        return Err(AppError::Validation("email must be an email".into()));
    }
    Ok(())
}

pub fn email_if_present(value: Option<&str>) -> Result<(), AppError> {
    match value {
        Some(v) => email(v),
        None => Ok(()),
    }
}

pub fn confirmed(password: &str, confirmation: &str) -> Result<(), AppError> {
    if password != confirmation {
        return Err(AppError::Validation(
            "password_confirmation must match password".into(),
        ));
    }
    Ok(())
}

pub fn max_tags(tags: &[String]) -> Result<(), AppError> {
    if tags.len() > MAX_TAGS {
        return Err(AppError::Validation(format!(
            "tags must contain not more than {} elements",
            MAX_TAGS
        )));
    }
    Ok(())
}

// String-typed enum fields are parsed by hand so the rejection message
// stays in the same voice as the other validators.

pub fn role(value: &str) -> Result<Role, AppError> {
    match value {
        "admin" => Ok(Role::Admin),
        "editor" => Ok(Role::Editor),
        "user" => Ok(Role::User),
        _ => Err(AppError::Validation(
            "role must be one of the following values: admin, editor, user".into(),
        )),
    }
}

pub fn account_status(value: &str) -> Result<AccountStatus, AppError> {
    match value {
        "active" => Ok(AccountStatus::Active),
        "inactive" => Ok(AccountStatus::Inactive),
        _ => Err(AppError::Validation(
            "status must be one of the following values: active, inactive".into(),
        )),
    }
}

pub fn blog_status(value: &str) -> Result<BlogStatus, AppError> {
    match value {
        "draft" => Ok(BlogStatus::Draft),
        "published" => Ok(BlogStatus::Published),
        "unpublished" => Ok(BlogStatus::Unpublished),
        _ => Err(AppError::Validation(
            "status must be one of the following values: draft, published, unpublished".into(),
        )),
    }
}

pub fn boolean(value: &str, field: &str) -> Result<bool, AppError> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(AppError::Validation(format!(
            "field '{}' must only contain 'true' or 'false'",
            field
        ))),
    }
}

pub fn sort_order(value: &str) -> Result<SortOrder, AppError> {
    match value {
        "asc" => Ok(SortOrder::Asc),
        "desc" => Ok(SortOrder::Desc),
        _ => Err(AppError::Validation(
            "sort must be one of the following values: asc, desc".into(),
        )),
    }
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn message(err: AppError) -> String {
        match err {
            AppError::Validation(msg) => msg,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_require_rejects_blank() {
        assert!(require("x", "title").is_ok());
        assert_eq!(
            message(require("  ", "title").unwrap_err()),
            "title should not be empty"
        );
        assert!(require_if_present(None, "bio").is_ok());
        assert!(require_if_present(Some(""), "bio").is_err());
    }

    #[test]
    fn test_email_shapes() {
        assert!(email("a@b.co").is_ok());
        for bad in ["plain", "a@b", "a b@c.d", "@x.y"] {
            assert!(email(bad).is_err(), "{} should be rejected", bad);
        }
    }

    #[test]
    fn test_confirmation_must_match() {
        assert!(confirmed("Secret1!", "Secret1!").is_ok());
        assert!(confirmed("Secret1!", "secret1!").is_err());
    }

    #[test]
    fn test_tag_cap() {
        let three: Vec<String> = vec!["a".into(), "b".into(), "c".into()];
        assert!(max_tags(&three).is_ok());
        let four: Vec<String> = vec!["a".into(), "b".into(), "c".into(), "d".into()];
        assert!(max_tags(&four).is_err());
    }

    #[test]
    fn test_enum_fields_parse_or_name_choices() {
        assert_eq!(role("editor").unwrap(), Role::Editor);
        assert!(message(role("owner").unwrap_err()).contains("admin, editor, user"));
        assert_eq!(blog_status("draft").unwrap(), BlogStatus::Draft);
        assert!(account_status("banned").is_err());
        assert!(boolean("true", "verified").unwrap());
        assert!(boolean("1", "verified").is_err());
        assert_eq!(sort_order("asc").unwrap(), SortOrder::Asc);
    }
}
