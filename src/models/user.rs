use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;

/// Account roles, stored as lowercase text in the `role` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Editor,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Editor => "editor",
            Role::User => "user",
        }
    }
}

/// Matches the `status` column in the `users` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Inactive,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Inactive => "inactive",
        }
    }
}

/// A registered account. `password` holds the bcrypt hash; the link-token
/// columns hold the currently outstanding single-use tokens (verification,
/// pending email change, password reset) or null.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub bio: Option<String>,
    pub avatar: Option<String>,
    pub avatar_id: Option<String>,
    pub role: Role,
    pub status: AccountStatus,
    pub verified: bool,
    pub verification_token: Option<String>,
    pub new_email: Option<String>,
    pub reset_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The authenticated identity handlers and policies work with.
///
/// Built from a validated token plus a fresh `users` read, never from the
/// raw token payload alone: role and status here always reflect the row as
/// it is now, not as it was at issue time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub status: AccountStatus,
}

impl Principal {
    /// Admin or editor. Staff bypass ownership checks in content policies.
    pub fn is_staff(&self) -> bool {
        matches!(self.role, Role::Admin | Role::Editor)
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(AppError::Forbidden)
        }
    }

    pub fn require_active(&self) -> Result<(), AppError> {
        if self.status == AccountStatus::Active {
            Ok(())
        } else {
            Err(AppError::Forbidden)
        }
    }
}

impl From<&User> for Principal {
    fn from(user: &User) -> Self {
        Principal {
            id: user.id,
            email: user.email.clone(),
            role: user.role,
            status: user.status,
        }
    }
}

/// Profile view of an account: what any caller may see.
#[derive(Debug, Clone, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub bio: Option<String>,
    pub avatar: Option<String>,
    pub role: Role,
}

impl From<&User> for PublicUser {
    fn from(u: &User) -> Self {
        PublicUser {
            id: u.id,
            first_name: u.first_name.clone(),
            last_name: u.last_name.clone(),
            email: u.email.clone(),
            bio: u.bio.clone(),
            avatar: u.avatar.clone(),
            role: u.role,
        }
    }
}

/// Admin view: adds moderation fields the profile view hides. Password and
/// link tokens are never serialized anywhere.
#[derive(Debug, Clone, Serialize)]
pub struct AdminUser {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub bio: Option<String>,
    pub avatar: Option<String>,
    pub avatar_id: Option<String>,
    pub role: Role,
    pub status: AccountStatus,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&User> for AdminUser {
    fn from(u: &User) -> Self {
        AdminUser {
            id: u.id,
            first_name: u.first_name.clone(),
            last_name: u.last_name.clone(),
            email: u.email.clone(),
            bio: u.bio.clone(),
            avatar: u.avatar.clone(),
            avatar_id: u.avatar_id.clone(),
            role: u.role,
            status: u.status,
            verified: u.verified,
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }
}

/// Generated placeholder avatar for accounts that have not uploaded one.
/// Seeded from the lowercased initials.
pub fn default_avatar_url(first_name: &str, last_name: &str) -> String {
    let initials: String = first_name
        .chars()
        .take(1)
        .chain(last_name.chars().take(1))
        .flat_map(char::to_lowercase)
        .collect();
    format!("https://avatars.dicebear.com/api/bottts/{}.svg", initials)
}

// ── Tests ───────────────────────────────────────────────────────────────
