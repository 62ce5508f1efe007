// src/models/user.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Account status values stored in the `status` column.
pub const STATUS_ACTIVE: &str = "active";
pub const STATUS_SUSPENDED: &str = "suspended";
pub const STATUS_DISABLED: &str = "disabled";

pub fn is_valid_status(status: &str) -> bool {
    matches!(status, STATUS_ACTIVE | STATUS_SUSPENDED | STATUS_DISABLED)
}

/// Represents the 'users' table in the database.
///
/// Invariant: `locked_until` is only set once `failed_login_count` reached
/// the configured maximum; both are cleared together on lock expiry or on a
/// successful login. Only the lockout governor mutates these two fields.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,

    /// Unique username (employee id in the original deployment).
    pub username: String,

    /// Argon2 password hash.
    /// Skipped during serialization to prevent leaking sensitive data.
    #[serde(skip)]
    pub password_hash: String,

    pub email: Option<String>,
    pub full_name: Option<String>,

    /// User role: 'student' or 'admin'.
    pub role: String,

    /// Account status: 'active', 'suspended' or 'disabled'.
    pub status: String,

    /// Consecutive failed logins since the last success or lock expiry.
    pub failed_login_count: i32,

    /// End of the current lockout window, if any.
    pub locked_until: Option<chrono::DateTime<chrono::Utc>>,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    pub last_login: Option<chrono::DateTime<chrono::Utc>>,
}

/// Insert DTO consumed by the credential store.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub role: String,
}

/// DTO for creating a new user (Registration).
#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(length(
        min = 3,
        max = 50,
        message = "Username length must be between 3 and 50 characters."
    ))]
    pub username: String,
    #[validate(length(
        min = 4,
        max = 128,
        message = "Password length must be between 4 and 128 characters."
    ))]
    pub password: String,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 100))]
    pub full_name: Option<String>,
}

/// DTO for user login.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 50))]
    pub username: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

/// DTO for an admin status change.
#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}
