// src/models/login_log.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Represents the 'login_logs' table: one immutable row per authentication
/// attempt. Append-only; there is no update or delete path.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LoginAttempt {
    pub id: i64,

    /// Null for attempts against unknown usernames.
    pub user_id: Option<i64>,
    pub username: String,

    /// 'success' or 'failed'.
    pub outcome: String,

    /// Free-text reason, e.g. "invalid password (2 attempts left)".
    pub reason: Option<String>,

    pub ip_address: Option<String>,
    pub user_agent: Option<String>,

    pub attempted_at: chrono::DateTime<chrono::Utc>,
}

/// Insert DTO for the ledger.
#[derive(Debug, Clone)]
pub struct NewLoginAttempt {
    pub user_id: Option<i64>,
    pub username: String,
    pub outcome: String,
    pub reason: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub attempted_at: chrono::DateTime<chrono::Utc>,
}
