// src/config.rs

use dotenvy::dotenv;
use std::env;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    /// JWT lifetime in seconds.
    pub jwt_expiration: u64,
    pub rust_log: String,

    /// Optional admin account seeded at startup.
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,

    /// Directory served under /files (course PDFs).
    pub materials_dir: String,

    pub auth: AuthPolicy,
    pub quiz: QuizPolicy,
}

/// Brute-force lockout thresholds.
#[derive(Debug, Clone, Copy)]
pub struct AuthPolicy {
    /// Consecutive failed logins before the account locks.
    pub max_login_attempts: i32,
    /// How long a locked account stays locked.
    pub lockout_minutes: i64,
}

/// Quiz scoring defaults. The per-course time limit and passing threshold
/// live on the course row and are fixed into the session at start.
#[derive(Debug, Clone, Copy)]
pub struct QuizPolicy {
    pub points_per_question: i64,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET").expect("JWT_SECRET must be set");

        let jwt_expiration = parse_or("JWT_EXPIRATION", 86400);
        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let admin_username = env::var("ADMIN_USERNAME").ok();
        let admin_password = env::var("ADMIN_PASSWORD").ok();

        let materials_dir = env::var("MATERIALS_DIR").unwrap_or_else(|_| "materials".to_string());

        let auth = AuthPolicy {
            max_login_attempts: parse_or("MAX_LOGIN_ATTEMPTS", 5),
            lockout_minutes: parse_or("LOCKOUT_MINUTES", 30),
        };

        let quiz = QuizPolicy {
            points_per_question: parse_or("POINTS_PER_QUESTION", 20),
        };

        Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            rust_log,
            admin_username,
            admin_password,
            materials_dir,
            auth,
            quiz,
        }
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self {
            max_login_attempts: 5,
            lockout_minutes: 30,
        }
    }
}

impl Default for QuizPolicy {
    fn default() -> Self {
        Self {
            points_per_question: 20,
        }
    }
}
