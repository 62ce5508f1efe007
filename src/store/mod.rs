// src/store/mod.rs
//
// Narrow async contracts between the core logic and durable storage.
// `PgStore` is the production implementation; `MemoryStore` backs the
// integration tests and local development without a database.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;

use crate::core::lockout::CredentialUpdate;
use crate::core::scoring::QuestionOutcome;
use crate::core::session::QuizSession;
use crate::models::course::{Course, CreateCourseRequest};
use crate::models::login_log::{LoginAttempt, NewLoginAttempt};
use crate::models::question::{CreateQuestionRequest, Question};
use crate::models::score::{AdminStatistics, QuizResultRow, ScoreResult};
use crate::models::user::{NewUser, User};

/// Storage faults surfaced to handlers.
#[derive(Debug)]
pub enum StoreError {
    /// Uniqueness violated (duplicate username, course name).
    Conflict(String),
    /// The backend failed or an atomic update could not be applied;
    /// retryable from the caller's point of view.
    Unavailable(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Conflict(msg) => write!(f, "conflict: {}", msg),
            StoreError::Unavailable(msg) => write!(f, "storage unavailable: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Conflict(db.to_string())
            }
            _ => StoreError::Unavailable(err.to_string()),
        }
    }
}

/// Durable credential records: attempt counters, lock expiry, status, hash.
/// The counters are only ever mutated through `apply_update`.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_id(&self, user_id: i64) -> Result<Option<User>, StoreError>;

    async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError>;

    /// Applies a lockout-governor update as an atomic compare-and-swap
    /// against the counter/lock values the evaluation read. Returns `false`
    /// when the row changed underneath (a concurrent attempt won); the
    /// evaluation must then be treated as not having happened.
    async fn apply_update(
        &self,
        user_id: i64,
        update: &CredentialUpdate,
    ) -> Result<bool, StoreError>;

    async fn list_users(&self) -> Result<Vec<User>, StoreError>;

    async fn set_status(&self, user_id: i64, status: &str) -> Result<bool, StoreError>;

    /// Admin override: clears the counter and the lock window.
    async fn unlock(&self, user_id: i64) -> Result<bool, StoreError>;
}

/// Append-only audit trail of authentication attempts.
#[async_trait]
pub trait AttemptLedger: Send + Sync {
    async fn append(&self, attempt: NewLoginAttempt) -> Result<(), StoreError>;

    /// Most-recent-first, optionally filtered by user, bounded by `limit`.
    async fn recent(
        &self,
        user_id: Option<i64>,
        limit: i64,
    ) -> Result<Vec<LoginAttempt>, StoreError>;
}

#[async_trait]
pub trait CourseStore: Send + Sync {
    async fn list_courses(&self) -> Result<Vec<Course>, StoreError>;
    async fn get_course(&self, course_id: i64) -> Result<Option<Course>, StoreError>;
    async fn create_course(&self, req: &CreateCourseRequest) -> Result<Course, StoreError>;
}

#[async_trait]
pub trait QuestionStore: Send + Sync {
    async fn questions_for_course(&self, course_id: i64) -> Result<Vec<Question>, StoreError>;
    async fn questions_by_ids(&self, ids: &[i64]) -> Result<Vec<Question>, StoreError>;
    async fn create_question(&self, req: &CreateQuestionRequest) -> Result<Question, StoreError>;
}

/// One session slot per (user, course); `put_session` overwrites.
#[async_trait]
pub trait QuizSessionStore: Send + Sync {
    async fn get_session(
        &self,
        user_id: i64,
        course_id: i64,
    ) -> Result<Option<QuizSession>, StoreError>;

    /// Writes the session into its slot. The frozen flag is one-way at this
    /// level: a slot whose stored row is already submitted rejects the write
    /// and `false` comes back, so a stale snapshot taken before a concurrent
    /// submit can never un-freeze the session. Starting over first deletes
    /// the slot.
    async fn put_session(&self, session: &QuizSession) -> Result<bool, StoreError>;

    async fn delete_session(&self, user_id: i64, course_id: i64) -> Result<(), StoreError>;

    /// Atomically marks the session submitted. Returns `true` only for the
    /// single caller that performed the transition, which serializes
    /// duplicate submits: losers read the stored result instead of
    /// re-scoring.
    async fn freeze_session(&self, user_id: i64, course_id: i64) -> Result<bool, StoreError>;
}

/// Persists final grades (one row per (user, course), upsert semantics)
/// and the per-question answer history.
#[async_trait]
pub trait ResultRecorder: Send + Sync {
    async fn upsert_score(
        &self,
        user_id: i64,
        course_id: i64,
        result: &ScoreResult,
    ) -> Result<(), StoreError>;

    async fn get_score(
        &self,
        user_id: i64,
        course_id: i64,
    ) -> Result<Option<ScoreResult>, StoreError>;

    async fn append_question_results(
        &self,
        user_id: i64,
        course_id: i64,
        outcomes: &[QuestionOutcome],
        attempted_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn quiz_history(
        &self,
        user_id: i64,
        course_id: i64,
    ) -> Result<Vec<QuizResultRow>, StoreError>;
}

/// Audit rows for quiz-completion notifications. Actual delivery (SMTP) is
/// an external concern; only the record is kept here.
#[async_trait]
pub trait NotificationLog: Send + Sync {
    async fn log_notification(
        &self,
        user_id: i64,
        course_id: i64,
        notification_type: &str,
        recipient: &str,
        status: &str,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait AdminReporting: Send + Sync {
    async fn statistics(&self) -> Result<AdminStatistics, StoreError>;
}

/// Everything the handlers need, behind one object-safe trait so the app
/// state can hold a single `Arc<dyn Store>`.
pub trait Store:
    CredentialStore
    + AttemptLedger
    + CourseStore
    + QuestionStore
    + QuizSessionStore
    + ResultRecorder
    + NotificationLog
    + AdminReporting
{
}

impl<T> Store for T where
    T: CredentialStore
        + AttemptLedger
        + CourseStore
        + QuestionStore
        + QuizSessionStore
        + ResultRecorder
        + NotificationLog
        + AdminReporting
{
}
