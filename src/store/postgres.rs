// src/store/postgres.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;
use std::collections::HashMap;

use super::{
    AdminReporting, AttemptLedger, CourseStore, CredentialStore, NotificationLog, QuestionStore,
    QuizSessionStore, ResultRecorder, StoreError,
};
use crate::core::lockout::CredentialUpdate;
use crate::core::scoring::QuestionOutcome;
use crate::core::session::QuizSession;
use crate::models::course::{Course, CreateCourseRequest};
use crate::models::login_log::{LoginAttempt, NewLoginAttempt};
use crate::models::question::{CreateQuestionRequest, Question};
use crate::models::score::{AdminStatistics, QuizResultRow, ScoreResult};
use crate::models::user::{NewUser, User};

const USER_COLUMNS: &str = "id, username, password_hash, email, full_name, role, status, \
     failed_login_count, locked_until, created_at, last_login";

/// Postgres-backed storage.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_by_id(&self, user_id: i64) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (username, password_hash, email, full_name, role) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&new_user.username)
        .bind(&new_user.password_hash)
        .bind(&new_user.email)
        .bind(&new_user.full_name)
        .bind(&new_user.role)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    async fn apply_update(
        &self,
        user_id: i64,
        update: &CredentialUpdate,
    ) -> Result<bool, StoreError> {
        // Compare-and-swap on the values the evaluation read. Zero rows means
        // a concurrent attempt got there first and the caller must retry.
        let result = sqlx::query(
            "UPDATE users \
             SET failed_login_count = $1, \
                 locked_until = $2, \
                 last_login = COALESCE($3, last_login) \
             WHERE id = $4 \
               AND failed_login_count = $5 \
               AND locked_until IS NOT DISTINCT FROM $6",
        )
        .bind(update.failed_login_count)
        .bind(update.locked_until)
        .bind(update.record_login_at)
        .bind(user_id)
        .bind(update.expected_failed_count)
        .bind(update.expected_locked_until)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    async fn set_status(&self, user_id: i64, status: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE users SET status = $1 WHERE id = $2")
            .bind(status)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn unlock(&self, user_id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE users SET failed_login_count = 0, locked_until = NULL WHERE id = $1",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl AttemptLedger for PgStore {
    async fn append(&self, attempt: NewLoginAttempt) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO login_logs \
             (user_id, username, outcome, reason, ip_address, user_agent, attempted_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(attempt.user_id)
        .bind(&attempt.username)
        .bind(&attempt.outcome)
        .bind(&attempt.reason)
        .bind(&attempt.ip_address)
        .bind(&attempt.user_agent)
        .bind(attempt.attempted_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recent(
        &self,
        user_id: Option<i64>,
        limit: i64,
    ) -> Result<Vec<LoginAttempt>, StoreError> {
        let logs = match user_id {
            Some(uid) => {
                sqlx::query_as::<_, LoginAttempt>(
                    "SELECT id, user_id, username, outcome, reason, ip_address, user_agent, \
                            attempted_at \
                     FROM login_logs WHERE user_id = $1 \
                     ORDER BY attempted_at DESC LIMIT $2",
                )
                .bind(uid)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, LoginAttempt>(
                    "SELECT id, user_id, username, outcome, reason, ip_address, user_agent, \
                            attempted_at \
                     FROM login_logs ORDER BY attempted_at DESC LIMIT $1",
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(logs)
    }
}

#[async_trait]
impl CourseStore for PgStore {
    async fn list_courses(&self) -> Result<Vec<Course>, StoreError> {
        let courses = sqlx::query_as::<_, Course>(
            "SELECT id, course_name, description, pdf_path, quiz_time_limit_seconds, \
                    passing_score_percent, created_at \
             FROM courses ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(courses)
    }

    async fn get_course(&self, course_id: i64) -> Result<Option<Course>, StoreError> {
        let course = sqlx::query_as::<_, Course>(
            "SELECT id, course_name, description, pdf_path, quiz_time_limit_seconds, \
                    passing_score_percent, created_at \
             FROM courses WHERE id = $1",
        )
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(course)
    }

    async fn create_course(&self, req: &CreateCourseRequest) -> Result<Course, StoreError> {
        let course = sqlx::query_as::<_, Course>(
            "INSERT INTO courses \
             (course_name, description, pdf_path, quiz_time_limit_seconds, passing_score_percent) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, course_name, description, pdf_path, quiz_time_limit_seconds, \
                       passing_score_percent, created_at",
        )
        .bind(&req.course_name)
        .bind(&req.description)
        .bind(&req.pdf_path)
        .bind(req.quiz_time_limit_seconds)
        .bind(req.passing_score_percent)
        .fetch_one(&self.pool)
        .await?;

        Ok(course)
    }
}

#[async_trait]
impl QuestionStore for PgStore {
    async fn questions_for_course(&self, course_id: i64) -> Result<Vec<Question>, StoreError> {
        let questions = sqlx::query_as::<_, Question>(
            "SELECT id, course_id, prompt, choices, correct_letters, created_at \
             FROM questions WHERE course_id = $1 ORDER BY id",
        )
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(questions)
    }

    async fn questions_by_ids(&self, ids: &[i64]) -> Result<Vec<Question>, StoreError> {
        let questions = sqlx::query_as::<_, Question>(
            "SELECT id, course_id, prompt, choices, correct_letters, created_at \
             FROM questions WHERE id = ANY($1) ORDER BY id",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(questions)
    }

    async fn create_question(&self, req: &CreateQuestionRequest) -> Result<Question, StoreError> {
        let question = sqlx::query_as::<_, Question>(
            "INSERT INTO questions (course_id, prompt, choices, correct_letters) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, course_id, prompt, choices, correct_letters, created_at",
        )
        .bind(req.course_id)
        .bind(&req.prompt)
        .bind(Json(&req.choices))
        .bind(Json(&req.correct_letters))
        .fetch_one(&self.pool)
        .await?;

        Ok(question)
    }
}

/// Row shape of 'quiz_sessions'; the JSON columns are unwrapped into the
/// core session type.
#[derive(sqlx::FromRow)]
struct QuizSessionRow {
    user_id: i64,
    course_id: i64,
    question_ids: Json<Vec<i64>>,
    started_at: DateTime<Utc>,
    time_limit_seconds: i64,
    answers: Json<HashMap<i64, Vec<String>>>,
    submitted: bool,
}

impl From<QuizSessionRow> for QuizSession {
    fn from(row: QuizSessionRow) -> Self {
        QuizSession {
            user_id: row.user_id,
            course_id: row.course_id,
            question_ids: row.question_ids.0,
            started_at: row.started_at,
            time_limit_seconds: row.time_limit_seconds,
            answers: row.answers.0,
            submitted: row.submitted,
        }
    }
}

#[async_trait]
impl QuizSessionStore for PgStore {
    async fn get_session(
        &self,
        user_id: i64,
        course_id: i64,
    ) -> Result<Option<QuizSession>, StoreError> {
        let row = sqlx::query_as::<_, QuizSessionRow>(
            "SELECT user_id, course_id, question_ids, started_at, time_limit_seconds, \
                    answers, submitted \
             FROM quiz_sessions WHERE user_id = $1 AND course_id = $2",
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(QuizSession::from))
    }

    async fn put_session(&self, session: &QuizSession) -> Result<bool, StoreError> {
        // The upsert refuses to touch a row that is already submitted, so a
        // snapshot read before a concurrent freeze cannot write over it.
        // Zero rows affected means the slot is frozen.
        let result = sqlx::query(
            "INSERT INTO quiz_sessions \
             (user_id, course_id, question_ids, started_at, time_limit_seconds, answers, submitted) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (user_id, course_id) DO UPDATE SET \
                 question_ids = EXCLUDED.question_ids, \
                 started_at = EXCLUDED.started_at, \
                 time_limit_seconds = EXCLUDED.time_limit_seconds, \
                 answers = EXCLUDED.answers, \
                 submitted = EXCLUDED.submitted \
             WHERE quiz_sessions.submitted = FALSE",
        )
        .bind(session.user_id)
        .bind(session.course_id)
        .bind(Json(&session.question_ids))
        .bind(session.started_at)
        .bind(session.time_limit_seconds)
        .bind(Json(&session.answers))
        .bind(session.submitted)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_session(&self, user_id: i64, course_id: i64) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM quiz_sessions WHERE user_id = $1 AND course_id = $2")
            .bind(user_id)
            .bind(course_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn freeze_session(&self, user_id: i64, course_id: i64) -> Result<bool, StoreError> {
        // The `submitted = FALSE` predicate makes this a single-winner claim.
        let result = sqlx::query(
            "UPDATE quiz_sessions SET submitted = TRUE \
             WHERE user_id = $1 AND course_id = $2 AND submitted = FALSE",
        )
        .bind(user_id)
        .bind(course_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl ResultRecorder for PgStore {
    async fn upsert_score(
        &self,
        user_id: i64,
        course_id: i64,
        result: &ScoreResult,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO course_scores \
             (user_id, course_id, total_score, max_score, percent, passed, completed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (user_id, course_id) DO UPDATE SET \
                 total_score = EXCLUDED.total_score, \
                 max_score = EXCLUDED.max_score, \
                 percent = EXCLUDED.percent, \
                 passed = EXCLUDED.passed, \
                 completed_at = EXCLUDED.completed_at",
        )
        .bind(user_id)
        .bind(course_id)
        .bind(result.total_score)
        .bind(result.max_score)
        .bind(result.percent)
        .bind(result.passed)
        .bind(result.completed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_score(
        &self,
        user_id: i64,
        course_id: i64,
    ) -> Result<Option<ScoreResult>, StoreError> {
        let score = sqlx::query_as::<_, ScoreResult>(
            "SELECT total_score, max_score, percent, passed, completed_at \
             FROM course_scores WHERE user_id = $1 AND course_id = $2",
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(score)
    }

    async fn append_question_results(
        &self,
        user_id: i64,
        course_id: i64,
        outcomes: &[QuestionOutcome],
        attempted_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        for outcome in outcomes {
            sqlx::query(
                "INSERT INTO quiz_results \
                 (user_id, course_id, question_id, selected_answers, is_correct, score_earned, \
                  attempted_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(user_id)
            .bind(course_id)
            .bind(outcome.question_id)
            .bind(Json(&outcome.selected))
            .bind(outcome.is_correct)
            .bind(outcome.score_earned)
            .bind(attempted_at)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    async fn quiz_history(
        &self,
        user_id: i64,
        course_id: i64,
    ) -> Result<Vec<QuizResultRow>, StoreError> {
        let rows = sqlx::query_as::<_, QuizResultRow>(
            "SELECT question_id, selected_answers, is_correct, score_earned, attempted_at \
             FROM quiz_results WHERE user_id = $1 AND course_id = $2 \
             ORDER BY attempted_at DESC, question_id",
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

#[async_trait]
impl NotificationLog for PgStore {
    async fn log_notification(
        &self,
        user_id: i64,
        course_id: i64,
        notification_type: &str,
        recipient: &str,
        status: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO notification_logs \
             (user_id, course_id, notification_type, recipient_email, status) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(user_id)
        .bind(course_id)
        .bind(notification_type)
        .bind(recipient)
        .bind(status)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl AdminReporting for PgStore {
    async fn statistics(&self) -> Result<AdminStatistics, StoreError> {
        let total_users =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE role = 'student'")
                .fetch_one(&self.pool)
                .await?;

        let total_courses = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM courses")
            .fetch_one(&self.pool)
            .await?;

        let passed_count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM course_scores WHERE passed")
                .fetch_one(&self.pool)
                .await?;

        let average_percent =
            sqlx::query_scalar::<_, Option<f64>>("SELECT AVG(percent) FROM course_scores")
                .fetch_one(&self.pool)
                .await?
                .unwrap_or(0.0);

        Ok(AdminStatistics {
            total_users,
            total_courses,
            passed_count,
            average_percent,
        })
    }
}
