// src/store/memory.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use std::collections::HashMap;
use std::sync::Mutex;

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

/// In-process storage with the same contracts as `PgStore`.
///
/// Backs the integration tests and database-less local runs. A single mutex
/// over all tables gives the same atomicity the Postgres statements provide
/// (`apply_update` CAS, `freeze_session` single-winner claim).
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    users: Vec<User>,
    next_user_id: i64,
    login_logs: Vec<LoginAttempt>,
    next_log_id: i64,
    courses: Vec<Course>,
    next_course_id: i64,
    questions: Vec<Question>,
    next_question_id: i64,
    sessions: HashMap<(i64, i64), QuizSession>,
    scores: HashMap<(i64, i64), ScoreResult>,
    quiz_results: HashMap<(i64, i64), Vec<QuizResultRow>>,
    notifications: Vec<(i64, i64, String, String, String)>,
    contend_next_update: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `apply_update` report a lost compare-and-swap, as if a
    /// concurrent attempt had changed the row first. Lets tests drive the
    /// contention path without real parallelism.
    pub fn contend_next_credential_update(&self) {
        self.inner.lock().unwrap().contend_next_update = true;
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.users.iter().find(|u| u.username == username).cloned())
    }

    async fn find_by_id(&self, user_id: i64) -> Result<Option<User>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.users.iter().find(|u| u.id == user_id).cloned())
    }

    async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.users.iter().any(|u| u.username == new_user.username) {
            return Err(StoreError::Conflict(format!(
                "username '{}' already exists",
                new_user.username
            )));
        }
        inner.next_user_id += 1;
        let user = User {
            id: inner.next_user_id,
            username: new_user.username,
            password_hash: new_user.password_hash,
            email: new_user.email,
            full_name: new_user.full_name,
            role: new_user.role,
            status: "active".to_string(),
            failed_login_count: 0,
            locked_until: None,
            created_at: Some(Utc::now()),
            last_login: None,
        };
        inner.users.push(user.clone());
        Ok(user)
    }

    async fn apply_update(
        &self,
        user_id: i64,
        update: &CredentialUpdate,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.contend_next_update {
            inner.contend_next_update = false;
            return Ok(false);
        }
        let Some(user) = inner.users.iter_mut().find(|u| u.id == user_id) else {
            return Ok(false);
        };
        // Same CAS discipline as the SQL implementation.
        if user.failed_login_count != update.expected_failed_count
            || user.locked_until != update.expected_locked_until
        {
            return Ok(false);
        }
        user.failed_login_count = update.failed_login_count;
        user.locked_until = update.locked_until;
        if let Some(at) = update.record_login_at {
            user.last_login = Some(at);
        }
        Ok(true)
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.users.clone())
    }

    async fn set_status(&self, user_id: i64, status: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.users.iter_mut().find(|u| u.id == user_id) {
            Some(user) => {
                user.status = status.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn unlock(&self, user_id: i64) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.users.iter_mut().find(|u| u.id == user_id) {
            Some(user) => {
                user.failed_login_count = 0;
                user.locked_until = None;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl AttemptLedger for MemoryStore {
    async fn append(&self, attempt: NewLoginAttempt) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_log_id += 1;
        let id = inner.next_log_id;
        inner.login_logs.push(LoginAttempt {
            id,
            user_id: attempt.user_id,
            username: attempt.username,
            outcome: attempt.outcome,
            reason: attempt.reason,
            ip_address: attempt.ip_address,
            user_agent: attempt.user_agent,
            attempted_at: attempt.attempted_at,
        });
        Ok(())
    }

    async fn recent(
        &self,
        user_id: Option<i64>,
        limit: i64,
    ) -> Result<Vec<LoginAttempt>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut logs: Vec<LoginAttempt> = inner
            .login_logs
            .iter()
            .filter(|l| user_id.is_none() || l.user_id == user_id)
            .cloned()
            .collect();
        logs.reverse();
        logs.truncate(limit.max(0) as usize);
        Ok(logs)
    }
}

#[async_trait]
impl CourseStore for MemoryStore {
    async fn list_courses(&self) -> Result<Vec<Course>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.courses.clone())
    }

    async fn get_course(&self, course_id: i64) -> Result<Option<Course>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.courses.iter().find(|c| c.id == course_id).cloned())
    }

    async fn create_course(&self, req: &CreateCourseRequest) -> Result<Course, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.courses.iter().any(|c| c.course_name == req.course_name) {
            return Err(StoreError::Conflict(format!(
                "course '{}' already exists",
                req.course_name
            )));
        }
        inner.next_course_id += 1;
        let course = Course {
            id: inner.next_course_id,
            course_name: req.course_name.clone(),
            description: req.description.clone(),
            pdf_path: req.pdf_path.clone(),
            quiz_time_limit_seconds: req.quiz_time_limit_seconds,
            passing_score_percent: req.passing_score_percent,
            created_at: Some(Utc::now()),
        };
        inner.courses.push(course.clone());
        Ok(course)
    }
}

#[async_trait]
impl QuestionStore for MemoryStore {
    async fn questions_for_course(&self, course_id: i64) -> Result<Vec<Question>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .questions
            .iter()
            .filter(|q| q.course_id == course_id)
            .cloned()
            .collect())
    }

    async fn questions_by_ids(&self, ids: &[i64]) -> Result<Vec<Question>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .questions
            .iter()
            .filter(|q| ids.contains(&q.id))
            .cloned()
            .collect())
    }

    async fn create_question(&self, req: &CreateQuestionRequest) -> Result<Question, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_question_id += 1;
        let question = Question {
            id: inner.next_question_id,
            course_id: req.course_id,
            prompt: req.prompt.clone(),
            choices: Json(req.choices.clone()),
            correct_letters: Json(req.correct_letters.clone()),
            created_at: Some(Utc::now()),
        };
        inner.questions.push(question.clone());
        Ok(question)
    }
}

#[async_trait]
impl QuizSessionStore for MemoryStore {
    async fn get_session(
        &self,
        user_id: i64,
        course_id: i64,
    ) -> Result<Option<QuizSession>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.sessions.get(&(user_id, course_id)).cloned())
    }

    async fn put_session(&self, session: &QuizSession) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let key = (session.user_id, session.course_id);
        // Frozen slots reject writes, as the SQL upsert does.
        if inner.sessions.get(&key).is_some_and(|s| s.submitted) {
            return Ok(false);
        }
        inner.sessions.insert(key, session.clone());
        Ok(true)
    }

    async fn delete_session(&self, user_id: i64, course_id: i64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.sessions.remove(&(user_id, course_id));
        Ok(())
    }

    async fn freeze_session(&self, user_id: i64, course_id: i64) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.sessions.get_mut(&(user_id, course_id)) {
            Some(session) if !session.submitted => {
                session.submitted = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl ResultRecorder for MemoryStore {
    async fn upsert_score(
        &self,
        user_id: i64,
        course_id: i64,
        result: &ScoreResult,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.scores.insert((user_id, course_id), result.clone());
        Ok(())
    }

    async fn get_score(
        &self,
        user_id: i64,
        course_id: i64,
    ) -> Result<Option<ScoreResult>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.scores.get(&(user_id, course_id)).cloned())
    }

    async fn append_question_results(
        &self,
        user_id: i64,
        course_id: i64,
        outcomes: &[QuestionOutcome],
        attempted_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let rows = inner.quiz_results.entry((user_id, course_id)).or_default();
        for outcome in outcomes {
            rows.push(QuizResultRow {
                question_id: outcome.question_id,
                selected_answers: Json(outcome.selected.clone()),
                is_correct: outcome.is_correct,
                score_earned: outcome.score_earned,
                attempted_at,
            });
        }
        Ok(())
    }

    async fn quiz_history(
        &self,
        user_id: i64,
        course_id: i64,
    ) -> Result<Vec<QuizResultRow>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut rows = inner
            .quiz_results
            .get(&(user_id, course_id))
            .cloned()
            .unwrap_or_default();
        rows.reverse();
        Ok(rows)
    }
}

#[async_trait]
impl NotificationLog for MemoryStore {
    async fn log_notification(
        &self,
        user_id: i64,
        course_id: i64,
        notification_type: &str,
        recipient: &str,
        status: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.notifications.push((
            user_id,
            course_id,
            notification_type.to_string(),
            recipient.to_string(),
            status.to_string(),
        ));
        Ok(())
    }
}

#[async_trait]
impl AdminReporting for MemoryStore {
    async fn statistics(&self) -> Result<AdminStatistics, StoreError> {
        let inner = self.inner.lock().unwrap();
        let total_users = inner.users.iter().filter(|u| u.role == "student").count() as i64;
        let total_courses = inner.courses.len() as i64;
        let passed_count = inner.scores.values().filter(|s| s.passed).count() as i64;
        let average_percent = if inner.scores.is_empty() {
            0.0
        } else {
            inner.scores.values().map(|s| s.percent).sum::<f64>() / inner.scores.len() as f64
        };
        Ok(AdminStatistics {
            total_users,
            total_courses,
            passed_count,
            average_percent,
        })
    }
}
