// src/models/score.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;

/// Final grade for one (user, course) pair. At most one row exists per pair;
/// a new submission overwrites the previous one.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct ScoreResult {
    pub total_score: i64,
    pub max_score: i64,
    pub percent: f64,
    pub passed: bool,
    pub completed_at: chrono::DateTime<chrono::Utc>,
}

/// Per-question answer history row ('quiz_results' table).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct QuizResultRow {
    pub question_id: i64,
    pub selected_answers: Json<Vec<String>>,
    pub is_correct: bool,
    pub score_earned: i64,
    pub attempted_at: chrono::DateTime<chrono::Utc>,
}

/// Aggregate counters for the admin dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminStatistics {
    pub total_users: i64,
    pub total_courses: i64,
    pub passed_count: i64,
    pub average_percent: f64,
}
