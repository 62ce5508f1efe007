// src/models/course.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'courses' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,
    pub course_name: String,
    pub description: Option<String>,

    /// Path of the course material PDF under the files root.
    pub pdf_path: Option<String>,

    /// Quiz time limit, copied into a session at start so later edits do not
    /// affect attempts already in progress.
    pub quiz_time_limit_seconds: i64,

    /// Minimum percent required to pass the course quiz.
    pub passing_score_percent: i64,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for creating a new course.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCourseRequest {
    #[validate(length(min = 1, max = 200))]
    pub course_name: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(length(max = 500))]
    pub pdf_path: Option<String>,
    #[serde(default = "default_time_limit")]
    #[validate(range(min = 10, max = 86400))]
    pub quiz_time_limit_seconds: i64,
    #[serde(default = "default_passing_score")]
    #[validate(range(min = 0, max = 100))]
    pub passing_score_percent: i64,
}

fn default_time_limit() -> i64 {
    300
}

fn default_passing_score() -> i64 {
    70
}
