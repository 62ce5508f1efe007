// src/handlers/course.rs

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde::Serialize;

use crate::{
    error::AppError,
    models::{course::Course, score::ScoreResult},
    store::Store,
    utils::jwt::Claims,
};

/// Course plus the caller's stored grade, the dashboard view.
#[derive(Debug, Serialize)]
struct CourseOverview {
    #[serde(flatten)]
    course: Course,
    my_score: Option<ScoreResult>,
}

/// Lists all courses with the caller's result for each, most recent first.
pub async fn list_courses(
    State(store): State<Arc<dyn Store>>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let courses = store.list_courses().await?;

    let mut overview = Vec::with_capacity(courses.len());
    for course in courses {
        let my_score = store.get_score(user_id, course.id).await?;
        overview.push(CourseOverview { course, my_score });
    }

    Ok(Json(overview))
}

/// Fetches a single course with the caller's result.
pub async fn get_course(
    State(store): State<Arc<dyn Store>>,
    Extension(claims): Extension<Claims>,
    Path(course_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let course = store
        .get_course(course_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Course {} not found", course_id)))?;

    let my_score = store.get_score(user_id, course_id).await?;

    Ok(Json(CourseOverview { course, my_score }))
}
