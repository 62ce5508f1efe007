// src/handlers/admin.rs

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use validator::Validate;

use crate::{
    error::AppError,
    models::course::CreateCourseRequest,
    models::question::CreateQuestionRequest,
    models::user::{UpdateStatusRequest, is_valid_status},
    store::Store,
};

/// Lists all users including counter/lock state, newest first.
pub async fn list_users(
    State(store): State<Arc<dyn Store>>,
) -> Result<impl IntoResponse, AppError> {
    let users = store.list_users().await?;
    Ok(Json(users))
}

/// Sets a user's account status (active / suspended / disabled).
pub async fn update_user_status(
    State(store): State<Arc<dyn Store>>,
    Path(user_id): Path<i64>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<impl IntoResponse, AppError> {
    if !is_valid_status(&payload.status) {
        return Err(AppError::BadRequest(format!(
            "Invalid status '{}'",
            payload.status
        )));
    }

    let updated = store.set_status(user_id, &payload.status).await?;
    if !updated {
        return Err(AppError::NotFound(format!("User {} not found", user_id)));
    }

    Ok(Json(json!({ "status": payload.status })))
}

/// Clears a user's failed-login counter and lock window ahead of expiry.
pub async fn unlock_user(
    State(store): State<Arc<dyn Store>>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let unlocked = store.unlock(user_id).await?;
    if !unlocked {
        return Err(AppError::NotFound(format!("User {} not found", user_id)));
    }

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct LoginLogQuery {
    pub user_id: Option<i64>,
    pub limit: Option<i64>,
}

/// Fetches the login attempt ledger, most recent first.
pub async fn login_logs(
    State(store): State<Arc<dyn Store>>,
    Query(query): Query<LoginLogQuery>,
) -> Result<impl IntoResponse, AppError> {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let logs = store.recent(query.user_id, limit).await?;
    Ok(Json(logs))
}

/// Aggregate dashboard counters.
pub async fn statistics(
    State(store): State<Arc<dyn Store>>,
) -> Result<impl IntoResponse, AppError> {
    let stats = store.statistics().await?;
    Ok(Json(stats))
}

/// Creates a new course.
pub async fn create_course(
    State(store): State<Arc<dyn Store>>,
    Json(payload): Json<CreateCourseRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let course = store.create_course(&payload).await?;
    Ok((StatusCode::CREATED, Json(course)))
}

/// Creates a new quiz question for a course.
pub async fn create_question(
    State(store): State<Arc<dyn Store>>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    if !payload.answers_match_choices() {
        return Err(AppError::BadRequest(
            "Every correct letter must match one of the choices".to_string(),
        ));
    }
    if store.get_course(payload.course_id).await?.is_none() {
        return Err(AppError::NotFound(format!(
            "Course {} not found",
            payload.course_id
        )));
    }

    let question = store.create_question(&payload).await?;
    Ok((StatusCode::CREATED, Json(question)))
}
