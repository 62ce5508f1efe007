// src/handlers/quiz.rs

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;

use crate::{
    clock::Clock,
    config::Config,
    core::scoring::{self, ScoreReport},
    core::session::{QuizSession, SessionError},
    error::AppError,
    models::question::PublicQuestion,
    models::score::ScoreResult,
    store::Store,
    utils::jwt::Claims,
};

/// DTO for recording one answer.
#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    pub question_id: i64,
    pub selected_letters: Vec<String>,
}

/// Starts a timed quiz attempt for the course.
///
/// The start instant comes from the server clock and the time limit is
/// copied from the course row, so neither can be influenced by the client
/// afterwards. Any prior unsubmitted session for this (user, course) pair is
/// overwritten: most recent start wins.
pub async fn start_quiz(
    State(store): State<Arc<dyn Store>>,
    State(clock): State<Arc<dyn Clock>>,
    Extension(claims): Extension<Claims>,
    Path(course_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let course = store
        .get_course(course_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Course {} not found", course_id)))?;

    let questions = store.questions_for_course(course_id).await?;
    if questions.is_empty() {
        return Err(AppError::BadRequest(
            "This course has no quiz questions yet".to_string(),
        ));
    }

    let question_ids: Vec<i64> = questions.iter().map(|q| q.id).collect();
    let session = QuizSession::start(
        user_id,
        course_id,
        question_ids,
        course.quiz_time_limit_seconds,
        clock.now(),
    );

    // Session slots reject writes once frozen, so overwrite-on-start clears
    // the slot first.
    store.delete_session(user_id, course_id).await?;
    if !store.put_session(&session).await? {
        return Err(AppError::StorageFailure(
            "quiz session could not be replaced, please retry".to_string(),
        ));
    }

    let public: Vec<PublicQuestion> = questions.iter().map(PublicQuestion::from).collect();

    Ok(Json(json!({
        "questions": public,
        "time_limit_seconds": session.time_limit_seconds,
        "started_at": session.started_at,
    })))
}

/// Polls the state of the current attempt.
///
/// This is also where an abandoned deadline is discovered: expiry is
/// computed from the stored start instant on every touch, there is no
/// background timer.
pub async fn quiz_state(
    State(store): State<Arc<dyn Store>>,
    State(clock): State<Arc<dyn Clock>>,
    Extension(claims): Extension<Claims>,
    Path(course_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let session = store
        .get_session(user_id, course_id)
        .await?
        .ok_or_else(|| AppError::NotFound("No quiz in progress".to_string()))?;

    let now = clock.now();
    Ok(Json(json!({
        "remaining_seconds": session.remaining_seconds(now).max(0),
        "expired": session.is_expired(now),
        "submitted": session.submitted,
        "answered": session.answers.len(),
        "total_questions": session.question_ids.len(),
    })))
}

/// Records (or replaces) the selection for one question of the running
/// attempt. Rejected once the deadline has passed or the attempt was
/// submitted; the stored answers stay untouched in both cases.
pub async fn save_answer(
    State(store): State<Arc<dyn Store>>,
    State(clock): State<Arc<dyn Clock>>,
    Extension(claims): Extension<Claims>,
    Path(course_id): Path<i64>,
    Json(payload): Json<AnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let mut session = store
        .get_session(user_id, course_id)
        .await?
        .ok_or_else(|| AppError::NotFound("No quiz in progress".to_string()))?;

    session
        .record_answer(payload.question_id, payload.selected_letters, clock.now())
        .map_err(session_error)?;

    // A rejected write means a submit froze the slot after our read; the
    // stale snapshot must not land.
    if !store.put_session(&session).await? {
        return Err(session_error(SessionError::AlreadySubmitted));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Submits the current attempt and returns the graded result.
///
/// Submission is serialized through `freeze_session`: exactly one caller
/// wins the freeze and scores; duplicates (client retries) get the stored
/// result back without re-scoring. Submitting after the deadline is allowed
/// and grades whatever was answered in time, which is how an expired attempt
/// discovered on poll gets closed out.
pub async fn submit_quiz(
    State(store): State<Arc<dyn Store>>,
    State(config): State<Config>,
    State(clock): State<Arc<dyn Clock>>,
    Extension(claims): Extension<Claims>,
    Path(course_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let session = store
        .get_session(user_id, course_id)
        .await?
        .ok_or_else(|| AppError::NotFound("No quiz in progress".to_string()))?;

    if session.submitted || !store.freeze_session(user_id, course_id).await? {
        return existing_result(&store, user_id, course_id).await;
    }

    let course = store
        .get_course(course_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Course {} not found", course_id)))?;

    let questions = store.questions_by_ids(&session.question_ids).await?;
    scoring::validate_submission(&questions, &session.answers)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let now = clock.now();
    let report = scoring::score(
        &questions,
        &session.answers,
        config.quiz.points_per_question,
        course.passing_score_percent,
        now,
    );

    store.upsert_score(user_id, course_id, &report.result).await?;
    store
        .append_question_results(user_id, course_id, &report.breakdown, now)
        .await?;

    record_completion_notification(&store, user_id, course_id).await;

    Ok(report_response(&report))
}

/// Discards the running attempt without grading; no partial score is kept.
pub async fn cancel_quiz(
    State(store): State<Arc<dyn Store>>,
    Extension(claims): Extension<Claims>,
    Path(course_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    store.delete_session(user_id, course_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Returns the stored grade for this course.
pub async fn get_score(
    State(store): State<Arc<dyn Store>>,
    Extension(claims): Extension<Claims>,
    Path(course_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let score = store
        .get_score(user_id, course_id)
        .await?
        .ok_or_else(|| AppError::NotFound("No result for this course yet".to_string()))?;

    Ok(Json(score))
}

/// Per-question answer history, most recent attempt first.
pub async fn quiz_history(
    State(store): State<Arc<dyn Store>>,
    Extension(claims): Extension<Claims>,
    Path(course_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let history = store.quiz_history(user_id, course_id).await?;
    Ok(Json(history))
}

fn session_error(err: SessionError) -> AppError {
    match err {
        SessionError::Expired => AppError::SessionExpired(err.to_string()),
        SessionError::AlreadySubmitted => AppError::SessionAlreadySubmitted(err.to_string()),
        SessionError::UnknownQuestion(_) => AppError::BadRequest(err.to_string()),
    }
}

fn report_response(report: &ScoreReport) -> Json<serde_json::Value> {
    Json(json!({
        "total_score": report.result.total_score,
        "max_score": report.result.max_score,
        "percent": report.result.percent,
        "passed": report.result.passed,
        "correct_count": report.correct_count,
        "total_questions": report.breakdown.len(),
        "completed_at": report.result.completed_at,
    }))
}

fn score_response(result: &ScoreResult) -> Json<serde_json::Value> {
    Json(json!({
        "total_score": result.total_score,
        "max_score": result.max_score,
        "percent": result.percent,
        "passed": result.passed,
        "completed_at": result.completed_at,
    }))
}

/// Duplicate submit: hand back what the winning submission stored.
async fn existing_result(
    store: &Arc<dyn Store>,
    user_id: i64,
    course_id: i64,
) -> Result<Json<serde_json::Value>, AppError> {
    match store.get_score(user_id, course_id).await? {
        Some(result) => Ok(score_response(&result)),
        // The winner froze the session but has not stored its result yet.
        None => Err(AppError::Conflict(
            "Submission already in progress, fetch the result shortly".to_string(),
        )),
    }
}

/// Completion notifications are delivered by an external mailer; only the
/// audit row is written here, and a failure to write it never fails the
/// submission.
async fn record_completion_notification(store: &Arc<dyn Store>, user_id: i64, course_id: i64) {
    let recipient = match store.find_by_id(user_id).await {
        Ok(Some(user)) => user.email.unwrap_or(user.username),
        _ => user_id.to_string(),
    };
    if let Err(e) = store
        .log_notification(user_id, course_id, "quiz_completion", &recipient, "logged")
        .await
    {
        tracing::warn!("failed to record completion notification: {}", e);
    }
}
