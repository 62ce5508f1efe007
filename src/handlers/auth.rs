// src/handlers/auth.rs

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json,
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use serde_json::json;
use validator::Validate;

use crate::{
    clock::Clock,
    config::Config,
    core::lockout::{self, LoginOutcome},
    error::AppError,
    models::login_log::NewLoginAttempt,
    models::user::{CreateUserRequest, LoginRequest, NewUser},
    store::Store,
    utils::{
        hash::{hash_password, verify_password},
        jwt::sign_jwt,
    },
};

/// Shared by unknown-username and wrong-password responses so the two cases
/// cannot be told apart from the outside.
const GENERIC_LOGIN_ERROR: &str = "Invalid username or password.";

/// Registers a new user.
///
/// Hashes the password using Argon2 before storing it.
/// Returns 201 Created and the user object (excluding password).
pub async fn register(
    State(store): State<Arc<dyn Store>>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let password_hash = hash_password(&payload.password)?;

    let user = store
        .create_user(NewUser {
            username: payload.username,
            password_hash,
            email: payload.email,
            full_name: payload.full_name,
            role: "student".to_string(),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(user)))
}

/// Authenticates a user and returns a JWT token.
///
/// The whole attempt is evaluated by the lockout governor: it decides the
/// outcome and the counter/lock mutation in one step, the mutation is applied
/// as a compare-and-swap against the row that was read, and exactly one
/// ledger row is appended whatever the outcome. A token is only issued once
/// the update was durably applied.
pub async fn login(
    State(store): State<Arc<dyn Store>>,
    State(config): State<Config>,
    State(clock): State<Arc<dyn Clock>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let now = clock.now();
    let credential = store.find_by_username(&payload.username).await?;

    let secret_ok = match &credential {
        Some(user) => verify_password(&payload.password, &user.password_hash)?,
        None => false,
    };

    let eval = lockout::evaluate(credential.as_ref(), secret_ok, now, &config.auth);

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let mut attempt = NewLoginAttempt {
        user_id: credential.as_ref().map(|u| u.id),
        username: payload.username.clone(),
        outcome: eval.outcome.ledger_tag().to_string(),
        reason: eval.outcome.ledger_reason(),
        ip_address: Some(addr.ip().to_string()),
        user_agent,
        attempted_at: now,
    };

    if let (Some(user), Some(update)) = (credential.as_ref(), eval.update.as_ref()) {
        let applied = store.apply_update(user.id, update).await?;
        if !applied {
            // A concurrent attempt changed the counters first. The evaluated
            // outcome never took effect, so the ledger records the
            // supersession instead of an outcome that did not happen.
            attempt.outcome = "failed".to_string();
            attempt.reason = Some("superseded by a concurrent attempt".to_string());
            if let Err(e) = store.append(attempt).await {
                tracing::warn!("failed to record login attempt: {}", e);
            }
            return Err(AppError::StorageFailure(
                "login state changed concurrently, please retry".to_string(),
            ));
        }
    }

    // One ledger row per evaluation, including unknown usernames, appended
    // once the counter update is durable.
    if let Err(e) = store.append(attempt).await {
        tracing::warn!("failed to record login attempt: {}", e);
    }

    match eval.outcome {
        LoginOutcome::Success => {
            let user = credential.ok_or_else(|| {
                AppError::InternalServerError("successful login without credential".to_string())
            })?;
            let token = sign_jwt(user.id, &user.role, &config.jwt_secret, config.jwt_expiration)?;

            Ok(Json(json!({
                "token": token,
                "type": "Bearer",
            })))
        }
        LoginOutcome::NotFound | LoginOutcome::InvalidSecret { .. } => {
            Err(AppError::AuthError(GENERIC_LOGIN_ERROR.to_string()))
        }
        LoginOutcome::Disabled { status } => Err(AppError::AccountDisabled(format!(
            "This account is {}. Contact an administrator.",
            status
        ))),
        LoginOutcome::Locked { remaining_minutes } => Err(AppError::AccountLocked(format!(
            "Account is locked. Try again in {} minutes.",
            remaining_minutes
        ))),
        LoginOutcome::LockedJustNow { lockout_minutes } => Err(AppError::AccountLocked(format!(
            "Too many failed attempts. Account locked for {} minutes.",
            lockout_minutes
        ))),
    }
}
