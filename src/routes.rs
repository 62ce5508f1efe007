// src/routes.rs

use axum::{
    Router, http::Method, middleware,
    routing::{get, post, put},
};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::{
    handlers::{admin, auth, course, quiz},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (auth, courses/quiz, admin).
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (store, config, clock).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        "http://localhost:3000".parse().unwrap(),
        "http://127.0.0.1:3000".parse().unwrap(),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    // Everything about courses needs a logged-in user.
    let course_routes = Router::new()
        .route("/", get(course::list_courses))
        .route("/{id}", get(course::get_course))
        .route("/{id}/quiz/start", post(quiz::start_quiz))
        .route("/{id}/quiz", get(quiz::quiz_state).delete(quiz::cancel_quiz))
        .route("/{id}/quiz/answer", post(quiz::save_answer))
        .route("/{id}/quiz/submit", post(quiz::submit_quiz))
        .route("/{id}/score", get(quiz::get_score))
        .route("/{id}/history", get(quiz::quiz_history))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let admin_routes = Router::new()
        .route("/users", get(admin::list_users))
        .route("/users/{id}/status", put(admin::update_user_status))
        .route("/users/{id}/unlock", post(admin::unlock_user))
        .route("/login-logs", get(admin::login_logs))
        .route("/statistics", get(admin::statistics))
        .route("/courses", post(admin::create_course))
        .route("/questions", post(admin::create_question))
        // Double middleware protection: Auth first, then Admin check
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/courses", course_routes)
        .nest("/api/admin", admin_routes)
        // Course material PDFs, served as plain static files.
        .nest_service("/files", ServeDir::new(&state.config.materials_dir))
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
