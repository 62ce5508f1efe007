// tests/auth_lockout_tests.rs

use chrono::{Duration, TimeZone, Utc};
use elearn_backend::clock::ManualClock;
use elearn_backend::config::{AuthPolicy, Config, QuizPolicy};
use elearn_backend::core::lockout::CredentialUpdate;
use elearn_backend::routes;
use elearn_backend::state::AppState;
use elearn_backend::store::{AttemptLedger, CredentialStore, MemoryStore};
use std::net::SocketAddr;
use std::sync::Arc;

/// Spawns the app on a random port against the in-memory store and a
/// manually driven clock. Returns the base URL plus handles to both.
async fn spawn_app() -> (String, Arc<MemoryStore>, Arc<ManualClock>) {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
    ));

    let config = Config {
        database_url: "postgres://unused".to_string(),
        jwt_secret: "test_secret_for_integration_tests".to_string(),
        jwt_expiration: 600,
        rust_log: "error".to_string(),
        admin_username: None,
        admin_password: None,
        materials_dir: "materials".to_string(),
        // Tight limits keep the lockout scenarios short.
        auth: AuthPolicy {
            max_login_attempts: 3,
            lockout_minutes: 30,
        },
        quiz: QuizPolicy {
            points_per_question: 20,
        },
    };

    let state = AppState {
        store: store.clone(),
        config,
        clock: clock.clone(),
    };

    let app = routes::create_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    (address, store, clock)
}

async fn register(client: &reqwest::Client, address: &str, username: &str, password: &str) {
    let response = client
        .post(format!("{}/api/auth/register", address))
        .json(&serde_json::json!({ "username": username, "password": password }))
        .send()
        .await
        .expect("Register failed");
    assert_eq!(response.status().as_u16(), 201);
}

async fn login(
    client: &reqwest::Client,
    address: &str,
    username: &str,
    password: &str,
) -> reqwest::Response {
    client
        .post(format!("{}/api/auth/login", address))
        .json(&serde_json::json!({ "username": username, "password": password }))
        .send()
        .await
        .expect("Login request failed")
}

#[tokio::test]
async fn login_works_with_correct_credentials() {
    let (address, _store, _clock) = spawn_app().await;
    let client = reqwest::Client::new();
    register(&client, &address, "alice", "password123").await;

    let response = login(&client, &address, "alice", "password123").await;
    assert_eq!(response.status().as_u16(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["token"].as_str().is_some());
    assert_eq!(body["type"], "Bearer");
}

#[tokio::test]
async fn unknown_user_and_wrong_password_are_indistinguishable() {
    let (address, _store, _clock) = spawn_app().await;
    let client = reqwest::Client::new();
    register(&client, &address, "alice", "password123").await;

    let wrong_password = login(&client, &address, "alice", "nope").await;
    let unknown_user = login(&client, &address, "no_such_user", "nope").await;

    assert_eq!(wrong_password.status().as_u16(), 401);
    assert_eq!(unknown_user.status().as_u16(), 401);

    let body_a: serde_json::Value = wrong_password.json().await.unwrap();
    let body_b: serde_json::Value = unknown_user.json().await.unwrap();
    assert_eq!(body_a, body_b);
}

#[tokio::test]
async fn three_failures_lock_the_account_even_for_the_right_password() {
    let (address, _store, clock) = spawn_app().await;
    let client = reqwest::Client::new();
    register(&client, &address, "alice", "password123").await;

    // Two wrong attempts: still plain 401s.
    for _ in 0..2 {
        let response = login(&client, &address, "alice", "wrong").await;
        assert_eq!(response.status().as_u16(), 401);
    }

    // The third wrong attempt creates the lock.
    let response = login(&client, &address, "alice", "wrong").await;
    assert_eq!(response.status().as_u16(), 423);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("30 minutes"));

    // One minute later, the correct password is still rejected with the
    // remaining window.
    clock.advance(Duration::minutes(1));
    let response = login(&client, &address, "alice", "password123").await;
    assert_eq!(response.status().as_u16(), 423);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("29 minutes"));
}

#[tokio::test]
async fn lock_expires_lazily_and_login_succeeds_afterwards() {
    let (address, store, clock) = spawn_app().await;
    let client = reqwest::Client::new();
    register(&client, &address, "alice", "password123").await;

    for _ in 0..3 {
        login(&client, &address, "alice", "wrong").await;
    }

    clock.advance(Duration::minutes(30));
    let response = login(&client, &address, "alice", "password123").await;
    assert_eq!(response.status().as_u16(), 200);

    // Success reset the counter and cleared the lock.
    let user = store.find_by_username("alice").await.unwrap().unwrap();
    assert_eq!(user.failed_login_count, 0);
    assert!(user.locked_until.is_none());
    assert!(user.last_login.is_some());
}

#[tokio::test]
async fn counter_restarts_after_lock_expiry() {
    let (address, store, clock) = spawn_app().await;
    let client = reqwest::Client::new();
    register(&client, &address, "alice", "password123").await;

    for _ in 0..3 {
        login(&client, &address, "alice", "wrong").await;
    }

    // Past the window, a wrong password counts from zero again.
    clock.advance(Duration::minutes(31));
    let response = login(&client, &address, "alice", "wrong").await;
    assert_eq!(response.status().as_u16(), 401);

    let user = store.find_by_username("alice").await.unwrap().unwrap();
    assert_eq!(user.failed_login_count, 1);
    assert!(user.locked_until.is_none());
}

#[tokio::test]
async fn suspended_account_is_rejected_before_password_checks() {
    let (address, store, _clock) = spawn_app().await;
    let client = reqwest::Client::new();
    register(&client, &address, "alice", "password123").await;

    let user = store.find_by_username("alice").await.unwrap().unwrap();
    store.set_status(user.id, "suspended").await.unwrap();

    let response = login(&client, &address, "alice", "password123").await;
    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
async fn every_attempt_lands_in_the_ledger() {
    let (address, store, _clock) = spawn_app().await;
    let client = reqwest::Client::new();
    register(&client, &address, "alice", "password123").await;

    login(&client, &address, "alice", "wrong").await;
    login(&client, &address, "alice", "password123").await;
    login(&client, &address, "ghost", "whatever").await;

    let logs = store.recent(None, 50).await.unwrap();
    assert_eq!(logs.len(), 3);

    // Most recent first; the unknown-user row has no user id.
    assert_eq!(logs[0].username, "ghost");
    assert!(logs[0].user_id.is_none());
    assert_eq!(logs[0].outcome, "failed");
    assert_eq!(logs[1].outcome, "success");
    assert_eq!(logs[2].outcome, "failed");
    assert!(
        logs[2]
            .reason
            .as_deref()
            .unwrap()
            .contains("2 attempts left")
    );

    let user = store.find_by_username("alice").await.unwrap().unwrap();
    let alice_logs = store.recent(Some(user.id), 50).await.unwrap();
    assert_eq!(alice_logs.len(), 2);
}

#[tokio::test]
async fn stale_counter_update_is_rejected_without_touching_the_row() {
    let (address, store, _clock) = spawn_app().await;
    let client = reqwest::Client::new();
    register(&client, &address, "alice", "password123").await;

    // One real failure brings the stored counter to 1.
    login(&client, &address, "alice", "wrong").await;
    let user = store.find_by_username("alice").await.unwrap().unwrap();
    assert_eq!(user.failed_login_count, 1);

    // An update computed from a pre-failure read carries stale expectations;
    // the compare-and-swap must refuse it.
    let stale = CredentialUpdate {
        failed_login_count: 1,
        locked_until: None,
        record_login_at: None,
        expected_failed_count: 0,
        expected_locked_until: None,
    };
    assert!(!store.apply_update(user.id, &stale).await.unwrap());

    let after = store.find_by_username("alice").await.unwrap().unwrap();
    assert_eq!(after.failed_login_count, 1);
    assert!(after.locked_until.is_none());
}

#[tokio::test]
async fn lost_counter_race_is_retryable_and_ledgered_as_superseded() {
    let (address, store, _clock) = spawn_app().await;
    let client = reqwest::Client::new();
    register(&client, &address, "alice", "password123").await;

    // The correct password, but a concurrent attempt wins the counter
    // update: no token, retryable status, and the ledger records the
    // supersession rather than a success that never took effect.
    store.contend_next_credential_update();
    let response = login(&client, &address, "alice", "password123").await;
    assert_eq!(response.status().as_u16(), 503);

    let logs = store.recent(None, 10).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].outcome, "failed");
    assert_eq!(
        logs[0].reason.as_deref(),
        Some("superseded by a concurrent attempt")
    );

    let user = store.find_by_username("alice").await.unwrap().unwrap();
    assert!(user.last_login.is_none());

    // The retry goes through and is ledgered as the success it is.
    let response = login(&client, &address, "alice", "password123").await;
    assert_eq!(response.status().as_u16(), 200);
    let logs = store.recent(None, 10).await.unwrap();
    assert_eq!(logs[0].outcome, "success");
}
