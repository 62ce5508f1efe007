// src/main.rs

use dotenvy::dotenv;
use elearn_backend::clock::SystemClock;
use elearn_backend::config::Config;
use elearn_backend::models::user::NewUser;
use elearn_backend::routes;
use elearn_backend::state::AppState;
use elearn_backend::store::{CredentialStore, PgStore};
use elearn_backend::utils::hash::hash_password;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenv().ok();
    let config = Config::from_env();

    // Log to stdout and to a daily rolling file under logs/.
    let file_appender = tracing_appender::rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(EnvFilter::new(&config.rust_log))
        .with(fmt::layer().with_writer(std::io::stdout).with_target(false))
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    let pool = connect_with_retry(&config.database_url).await;
    tracing::info!("Database connected");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Migrations applied");

    let store = Arc::new(PgStore::new(pool));

    if let Err(e) = seed_admin_user(store.as_ref(), &config).await {
        tracing::error!("Failed to seed admin user: {:?}", e);
    }

    let state = AppState {
        store,
        config: config.clone(),
        clock: Arc::new(SystemClock),
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], 3000));
    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();

    // ConnectInfo feeds client IPs to the login attempt ledger.
    let app = routes::create_router(state);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .unwrap();
}

/// The database container may still be starting when we are; retry a few
/// times before giving up.
async fn connect_with_retry(database_url: &str) -> PgPool {
    let mut attempt = 0;
    loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(database_url)
            .await
        {
            Ok(pool) => return pool,
            Err(e) => {
                attempt += 1;
                if attempt > 5 {
                    panic!("Failed to connect to database after 5 retries: {}", e);
                }
                tracing::warn!("Database not ready, retrying in 2s (attempt {})", attempt);
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    }
}

/// Creates the configured admin account on first boot; later boots find it
/// and do nothing.
async fn seed_admin_user(
    store: &PgStore,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let (Some(username), Some(password)) = (&config.admin_username, &config.admin_password) else {
        return Ok(());
    };

    if store.find_by_username(username).await?.is_some() {
        return Ok(());
    }

    store
        .create_user(NewUser {
            username: username.clone(),
            password_hash: hash_password(password)?,
            email: None,
            full_name: None,
            role: "admin".to_string(),
        })
        .await?;
    tracing::info!("Seeded admin user '{}'", username);

    Ok(())
}
