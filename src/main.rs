// src/main.rs

use std::sync::Arc;
use std::time::Duration;

use dotenvy::dotenv;
use quiz_answers::config::Config;
use quiz_answers::routes;
use quiz_answers::services::{Services, maintenance};
use quiz_answers::state::AppState;
use quiz_answers::store::{MemoryStore, PgStore, Store};
use quiz_answers::utils::clock::SystemClock;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file (if present)
    dotenv().ok();

    // Load configuration from environment
    let config = Config::from_env();

    let file_appender = tracing_appender::rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    // Initialize Tracing (Logging)
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    let store: Arc<dyn Store> = match &config.database_url {
        Some(database_url) => {
            let pool = connect_with_retry(database_url).await?;

            // Run Migrations Automatically
            tracing::info!("Running migrations...");
            sqlx::migrate!("./migrations").run(&pool).await?;
            tracing::info!("Migrations applied successfully.");

            Arc::new(PgStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, answers are kept in memory only");
            Arc::new(MemoryStore::default())
        }
    };

    let services = Services::new(store, Arc::new(SystemClock), &config);
    let _sweeper = maintenance::spawn_sweeper(services.answers.clone(), config.sweep_interval());
    tracing::info!(every = ?config.sweep_interval(), "Maintenance sweeper scheduled");

    let state = AppState {
        services,
        config: config.clone(),
    };

    // Create the Axum application router
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    // Start the server
    axum::serve(listener, app).await?;
    Ok(())
}

/// Connects to Postgres, retrying while the database comes up.
async fn connect_with_retry(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let mut retry_count = 0;
    loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(database_url)
            .await
        {
            Ok(pool) => {
                tracing::info!("Database connected...");
                return Ok(pool);
            }
            Err(e) => {
                retry_count += 1;
                if retry_count > 5 {
                    tracing::error!("Failed to connect to database after 5 retries");
                    return Err(e);
                }
                tracing::warn!("Database not ready, retrying in 2s... (Attempt {})", retry_count);
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    }
}
