// src/config.rs

use std::env;
use std::str::FromStr;
use std::time::Duration;

use dotenvy::dotenv;

/// Submissions are still accepted this many minutes after a quiz's conclusion date.
pub const DEFAULT_SUBMISSION_GRACE_MINUTES: i64 = 10;
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 2000;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_JWT_EXPIRATION_SECS: u64 = 3600;

#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string. Without it the service runs on the in-memory store.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub bind_addr: String,
    pub submission_grace_minutes: i64,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub sweep_interval_secs: u64,
    pub demo_course_execution_id: Option<i64>,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").ok().filter(|url| !url.is_empty());

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        Self {
            database_url,
            jwt_secret,
            jwt_expiration: parse_or("JWT_EXPIRATION", DEFAULT_JWT_EXPIRATION_SECS),
            rust_log,
            bind_addr,
            submission_grace_minutes: parse_or(
                "SUBMISSION_GRACE_MINUTES",
                DEFAULT_SUBMISSION_GRACE_MINUTES,
            ),
            retry_attempts: parse_or("RETRY_ATTEMPTS", DEFAULT_RETRY_ATTEMPTS),
            retry_delay_ms: parse_or("RETRY_DELAY_MS", DEFAULT_RETRY_DELAY_MS),
            sweep_interval_secs: parse_or("SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL_SECS),
            demo_course_execution_id: env::var("DEMO_COURSE_EXECUTION_ID")
                .ok()
                .and_then(|v| v.parse().ok()),
        }
    }

    /// Settings for tests and local runs: in-memory store, no retry delay.
    pub fn for_tests(jwt_secret: &str) -> Self {
        Self {
            database_url: None,
            jwt_secret: jwt_secret.to_string(),
            jwt_expiration: 600,
            rust_log: "error".to_string(),
            bind_addr: "127.0.0.1:0".to_string(),
            submission_grace_minutes: DEFAULT_SUBMISSION_GRACE_MINUTES,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay_ms: 0,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            demo_course_execution_id: None,
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring unparsable {}={:?}", key, raw);
            default
        }),
        Err(_) => default,
    }
}
