use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::payment::paystack::PAYSTACK_API_BASE;

/// Application configuration loaded from environment variables.
/// Fails at startup if `PAYSTACK_SECRET_KEY` is missing or a value is malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub paystack_secret_key: String,
    pub paystack_api_base: String,
    /// Origin the callback and referral links are built on.
    pub public_base_url: String,
    pub port: u16,
    pub rust_log: String,
    /// Postgres account repository; in-memory when unset.
    pub database_url: Option<String>,
    /// Redis session storage; takes precedence over `session_dir`.
    pub redis_url: Option<String>,
    pub session_dir: Option<PathBuf>,
    /// Artificial delay on every in-memory repository call.
    pub mock_latency: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            paystack_secret_key: require_env("PAYSTACK_SECRET_KEY")?,
            paystack_api_base: env_or("PAYSTACK_API_BASE", PAYSTACK_API_BASE),
            public_base_url: env_or("PUBLIC_BASE_URL", "http://localhost:8080"),
            port: env_or("PORT", "8080")
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: env_or("RUST_LOG", "info"),
            database_url: optional_env("DATABASE_URL"),
            redis_url: optional_env("REDIS_URL"),
            session_dir: optional_env("SESSION_DIR").map(PathBuf::from),
            mock_latency: Duration::from_millis(
                env_or("MOCK_LATENCY_MS", "0")
                    .parse::<u64>()
                    .context("MOCK_LATENCY_MS must be a number of milliseconds")?,
            ),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    optional_env(key).unwrap_or_else(|| default.to_string())
}
