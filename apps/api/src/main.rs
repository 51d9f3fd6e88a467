mod accounts;
mod config;
mod currency;
mod db;
mod errors;
mod models;
mod payment;
mod plans;
mod referrals;
mod registration;
mod routes;
mod session;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::accounts::{AccountRepository, InMemoryAccountRepository, PgAccountRepository};
use crate::config::Config;
use crate::db::{create_pool, ensure_schema};
use crate::payment::paystack::PaystackClient;
use crate::routes::build_router;
use crate::session::{FileSessionStorage, MemorySessionStorage, RedisSessionStorage, SessionStorage};
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Inveron API v{}", env!("CARGO_PKG_VERSION"));

    let accounts = build_account_repository(&config).await?;
    let sessions = build_session_storage(&config).await?;

    let paystack = PaystackClient::new(
        &config.paystack_api_base,
        config.paystack_secret_key.clone(),
    )?;
    info!("Paystack client initialized ({})", config.paystack_api_base);

    let state = AppState {
        config: config.clone(),
        accounts,
        sessions,
        gateway: Arc::new(paystack.clone()),
        paystack,
    };

    let app = build_router(state).layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Postgres when `DATABASE_URL` is set, otherwise an in-memory repository.
async fn build_account_repository(config: &Config) -> Result<Arc<dyn AccountRepository>> {
    match &config.database_url {
        Some(url) => {
            let pool = create_pool(url).await?;
            ensure_schema(&pool).await?;
            Ok(Arc::new(PgAccountRepository::new(pool)))
        }
        None => {
            info!(
                "DATABASE_URL not set; using in-memory accounts (latency {:?})",
                config.mock_latency
            );
            Ok(Arc::new(InMemoryAccountRepository::with_latency(
                config.mock_latency,
            )))
        }
    }
}

/// Redis, then a session directory, then process memory.
async fn build_session_storage(config: &Config) -> Result<Arc<dyn SessionStorage>> {
    if let Some(url) = &config.redis_url {
        let client = redis::Client::open(url.as_str())?;
        let storage = RedisSessionStorage::connect(&client).await?;
        info!("Redis session storage initialized");
        return Ok(Arc::new(storage));
    }
    if let Some(dir) = &config.session_dir {
        let storage = FileSessionStorage::open(dir)?;
        info!("File session storage at {}", dir.display());
        return Ok(Arc::new(storage));
    }
    info!("Using in-memory session storage");
    Ok(Arc::new(MemorySessionStorage::new()))
}
