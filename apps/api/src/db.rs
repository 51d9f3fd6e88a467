use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

const CREATE_USERS: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id                   UUID PRIMARY KEY,
    name                 TEXT NOT NULL,
    email                TEXT NOT NULL,
    password_hash        TEXT NOT NULL,
    plan                 TEXT NOT NULL,
    referral_code        TEXT NOT NULL UNIQUE,
    referred_by          TEXT,
    is_verified          BOOLEAN NOT NULL DEFAULT FALSE,
    balance_usd          NUMERIC NOT NULL DEFAULT 0,
    balance_ngn          NUMERIC NOT NULL DEFAULT 0,
    referral_bonus_usd   NUMERIC NOT NULL DEFAULT 0,
    referral_bonus_ngn   NUMERIC NOT NULL DEFAULT 0,
    joined_at            TIMESTAMPTZ NOT NULL DEFAULT now(),
    version              BIGINT NOT NULL DEFAULT 0
)
"#;

const CREATE_EMAIL_INDEX: &str =
    "CREATE UNIQUE INDEX IF NOT EXISTS users_email_lower_idx ON users (lower(email))";

const CREATE_REFERRED_BY_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS users_referred_by_idx ON users (upper(referred_by))";

/// Creates and returns a PostgreSQL connection pool.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    info!("Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    info!("PostgreSQL connection pool established");
    Ok(pool)
}

/// Creates the `users` table and its indexes if they do not exist yet.
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    for statement in [CREATE_USERS, CREATE_EMAIL_INDEX, CREATE_REFERRED_BY_INDEX] {
        sqlx::query(statement).execute(pool).await?;
    }
    info!("Database schema ready");
    Ok(())
}
