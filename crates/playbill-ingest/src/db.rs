//! Database lifecycle and schema migrations.

use std::time::Duration;

use playbill_common::{PlaybillError, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, info};

use crate::config::DatabaseConfig;

/// Map a sqlx error into the project error type.
pub(crate) fn db_err(err: sqlx::Error) -> PlaybillError {
    PlaybillError::Database(err.to_string())
}

/// Schema statements, applied in order on every connect. All statements are
/// idempotent, so a fresh and an existing database both converge.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS articles (
        source_item_id     BIGINT PRIMARY KEY,
        column_id          TEXT NOT NULL,
        title              TEXT NOT NULL,
        author             TEXT,
        excerpt            TEXT,
        cover_path         TEXT NOT NULL,
        tags               TEXT[] NOT NULL DEFAULT '{}',
        source_create_date TEXT,
        detail             JSONB NOT NULL,
        created_at         TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        last_synced_at     TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_articles_column ON articles (column_id)",
    "CREATE INDEX IF NOT EXISTS idx_articles_tags ON articles USING GIN (tags)",
    r#"
    CREATE TABLE IF NOT EXISTS sync_checkpoints (
        column_id          TEXT PRIMARY KEY,
        column_name        TEXT NOT NULL,
        last_fetch_time    TIMESTAMPTZ NOT NULL,
        latest_create_date TEXT NOT NULL,
        latest_item_id     BIGINT NOT NULL,
        fetch_count        INTEGER NOT NULL DEFAULT 0,
        created_at         TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at         TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
];

/// Connect to Postgres and bring the schema up to date.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .connect(&config.url)
        .await
        .map_err(db_err)?;

    migrate(&pool).await?;

    info!("Database pool ready (max_connections: {})", config.max_connections);

    Ok(pool)
}

/// Apply the schema statements.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    for statement in SCHEMA {
        debug!("Applying schema statement");
        sqlx::query(statement).execute(pool).await.map_err(db_err)?;
    }
    Ok(())
}
