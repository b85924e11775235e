//! Per-column sync checkpoints
//!
//! One row per feed column records the high-water mark of what has already
//! been ingested: when the last run fetched, the newest item it saw, and how
//! many items that run yielded. Absence of a row is a valid state meaning
//! "never synced", never an error.

use chrono::{DateTime, Utc};
use playbill_common::timefmt;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{debug, instrument};

use crate::db::db_err;
use playbill_common::Result;

/// Persisted checkpoint state for one column.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SyncCheckpoint {
    pub column_id: String,
    pub column_name: String,
    pub last_fetch_time: DateTime<Utc>,
    pub latest_create_date: String,
    pub latest_item_id: i64,
    pub fetch_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SyncCheckpoint {
    /// Human-readable projection of `last_fetch_time`, derived at read time
    /// and never persisted.
    pub fn display_last_fetch(&self, now: DateTime<Utc>) -> String {
        timefmt::format_relative(self.last_fetch_time, now)
    }
}

/// New checkpoint state to record after a run.
#[derive(Debug, Clone)]
pub struct CheckpointUpdate {
    pub column_id: String,
    pub column_name: String,
    pub last_fetch_time: DateTime<Utc>,
    pub latest_create_date: String,
    pub latest_item_id: i64,
    pub fetch_count: i32,
}

/// Store for per-column checkpoints.
#[derive(Clone)]
pub struct CheckpointStore {
    pool: PgPool,
}

impl CheckpointStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Read the checkpoint for a column; `None` means "never synced".
    #[instrument(skip(self))]
    pub async fn read(&self, column_id: &str) -> Result<Option<SyncCheckpoint>> {
        sqlx::query_as::<_, SyncCheckpoint>(
            r#"
            SELECT column_id, column_name, last_fetch_time, latest_create_date,
                   latest_item_id, fetch_count, created_at, updated_at
            FROM sync_checkpoints
            WHERE column_id = $1
            "#,
        )
        .bind(column_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)
    }

    /// All checkpoints, most recently fetched first.
    pub async fn read_all(&self) -> Result<Vec<SyncCheckpoint>> {
        sqlx::query_as::<_, SyncCheckpoint>(
            r#"
            SELECT column_id, column_name, last_fetch_time, latest_create_date,
                   latest_item_id, fetch_count, created_at, updated_at
            FROM sync_checkpoints
            ORDER BY last_fetch_time DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)
    }

    /// Atomically replace the checkpoint for a column, creating it if absent.
    ///
    /// `last_fetch_time` only ever moves forward (`GREATEST` on conflict), so
    /// it stays monotonically non-decreasing even if two processes race.
    #[instrument(skip(self, update), fields(column_id = %update.column_id))]
    pub async fn write(&self, update: &CheckpointUpdate) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_checkpoints (
                column_id, column_name, last_fetch_time, latest_create_date,
                latest_item_id, fetch_count
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (column_id) DO UPDATE SET
                column_name = EXCLUDED.column_name,
                last_fetch_time = GREATEST(sync_checkpoints.last_fetch_time, EXCLUDED.last_fetch_time),
                latest_create_date = EXCLUDED.latest_create_date,
                latest_item_id = EXCLUDED.latest_item_id,
                fetch_count = EXCLUDED.fetch_count,
                updated_at = NOW()
            "#,
        )
        .bind(&update.column_id)
        .bind(&update.column_name)
        .bind(update.last_fetch_time)
        .bind(&update.latest_create_date)
        .bind(update.latest_item_id)
        .bind(update.fetch_count)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        debug!(
            latest_item_id = update.latest_item_id,
            fetch_count = update.fetch_count,
            "Checkpoint advanced"
        );

        Ok(())
    }
}
