//! Idempotent article persistence
//!
//! Articles are keyed by their upstream natural key (`source_item_id`);
//! ingestion only ever upserts, so re-running a partially failed batch
//! converges on the same rows. `created_at` is set on first insert and never
//! touched again; `last_synced_at` is refreshed on every upsert.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use playbill_common::{PlaybillError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;
use tracing::{debug, instrument};

use crate::db::db_err;

/// A persisted article record.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Article {
    pub source_item_id: i64,
    pub column_id: String,
    pub title: String,
    pub author: Option<String>,
    pub excerpt: Option<String>,
    pub cover_path: String,
    pub tags: Vec<String>,
    pub source_create_date: Option<String>,
    pub detail: Value,
    pub created_at: DateTime<Utc>,
    pub last_synced_at: DateTime<Utc>,
}

/// Field values for one upsert. Everything here overwrites the stored row;
/// columns not represented (`created_at`) survive re-ingestion.
#[derive(Debug, Clone)]
pub struct ArticleDraft {
    pub source_item_id: i64,
    pub column_id: String,
    pub title: String,
    pub author: Option<String>,
    pub excerpt: Option<String>,
    pub cover_path: String,
    pub tags: Vec<String>,
    pub source_create_date: Option<String>,
    pub detail: Value,
}

const UPSERT_SQL: &str = r#"
    INSERT INTO articles (
        source_item_id, column_id, title, author, excerpt,
        cover_path, tags, source_create_date, detail
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
    ON CONFLICT (source_item_id) DO UPDATE SET
        column_id = EXCLUDED.column_id,
        title = EXCLUDED.title,
        author = EXCLUDED.author,
        excerpt = EXCLUDED.excerpt,
        cover_path = EXCLUDED.cover_path,
        tags = EXCLUDED.tags,
        source_create_date = EXCLUDED.source_create_date,
        detail = EXCLUDED.detail,
        last_synced_at = NOW()
"#;

const SELECT_COLUMNS: &str = r#"
    SELECT source_item_id, column_id, title, author, excerpt, cover_path,
           tags, source_create_date, detail, created_at, last_synced_at
    FROM articles
"#;

/// Store for ingested articles.
#[derive(Clone)]
pub struct ArticleStore {
    pool: PgPool,
}

impl ArticleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upsert a single record and return its persisted state.
    #[instrument(skip(self, draft), fields(source_item_id = draft.source_item_id))]
    pub async fn upsert_one(&self, draft: &ArticleDraft) -> Result<Article> {
        let sql = format!(
            "{} RETURNING source_item_id, column_id, title, author, excerpt, cover_path, \
             tags, source_create_date, detail, created_at, last_synced_at",
            UPSERT_SQL
        );

        sqlx::query_as::<_, Article>(&sql)
            .bind(draft.source_item_id)
            .bind(&draft.column_id)
            .bind(&draft.title)
            .bind(&draft.author)
            .bind(&draft.excerpt)
            .bind(&draft.cover_path)
            .bind(&draft.tags)
            .bind(&draft.source_create_date)
            .bind(&draft.detail)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
    }

    /// Upsert a batch and return the persisted state of every input record,
    /// in input order.
    ///
    /// The individual upserts target disjoint keys, so they carry no ordering
    /// guarantee among themselves; input order is restored by the re-read.
    /// Two input records sharing a `source_item_id` is caller error — the
    /// later write wins.
    #[instrument(skip(self, drafts), fields(count = drafts.len()))]
    pub async fn upsert_many(&self, drafts: &[ArticleDraft]) -> Result<Vec<Article>> {
        if drafts.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let mut affected = 0u64;

        for draft in drafts {
            let result = sqlx::query(UPSERT_SQL)
                .bind(draft.source_item_id)
                .bind(&draft.column_id)
                .bind(&draft.title)
                .bind(&draft.author)
                .bind(&draft.excerpt)
                .bind(&draft.cover_path)
                .bind(&draft.tags)
                .bind(&draft.source_create_date)
                .bind(&draft.detail)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
            affected += result.rows_affected();
        }

        // A zero-effect batch on non-empty input means something systemic
        // (connectivity, a silently dropped table), not a legitimate no-op.
        if affected == 0 {
            return Err(PlaybillError::PersistenceAnomaly(format!(
                "batch upsert of {} records reported zero effect",
                drafts.len()
            )));
        }

        tx.commit().await.map_err(db_err)?;

        debug!(affected, "Batch upsert committed");

        let keys: Vec<i64> = drafts.iter().map(|d| d.source_item_id).collect();
        self.find_by_keys(&keys).await.map_err(|e| match e {
            PlaybillError::NotFound(msg) => PlaybillError::PersistenceAnomaly(format!(
                "record missing after batch upsert: {}",
                msg
            )),
            other => other,
        })
    }

    /// Fetch records by natural key; the result follows the order of `keys`.
    pub async fn find_by_keys(&self, keys: &[i64]) -> Result<Vec<Article>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!("{} WHERE source_item_id = ANY($1)", SELECT_COLUMNS);
        let rows = sqlx::query_as::<_, Article>(&sql)
            .bind(keys.to_vec())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        let by_key: HashMap<i64, Article> =
            rows.into_iter().map(|a| (a.source_item_id, a)).collect();

        keys.iter()
            .map(|key| {
                by_key.get(key).cloned().ok_or_else(|| {
                    PlaybillError::NotFound(format!("article {} not found", key))
                })
            })
            .collect()
    }

    /// Fetch a single record by natural key.
    pub async fn find_by_key(&self, source_item_id: i64) -> Result<Option<Article>> {
        let sql = format!("{} WHERE source_item_id = $1", SELECT_COLUMNS);
        sqlx::query_as::<_, Article>(&sql)
            .bind(source_item_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)
    }
}
