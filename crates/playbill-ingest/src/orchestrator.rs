//! Ingestion orchestration
//!
//! Composes the pipeline for one feed column: fetch the listing page, fetch
//! per-item detail under bounded concurrency, relocate cover assets into
//! content-addressed storage while extracting excerpts, batch-upsert the
//! results, and finally advance the column's sync checkpoint.
//!
//! A run is all-or-nothing: any failure between the page fetch and the upsert
//! aborts the whole run with a single aggregated error, and the checkpoint is
//! only written once the upsert has committed. Re-running after a failure is
//! safe — persistence is idempotent and the checkpoint never advanced.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use playbill_common::{PlaybillError, Result};
use tracing::{error, info, instrument};

use crate::batch::BatchExecutor;
use crate::checkpoint::{CheckpointStore, CheckpointUpdate};
use crate::config::Config;
use crate::db;
use crate::excerpt::extract_excerpt;
use crate::feed::{ArticleDetail, FeedClient};
use crate::records::{Article, ArticleDraft, ArticleStore};
use crate::storage::{Storage, StorageConfig};

/// Result of one ingestion run for one column.
#[derive(Debug)]
pub struct RunOutcome {
    pub column_id: String,
    /// Items the feed page yielded.
    pub fetched: usize,
    /// Persisted state of every ingested record, in feed order.
    pub records: Vec<Article>,
}

impl RunOutcome {
    pub fn is_noop(&self) -> bool {
        self.fetched == 0
    }

    /// Get a summary message
    pub fn summary(&self) -> String {
        if self.is_noop() {
            format!("Column {}: feed empty, nothing to ingest", self.column_id)
        } else {
            format!(
                "Column {}: ingested {}/{} items",
                self.column_id,
                self.records.len(),
                self.fetched
            )
        }
    }
}

/// Composes the ingestion pipeline over injected, constructed-once clients.
pub struct IngestOrchestrator {
    config: Config,
    feed: FeedClient,
    storage: Storage,
    articles: ArticleStore,
    checkpoints: CheckpointStore,
    batch: BatchExecutor,
    column_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl IngestOrchestrator {
    /// Assemble an orchestrator from already-constructed collaborators.
    pub fn new(
        config: Config,
        feed: FeedClient,
        storage: Storage,
        articles: ArticleStore,
        checkpoints: CheckpointStore,
    ) -> Result<Self> {
        let batch = BatchExecutor::new(config.feed.detail_concurrency)?;
        Ok(Self {
            config,
            feed,
            storage,
            articles,
            checkpoints,
            batch,
            column_locks: Mutex::new(HashMap::new()),
        })
    }

    /// Construct every collaborator from configuration and environment:
    /// shared HTTP client, database pool (with schema migration), storage
    /// client (with bucket creation), and the feed client.
    pub async fn bootstrap(config: Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.feed.http_timeout_secs))
            .user_agent(concat!("playbill-ingest/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PlaybillError::Config(format!("failed to build HTTP client: {}", e)))?;

        let pool = db::connect(&config.database).await?;

        let storage_config =
            StorageConfig::from_env().map_err(|e| PlaybillError::Config(e.to_string()))?;
        let storage = Storage::new(storage_config, http.clone());
        storage.ensure_bucket().await?;

        let feed = FeedClient::new(http, config.feed.base_url.clone());
        let articles = ArticleStore::new(pool.clone());
        let checkpoints = CheckpointStore::new(pool);

        Self::new(config, feed, storage, articles, checkpoints)
    }

    /// Run one ingestion cycle for a column.
    #[instrument(skip(self))]
    pub async fn run_column(&self, column_id: &str, limit: Option<u32>) -> Result<RunOutcome> {
        // Overlapping runs for the same column would race on the checkpoint;
        // serialize them within this process.
        let _guard = self.column_lock(column_id).lock_owned().await;

        let limit = limit.unwrap_or(self.config.feed.page_limit);
        info!(limit, "Starting ingestion run");

        let items = self.feed.fetch_page(column_id, limit).await?;
        if items.is_empty() {
            info!("Feed returned no items; run is a no-op");
            return Ok(RunOutcome {
                column_id: column_id.to_string(),
                fetched: 0,
                records: Vec::new(),
            });
        }

        let fetched = items.len();
        // items[0] is the most recent; it becomes the new high-water mark
        let newest = items[0].clone();

        let details = self
            .batch
            .try_execute(items, |item| self.feed.fetch_detail(item.source_item_id))
            .await?;

        // The heavy network work already passed through the detail-fetch
        // bound; cover relocation runs the whole page at once.
        let drafts = join_all(
            details
                .into_iter()
                .map(|detail| self.build_draft(column_id, detail)),
        )
        .await
        .into_iter()
        .collect::<Result<Vec<ArticleDraft>>>()?;

        let records = self.articles.upsert_many(&drafts).await?;

        self.checkpoints
            .write(&CheckpointUpdate {
                column_id: column_id.to_string(),
                column_name: self.config.column_name(column_id),
                last_fetch_time: Utc::now(),
                latest_create_date: newest.create_date,
                latest_item_id: newest.source_item_id,
                fetch_count: records.len() as i32,
            })
            .await?;

        info!(fetched, ingested = records.len(), "Ingestion run completed");

        Ok(RunOutcome {
            column_id: column_id.to_string(),
            fetched,
            records,
        })
    }

    /// Run every configured column in sequence, logging failures per column.
    pub async fn run_all(&self) -> Vec<RunOutcome> {
        let mut outcomes = Vec::new();
        let mut failed = 0;

        for column in &self.config.columns {
            match self.run_column(&column.id, None).await {
                Ok(outcome) => {
                    info!("{}", outcome.summary());
                    outcomes.push(outcome);
                },
                Err(e) => {
                    failed += 1;
                    error!(column_id = %column.id, error = %e, "Ingestion run failed");
                },
            }
        }

        info!(
            succeeded = outcomes.len(),
            failed, "Ingestion cycle completed"
        );

        outcomes
    }

    /// Relocate one article's cover and derive its excerpt.
    async fn build_draft(&self, column_id: &str, detail: ArticleDetail) -> Result<ArticleDraft> {
        let ArticleDetail { fields, raw } = detail;

        let stored = self.storage.upload_from_url(&fields.cover.src).await?;

        let excerpt = fields.content.as_deref().map(|content| {
            extract_excerpt(
                content,
                &self.config.excerpt.start_marker,
                &self.config.excerpt.end_marker,
            )
        });

        Ok(ArticleDraft {
            source_item_id: fields.source_item_id,
            column_id: column_id.to_string(),
            title: fields.title,
            author: fields.author,
            excerpt,
            cover_path: stored.path,
            tags: fields.tags,
            source_create_date: fields.create_date,
            detail: raw,
        })
    }

    fn column_lock(&self, column_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .column_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        locks.entry(column_id.to_string()).or_default().clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_outcome_summary() {
        let outcome = RunOutcome {
            column_id: "7".to_string(),
            fetched: 0,
            records: Vec::new(),
        };
        assert!(outcome.is_noop());
        assert_eq!(outcome.summary(), "Column 7: feed empty, nothing to ingest");

        let outcome = RunOutcome {
            column_id: "9".to_string(),
            fetched: 3,
            records: Vec::new(),
        };
        assert!(!outcome.is_noop());
        assert_eq!(outcome.summary(), "Column 9: ingested 0/3 items");
    }
}
