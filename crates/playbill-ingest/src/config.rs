//! Configuration management

use playbill_common::{PlaybillError, Result};
use serde::{Deserialize, Serialize};

// ============================================================================
// Ingestion Configuration Constants
// ============================================================================

/// Default base URL of the upstream feed API.
pub const DEFAULT_FEED_BASE_URL: &str = "http://127.0.0.1:8080";

/// Default number of feed items requested per run.
pub const DEFAULT_PAGE_LIMIT: u32 = 10;

/// Default timeout applied uniformly to feed, detail, and asset requests.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Default bounded concurrency for detail fetches.
pub const DEFAULT_DETAIL_CONCURRENCY: usize = 5;

/// Default excerpt section markers (as emitted by the upstream feed).
pub const DEFAULT_EXCERPT_START_MARKER: &str = "【歌曲簡介】";
pub const DEFAULT_EXCERPT_END_MARKER: &str = "【歌詞】";

/// Default columns to ingest, as `id:name` pairs.
pub const DEFAULT_COLUMNS: &str = "7:Editor Picks,8:Guest Picks,9:Plugged Tracks";

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/playbill";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 2;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default database idle timeout in seconds (10 minutes).
pub const DEFAULT_DATABASE_IDLE_TIMEOUT_SECS: u64 = 600;

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub feed: FeedConfig,
    pub database: DatabaseConfig,
    pub columns: Vec<ColumnConfig>,
    pub excerpt: ExcerptConfig,
}

/// Upstream feed configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub base_url: String,
    pub page_limit: u32,
    pub http_timeout_secs: u64,
    pub detail_concurrency: usize,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

/// A feed column to ingest, with its human-readable display name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnConfig {
    pub id: String,
    pub name: String,
}

/// Excerpt section markers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExcerptConfig {
    pub start_marker: String,
    pub end_marker: String,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            feed: FeedConfig {
                base_url: std::env::var("PLAYBILL_FEED_URL")
                    .unwrap_or_else(|_| DEFAULT_FEED_BASE_URL.to_string()),
                page_limit: std::env::var("PLAYBILL_PAGE_LIMIT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_PAGE_LIMIT),
                http_timeout_secs: std::env::var("PLAYBILL_HTTP_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
                detail_concurrency: std::env::var("PLAYBILL_DETAIL_CONCURRENCY")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DETAIL_CONCURRENCY),
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DATABASE_MAX_CONNECTIONS),
                min_connections: std::env::var("DATABASE_MIN_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DATABASE_MIN_CONNECTIONS),
                connect_timeout_secs: std::env::var("DATABASE_CONNECT_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS),
                idle_timeout_secs: std::env::var("DATABASE_IDLE_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DATABASE_IDLE_TIMEOUT_SECS),
            },
            columns: parse_columns(
                &std::env::var("PLAYBILL_COLUMNS").unwrap_or_else(|_| DEFAULT_COLUMNS.to_string()),
            ),
            excerpt: ExcerptConfig {
                start_marker: std::env::var("PLAYBILL_EXCERPT_START")
                    .unwrap_or_else(|_| DEFAULT_EXCERPT_START_MARKER.to_string()),
                end_marker: std::env::var("PLAYBILL_EXCERPT_END")
                    .unwrap_or_else(|_| DEFAULT_EXCERPT_END_MARKER.to_string()),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.feed.base_url.is_empty() {
            return Err(PlaybillError::Config("Feed base URL cannot be empty".to_string()));
        }

        if self.feed.page_limit == 0 {
            return Err(PlaybillError::Config("Page limit must be greater than 0".to_string()));
        }

        if self.feed.detail_concurrency == 0 {
            return Err(PlaybillError::Config(
                "Detail concurrency must be greater than 0".to_string(),
            ));
        }

        if self.database.url.is_empty() {
            return Err(PlaybillError::Config("Database URL cannot be empty".to_string()));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(PlaybillError::Config(format!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections, self.database.max_connections
            )));
        }

        if self.columns.is_empty() {
            return Err(PlaybillError::Config("At least one column must be configured".to_string()));
        }

        Ok(())
    }

    /// Display name for a column id, falling back to `Column {id}` for
    /// columns that were requested ad hoc rather than configured.
    pub fn column_name(&self, column_id: &str) -> String {
        self.columns
            .iter()
            .find(|c| c.id == column_id)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| format!("Column {}", column_id))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feed: FeedConfig {
                base_url: DEFAULT_FEED_BASE_URL.to_string(),
                page_limit: DEFAULT_PAGE_LIMIT,
                http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
                detail_concurrency: DEFAULT_DETAIL_CONCURRENCY,
            },
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                idle_timeout_secs: DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
            },
            columns: parse_columns(DEFAULT_COLUMNS),
            excerpt: ExcerptConfig {
                start_marker: DEFAULT_EXCERPT_START_MARKER.to_string(),
                end_marker: DEFAULT_EXCERPT_END_MARKER.to_string(),
            },
        }
    }
}

/// Parse a `id:name,id:name` column list; entries without a name fall back
/// to `Column {id}`.
fn parse_columns(raw: &str) -> Vec<ColumnConfig> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once(':') {
            Some((id, name)) => ColumnConfig {
                id: id.trim().to_string(),
                name: name.trim().to_string(),
            },
            None => ColumnConfig {
                id: entry.to_string(),
                name: format!("Column {}", entry),
            },
        })
        .collect()
}
