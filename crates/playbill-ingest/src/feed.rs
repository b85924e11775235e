//! Upstream feed API client
//!
//! Thin client over the external feed: one paginated listing endpoint per
//! column and one detail endpoint per item. The underlying `reqwest` client
//! is constructed once at startup (with the uniform request timeout) and
//! injected here, so every consumer shares the same connection pool.

use playbill_common::{PlaybillError, Result};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};

/// One entry of a feed listing page. `items[0]` is the most recent.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    pub source_item_id: i64,
    pub create_date: String,
}

#[derive(Debug, Deserialize)]
struct FeedPage {
    items: Vec<FeedItem>,
}

/// Typed projection of an article detail payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailFields {
    pub source_item_id: i64,
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub create_date: Option<String>,
    pub cover: CoverRef,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Reference to the item's cover asset at its origin.
#[derive(Debug, Clone, Deserialize)]
pub struct CoverRef {
    pub src: String,
    #[serde(default)]
    pub srcset: Option<String>,
}

/// Full article detail: the typed fields the pipeline works with plus the
/// raw payload, which is persisted verbatim.
#[derive(Debug, Clone)]
pub struct ArticleDetail {
    pub fields: DetailFields,
    pub raw: Value,
}

/// Client for the external feed and detail APIs.
#[derive(Clone)]
pub struct FeedClient {
    http: reqwest::Client,
    base_url: String,
}

impl FeedClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    /// Fetch one listing page for a column. An empty page is a valid result.
    #[instrument(skip(self))]
    pub async fn fetch_page(&self, column_id: &str, limit: u32) -> Result<Vec<FeedItem>> {
        let url = format!("{}/feed", self.base_url);
        let limit = limit.to_string();
        let response = self
            .http
            .get(&url)
            .query(&[("column", column_id), ("limit", limit.as_str())])
            .send()
            .await
            .map_err(|e| classify_transport(&url, e))?;

        if !response.status().is_success() {
            return Err(PlaybillError::Network(format!(
                "feed returned {} for column {}",
                response.status(),
                column_id
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| classify_transport(&url, e))?;
        let page: FeedPage = serde_json::from_slice(&body)?;

        debug!(column_id, items = page.items.len(), "Fetched feed page");

        Ok(page.items)
    }

    /// Fetch the full detail payload for one item.
    #[instrument(skip(self))]
    pub async fn fetch_detail(&self, source_item_id: i64) -> Result<ArticleDetail> {
        let url = format!("{}/detail/{}", self.base_url, source_item_id);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| classify_transport(&url, e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(PlaybillError::NotFound(format!(
                "source item {} does not exist",
                source_item_id
            )));
        }

        if !response.status().is_success() {
            return Err(PlaybillError::Network(format!(
                "detail endpoint returned {} for item {}",
                response.status(),
                source_item_id
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| classify_transport(&url, e))?;
        let raw: Value = serde_json::from_slice(&body)?;
        let fields: DetailFields = serde_json::from_value(raw.clone())?;

        Ok(ArticleDetail { fields, raw })
    }
}

/// Timeouts and unreachable hosts are retryable later (`Unavailable`);
/// everything else on the wire is a plain network error.
fn classify_transport(url: &str, err: reqwest::Error) -> PlaybillError {
    if err.is_timeout() || err.is_connect() {
        PlaybillError::Unavailable(format!("{}: {}", url, err))
    } else {
        PlaybillError::Network(format!("{}: {}", url, err))
    }
}
