//! Content-addressed object storage
//!
//! Relocates remote assets into an S3-compatible bucket under keys derived
//! from their content: `{md5hex}.{ext}`. Identical bytes always map to the
//! identical key, so re-uploading an already-ingested asset is a no-op write
//! and retried uploads are indistinguishable from a single upload.

use std::path::{Path, PathBuf};
use std::time::Duration;

use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use futures::StreamExt;
use playbill_common::{PlaybillError, Result};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};
use url::Url;
use uuid::Uuid;

pub mod config;

pub use config::StorageConfig;

/// Client for the media bucket.
#[derive(Clone)]
pub struct Storage {
    client: Client,
    http: reqwest::Client,
    bucket: String,
    spool_dir: PathBuf,
}

/// Reference to a relocated asset.
#[derive(Debug, Clone)]
pub struct StoredObject {
    /// Content-addressed object key (`{md5hex}.{ext}`).
    pub key: String,
    /// Path exposed to downstream consumers (`/{bucket}/{key}`).
    pub path: String,
    pub size: i64,
    pub md5: String,
}

struct SpooledAsset {
    md5_hex: String,
    size: i64,
}

impl Storage {
    /// Build the storage client once; the `reqwest` client is shared with the
    /// rest of the process.
    pub fn new(config: StorageConfig, http: reqwest::Client) -> Self {
        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "playbill-storage",
        );

        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(s3_config_builder.build());

        info!("Storage client initialized for bucket: {}", config.bucket);

        Self {
            client,
            http,
            bucket: config.bucket,
            spool_dir: config.spool_dir,
        }
    }

    /// Create the bucket if it does not already exist (checked via an
    /// existence probe, so repeated calls are idempotent).
    #[instrument(skip(self))]
    pub async fn ensure_bucket(&self) -> Result<()> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => {
                debug!("Bucket {} already exists", self.bucket);
                return Ok(());
            },
            Err(e) => {
                let absent = e
                    .as_service_error()
                    .map(|se| se.is_not_found())
                    .unwrap_or(false);
                if !absent {
                    return Err(PlaybillError::Storage(format!(
                        "failed to probe bucket {}: {}",
                        self.bucket, e
                    )));
                }
            },
        }

        match self.client.create_bucket().bucket(&self.bucket).send().await {
            Ok(_) => info!("Created bucket {}", self.bucket),
            Err(e) => {
                // another writer may have raced us to the creation
                let already_there = e
                    .as_service_error()
                    .map(|se| se.is_bucket_already_owned_by_you() || se.is_bucket_already_exists())
                    .unwrap_or(false);
                if !already_there {
                    return Err(PlaybillError::Storage(format!(
                        "failed to create bucket {}: {}",
                        self.bucket, e
                    )));
                }
            },
        }

        Ok(())
    }

    /// Stream a remote asset into the bucket under its content-addressed key.
    ///
    /// A single owner drains the source byte stream, feeding each chunk to an
    /// incremental MD5 digest and a spool file exactly once, in order; the
    /// whole object is never held in memory. The final key depends on the
    /// digest, so the object is written under it only after the stream is
    /// fully drained — a failed upload leaves nothing visible under the
    /// final key.
    #[instrument(skip(self))]
    pub async fn upload_from_url(&self, source_url: &str) -> Result<StoredObject> {
        let response = self
            .http
            .get(source_url)
            .send()
            .await
            .map_err(|e| classify_fetch(source_url, e))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(PlaybillError::NotFound(format!(
                "source asset {} does not exist",
                source_url
            )));
        }
        if !status.is_success() {
            return Err(PlaybillError::UploadFailed(format!(
                "source {} returned {}",
                source_url, status
            )));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        tokio::fs::create_dir_all(&self.spool_dir).await?;
        let spool_path = self.spool_dir.join(format!("spool-{}", Uuid::new_v4()));

        let spooled = match spool_response(source_url, response, &spool_path).await {
            Ok(spooled) => spooled,
            Err(e) => {
                let _ = tokio::fs::remove_file(&spool_path).await;
                return Err(e);
            },
        };

        let key = match extension_from_url(source_url) {
            Some(ext) => format!("{}.{}", spooled.md5_hex, ext),
            None => spooled.md5_hex.clone(),
        };

        let upload = self
            .put_spooled(&key, &spool_path, spooled.size, content_type)
            .await;
        let _ = tokio::fs::remove_file(&spool_path).await;
        upload?;

        info!(
            "Relocated {} to s3://{}/{} ({} bytes)",
            source_url, self.bucket, key, spooled.size
        );

        Ok(StoredObject {
            path: self.object_path(&key),
            key,
            size: spooled.size,
            md5: spooled.md5_hex,
        })
    }

    async fn put_spooled(
        &self,
        key: &str,
        spool_path: &Path,
        size: i64,
        content_type: Option<String>,
    ) -> Result<()> {
        let body = ByteStream::from_path(spool_path).await.map_err(|e| {
            PlaybillError::UploadFailed(format!("failed to read spooled asset: {}", e))
        })?;

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_length(size);

        if let Some(ct) = content_type {
            request = request.content_type(ct);
        }

        request.send().await.map_err(|e| {
            PlaybillError::UploadFailed(format!("s3://{}/{}: {}", self.bucket, key, e))
        })?;

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn exists(&self, key: &str) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let absent = e
                    .as_service_error()
                    .map(|se| se.is_not_found())
                    .unwrap_or(false);
                if absent {
                    Ok(false)
                } else {
                    Err(PlaybillError::Storage(format!(
                        "failed to check s3://{}/{}: {}",
                        self.bucket, key, e
                    )))
                }
            },
        }
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                PlaybillError::Storage(format!(
                    "failed to delete s3://{}/{}: {}",
                    self.bucket, key, e
                ))
            })?;

        info!("Deleted s3://{}/{}", self.bucket, key);

        Ok(())
    }

    /// Generate a time-limited read URL; used by the read-side API layer,
    /// not by the ingestion path itself.
    #[instrument(skip(self))]
    pub async fn presigned_get(&self, key: &str, expires_in: Duration) -> Result<String> {
        let presigning_config = PresigningConfig::expires_in(expires_in)
            .map_err(|e| PlaybillError::Storage(format!("invalid presign expiry: {}", e)))?;

        let presigned_request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning_config)
            .await
            .map_err(|e| {
                PlaybillError::Storage(format!(
                    "failed to presign s3://{}/{}: {}",
                    self.bucket, key, e
                ))
            })?;

        Ok(presigned_request.uri().to_string())
    }

    pub fn object_path(&self, key: &str) -> String {
        format!("/{}/{}", self.bucket, key)
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

/// Single-owner read loop: each chunk is read once and forwarded to the two
/// sinks (digest state, spool file) in order.
async fn spool_response(
    source_url: &str,
    response: reqwest::Response,
    spool_path: &Path,
) -> Result<SpooledAsset> {
    let mut file = tokio::fs::File::create(spool_path).await?;
    let mut digest = md5::Context::new();
    let mut size: i64 = 0;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| classify_fetch(source_url, e))?;
        digest.consume(&chunk);
        size += chunk.len() as i64;
        file.write_all(&chunk).await?;
    }

    file.flush().await?;

    Ok(SpooledAsset {
        md5_hex: format!("{:x}", digest.compute()),
        size,
    })
}

/// Timeouts and unreachable hosts are retryable later (`Unavailable`); other
/// transport failures mid-stream abort the upload.
fn classify_fetch(url: &str, err: reqwest::Error) -> PlaybillError {
    if err.is_timeout() || err.is_connect() {
        PlaybillError::Unavailable(format!("{}: {}", url, err))
    } else {
        PlaybillError::UploadFailed(format!("{}: {}", url, err))
    }
}

/// Extension of the last path segment, query-stripped and lowercased.
fn extension_from_url(source_url: &str) -> Option<String> {
    let parsed = Url::parse(source_url).ok()?;
    let segment = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let (_, ext) = segment.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
