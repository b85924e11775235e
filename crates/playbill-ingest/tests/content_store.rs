//! Content-addressed upload path, exercised against mock HTTP servers.
//!
//! The asset origin and the S3 endpoint are both wiremock servers; the S3
//! wire protocol for PutObject is a plain path-style PUT, which is enough to
//! observe key derivation and error classification end to end.

use std::time::Duration;

use playbill_ingest::storage::{Storage, StorageConfig};
use playbill_ingest::PlaybillError;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const JPEG_BYTES: &[u8] = b"\xff\xd8\xff\xe0 not really a jpeg but stable bytes";

fn storage_for(s3: &MockServer, spool: &tempfile::TempDir, http: reqwest::Client) -> Storage {
    let mut config = StorageConfig::for_minio(s3.uri(), "media");
    config.spool_dir = spool.path().to_path_buf();
    Storage::new(config, http)
}

async fn accept_all_puts(s3: &MockServer) {
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .mount(s3)
        .await;
}

#[tokio::test]
async fn test_same_bytes_from_two_urls_yield_same_key() {
    let source = MockServer::start().await;
    let s3 = MockServer::start().await;
    accept_all_puts(&s3).await;

    for p in ["/a/cover.jpg", "/b/unrelated-name.jpg"] {
        Mock::given(method("GET"))
            .and(path(p))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(JPEG_BYTES))
            .mount(&source)
            .await;
    }

    let spool = tempfile::tempdir().unwrap();
    let storage = storage_for(&s3, &spool, reqwest::Client::new());

    let first = storage
        .upload_from_url(&format!("{}/a/cover.jpg", source.uri()))
        .await
        .unwrap();
    let second = storage
        .upload_from_url(&format!("{}/b/unrelated-name.jpg", source.uri()))
        .await
        .unwrap();

    let expected_key = format!("{:x}.jpg", md5::compute(JPEG_BYTES));
    assert_eq!(first.key, expected_key);
    assert_eq!(second.key, expected_key);
    assert_eq!(first.path, format!("/media/{}", expected_key));
    assert_eq!(first.size, JPEG_BYTES.len() as i64);
    assert_eq!(first.md5, format!("{:x}", md5::compute(JPEG_BYTES)));
}

#[tokio::test]
async fn test_key_strips_query_and_lowercases_extension() {
    let source = MockServer::start().await;
    let s3 = MockServer::start().await;
    accept_all_puts(&s3).await;

    Mock::given(method("GET"))
        .and(path("/covers/Hero.PNG"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(JPEG_BYTES))
        .mount(&source)
        .await;

    let spool = tempfile::tempdir().unwrap();
    let storage = storage_for(&s3, &spool, reqwest::Client::new());

    let stored = storage
        .upload_from_url(&format!("{}/covers/Hero.PNG?v=2&cache=no", source.uri()))
        .await
        .unwrap();

    assert!(stored.key.ends_with(".png"), "key was {}", stored.key);
}

#[tokio::test]
async fn test_unrecoverable_extension_yields_bare_digest_key() {
    let source = MockServer::start().await;
    let s3 = MockServer::start().await;
    accept_all_puts(&s3).await;

    Mock::given(method("GET"))
        .and(path("/covers/hero"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(JPEG_BYTES))
        .mount(&source)
        .await;

    let spool = tempfile::tempdir().unwrap();
    let storage = storage_for(&s3, &spool, reqwest::Client::new());

    let stored = storage
        .upload_from_url(&format!("{}/covers/hero", source.uri()))
        .await
        .unwrap();

    assert_eq!(stored.key, format!("{:x}", md5::compute(JPEG_BYTES)));
    assert!(!stored.key.contains('.'));
}

#[tokio::test]
async fn test_source_content_type_is_forwarded_to_storage() {
    let source = MockServer::start().await;
    let s3 = MockServer::start().await;

    // Only a PUT carrying the origin's content type is accepted
    Mock::given(method("PUT"))
        .and(header("content-type", "image/jpeg"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&s3)
        .await;

    Mock::given(method("GET"))
        .and(path("/a/cover.jpg"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(JPEG_BYTES)
                .insert_header("content-type", "image/jpeg"),
        )
        .mount(&source)
        .await;

    let spool = tempfile::tempdir().unwrap();
    let storage = storage_for(&s3, &spool, reqwest::Client::new());

    let result = storage
        .upload_from_url(&format!("{}/a/cover.jpg", source.uri()))
        .await;
    assert!(result.is_ok(), "upload failed: {:?}", result.err());
}

#[tokio::test]
async fn test_missing_source_asset_maps_to_not_found() {
    let source = MockServer::start().await;
    let s3 = MockServer::start().await;
    accept_all_puts(&s3).await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&source)
        .await;

    let spool = tempfile::tempdir().unwrap();
    let storage = storage_for(&s3, &spool, reqwest::Client::new());

    let err = storage
        .upload_from_url(&format!("{}/gone.jpg", source.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err, PlaybillError::NotFound(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_slow_source_maps_to_unavailable() {
    let source = MockServer::start().await;
    let s3 = MockServer::start().await;
    accept_all_puts(&s3).await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(JPEG_BYTES)
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&source)
        .await;

    let http = reqwest::Client::builder()
        .timeout(Duration::from_millis(100))
        .build()
        .unwrap();

    let spool = tempfile::tempdir().unwrap();
    let storage = storage_for(&s3, &spool, http);

    let err = storage
        .upload_from_url(&format!("{}/slow.jpg", source.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err, PlaybillError::Unavailable(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_unreachable_source_maps_to_unavailable() {
    let s3 = MockServer::start().await;
    accept_all_puts(&s3).await;

    let spool = tempfile::tempdir().unwrap();
    let storage = storage_for(&s3, &spool, reqwest::Client::new());

    // nothing listens on port 1
    let err = storage
        .upload_from_url("http://127.0.0.1:1/cover.jpg")
        .await
        .unwrap_err();
    assert!(matches!(err, PlaybillError::Unavailable(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_storage_write_failure_maps_to_upload_failed() {
    let source = MockServer::start().await;
    let s3 = MockServer::start().await;

    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&s3)
        .await;

    Mock::given(method("GET"))
        .and(path("/a/cover.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(JPEG_BYTES))
        .mount(&source)
        .await;

    let spool = tempfile::tempdir().unwrap();
    let storage = storage_for(&s3, &spool, reqwest::Client::new());

    let err = storage
        .upload_from_url(&format!("{}/a/cover.jpg", source.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err, PlaybillError::UploadFailed(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_spool_dir_is_left_empty_after_upload() {
    let source = MockServer::start().await;
    let s3 = MockServer::start().await;
    accept_all_puts(&s3).await;

    Mock::given(method("GET"))
        .and(path("/a/cover.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(JPEG_BYTES))
        .mount(&source)
        .await;

    let spool = tempfile::tempdir().unwrap();
    let storage = storage_for(&s3, &spool, reqwest::Client::new());

    storage
        .upload_from_url(&format!("{}/a/cover.jpg", source.uri()))
        .await
        .unwrap();

    let leftovers: Vec<_> = std::fs::read_dir(spool.path()).unwrap().collect();
    assert!(leftovers.is_empty(), "spool files left behind: {:?}", leftovers);
}
