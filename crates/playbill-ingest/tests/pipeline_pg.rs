//! Persistence and end-to-end pipeline tests against a real Postgres.
//!
//! Ignored by default; run with a database available:
//!
//! ```text
//! DATABASE_URL=postgresql://localhost/playbill_test cargo test -- --ignored
//! ```

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Utc;
use playbill_ingest::checkpoint::{CheckpointStore, CheckpointUpdate};
use playbill_ingest::config::Config;
use playbill_ingest::feed::FeedClient;
use playbill_ingest::orchestrator::IngestOrchestrator;
use playbill_ingest::records::{ArticleDraft, ArticleStore};
use playbill_ingest::storage::{Storage, StorageConfig};
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

static SEQ: AtomicI64 = AtomicI64::new(0);

/// Natural keys unique across test runs sharing one database.
fn unique_id() -> i64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos() as i64;
    (nanos & 0x7fff_ffff_ffff) + SEQ.fetch_add(1, Ordering::SeqCst)
}

async fn pg_pool() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for ignored tests");
    let pool = PgPoolOptions::new()
        .max_connections(4)
        .connect(&url)
        .await
        .expect("failed to connect to Postgres");
    playbill_ingest::db::migrate(&pool)
        .await
        .expect("failed to migrate schema");
    pool
}

fn draft(id: i64, title: &str) -> ArticleDraft {
    ArticleDraft {
        source_item_id: id,
        column_id: "7".to_string(),
        title: title.to_string(),
        author: Some("editor".to_string()),
        excerpt: Some("a short introduction".to_string()),
        cover_path: "/media/abc.jpg".to_string(),
        tags: vec!["pop".to_string()],
        source_create_date: Some("2026-08-06".to_string()),
        detail: json!({"sourceItemId": id, "title": title}),
    }
}

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn test_upsert_one_is_idempotent_and_preserves_created_at() {
    let store = ArticleStore::new(pg_pool().await);
    let id = unique_id();

    let first = store.upsert_one(&draft(id, "Summer Song")).await.unwrap();
    let second = store.upsert_one(&draft(id, "Summer Song")).await.unwrap();

    assert_eq!(first.source_item_id, second.source_item_id);
    assert_eq!(first.title, second.title);
    assert_eq!(first.created_at, second.created_at);
    assert!(second.last_synced_at >= first.last_synced_at);

    // re-ingestion overwrites fields but never created_at
    let renamed = store.upsert_one(&draft(id, "Summer Song (Remaster)")).await.unwrap();
    assert_eq!(renamed.title, "Summer Song (Remaster)");
    assert_eq!(renamed.created_at, first.created_at);
}

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn test_upsert_many_preserves_input_order() {
    let store = ArticleStore::new(pg_pool().await);
    let base = unique_id();

    // deliberately out of key order
    let drafts = vec![
        draft(base + 2, "third"),
        draft(base, "first"),
        draft(base + 1, "second"),
    ];

    let records = store.upsert_many(&drafts).await.unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].source_item_id, base + 2);
    assert_eq!(records[1].source_item_id, base);
    assert_eq!(records[2].source_item_id, base + 1);
}

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn test_checkpoint_absent_then_roundtrip_and_monotonic() {
    let store = CheckpointStore::new(pg_pool().await);
    let column_id = format!("test-{}", unique_id());

    // never-synced column reads as absent, not as an error
    assert!(store.read(&column_id).await.unwrap().is_none());

    let now = Utc::now();
    store
        .write(&CheckpointUpdate {
            column_id: column_id.clone(),
            column_name: "Test Column".to_string(),
            last_fetch_time: now,
            latest_create_date: "2026-08-06".to_string(),
            latest_item_id: 103,
            fetch_count: 3,
        })
        .await
        .unwrap();

    let first_read = store.read(&column_id).await.unwrap().unwrap();
    assert_eq!(first_read.latest_item_id, 103);
    assert_eq!(first_read.fetch_count, 3);

    // a write carrying an older instant cannot move last_fetch_time backwards
    store
        .write(&CheckpointUpdate {
            column_id: column_id.clone(),
            column_name: "Test Column".to_string(),
            last_fetch_time: now - chrono::Duration::hours(1),
            latest_create_date: "2026-08-05".to_string(),
            latest_item_id: 101,
            fetch_count: 1,
        })
        .await
        .unwrap();

    let second_read = store.read(&column_id).await.unwrap().unwrap();
    assert_eq!(second_read.last_fetch_time, first_read.last_fetch_time);
    assert_eq!(second_read.latest_item_id, 101);
}

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn test_full_run_persists_records_and_advances_checkpoint() {
    let pool = pg_pool().await;
    let upstream = MockServer::start().await;
    let s3 = MockServer::start().await;
    let id = unique_id();
    let column_id = format!("test-{}", unique_id());

    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&s3)
        .await;
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"sourceItemId": id, "createDate": "2026-08-06"}]
        })))
        .mount(&upstream)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/detail/{}", id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sourceItemId": id,
            "title": "Summer Song",
            "createDate": "2026-08-06",
            "cover": {"src": format!("{}/covers/{}.jpg", upstream.uri(), id)},
            "content": "x【歌曲簡介】a warm tune【歌詞】la la",
            "tags": ["pop"]
        })))
        .mount(&upstream)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/covers/{}.jpg", id)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"cover-bytes".as_slice()))
        .mount(&upstream)
        .await;

    let http = reqwest::Client::new();
    let mut config = Config::default();
    config.feed.base_url = upstream.uri();

    let spool = tempfile::tempdir().unwrap();
    let mut storage_config = StorageConfig::for_minio(s3.uri(), "media");
    storage_config.spool_dir = spool.path().to_path_buf();

    let orchestrator = IngestOrchestrator::new(
        config,
        FeedClient::new(http.clone(), upstream.uri()),
        Storage::new(storage_config, http),
        ArticleStore::new(pool.clone()),
        CheckpointStore::new(pool.clone()),
    )
    .unwrap();

    let first = orchestrator.run_column(&column_id, None).await.unwrap();
    assert_eq!(first.records.len(), 1);
    let record = &first.records[0];
    assert_eq!(record.source_item_id, id);
    assert_eq!(record.excerpt.as_deref(), Some("a warm tune"));
    let expected_key = format!("{:x}.jpg", md5::compute(b"cover-bytes"));
    assert_eq!(record.cover_path, format!("/media/{}", expected_key));

    let checkpoint = orchestrator
        .checkpoints()
        .read(&column_id)
        .await
        .unwrap()
        .expect("checkpoint written after successful run");
    assert_eq!(checkpoint.latest_item_id, id);
    assert_eq!(checkpoint.fetch_count, 1);

    // a repeated run converges on the same record without duplicating it
    let second = orchestrator.run_column(&column_id, None).await.unwrap();
    assert_eq!(second.records.len(), 1);
    assert_eq!(second.records[0].created_at, record.created_at);
    assert_eq!(second.records[0].cover_path, record.cover_path);
}
