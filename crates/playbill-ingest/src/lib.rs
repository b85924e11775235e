//! Playbill Ingest Library
//!
//! The ingestion pipeline behind the Playbill archive: pulls a radio
//! station's editorial article feed column by column, fetches full article
//! detail, relocates cover images into content-addressed object storage,
//! extracts a normalized excerpt, and idempotently persists the resulting
//! records while tracking a per-column sync checkpoint.
//!
//! # Example
//!
//! ```no_run
//! use playbill_ingest::config::Config;
//! use playbill_ingest::orchestrator::IngestOrchestrator;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let orchestrator = IngestOrchestrator::bootstrap(config).await?;
//!     let outcome = orchestrator.run_column("7", None).await?;
//!     println!("{}", outcome.summary());
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod checkpoint;
pub mod config;
pub mod db;
pub mod excerpt;
pub mod feed;
pub mod orchestrator;
pub mod records;
pub mod storage;

// Re-export commonly used types
pub use playbill_common::{PlaybillError, Result};
