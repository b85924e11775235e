//! Playbill Common Library
//!
//! Shared types, utilities, and error handling for the Playbill workspace.
//!
//! # Overview
//!
//! This crate provides common functionality used across all Playbill members:
//!
//! - **Error Handling**: The project error type and result alias
//! - **Logging**: Centralized tracing subscriber configuration
//! - **Time Formatting**: Human-readable projections of sync timestamps

pub mod error;
pub mod logging;
pub mod timefmt;

// Re-export commonly used types
pub use error::{PlaybillError, Result};
