//! eventsync - Polite event listing sync engine
//!
//! Pulls event listings for a list of areas from an upstream that resists automated
//! access, normalizes them and merges them idempotently into a local event store.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`crawler`] - Rate limiting, pacing, identity rotation and the resilient fetcher
//! - [`cache`] - Run-scoped response cache
//! - [`parser`] - Feed and query extraction strategies
//! - [`sync`] - Normalization and the per-run sync engine
//! - [`storage`] - Event repository (SQLite, mock) and upsert logic
//! - [`models`] - Core data structures and types
//! - [`metrics`] - Prometheus counters
//! - [`utils`] - Common utilities, retry policy and error types
//!
//! # Example
//!
//! ```no_run
//! use eventsync::config::Config;
//! use eventsync::storage::create_sqlite_repository;
//! use eventsync::sync::SyncEngine;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let repo = create_sqlite_repository(&config.database.path)?;
//!     let engine = SyncEngine::new(&config, repo)?;
//!     let result = engine.run_sync(&config.areas).await?;
//!     println!("created {} updated {}", result.created, result.updated);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod crawler;
pub mod error;
pub mod metrics;
pub mod models;
pub mod parser;
pub mod storage;
pub mod sync;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::models::{NormalizedEvent, RawEventRecord, SyncRunResult, TargetArea};
    pub use crate::storage::{EventRepository, SharedEventRepository};
    pub use crate::sync::SyncEngine;
}

// Direct re-exports for convenience
pub use models::{SyncRunResult, TargetArea};
