//! Error types for the eventsync engine
//!
//! This module defines the per-concern error types used throughout the application.

use thiserror::Error;

/// Errors that can occur during HTTP fetching operations
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP transport error (connection refused, reset, TLS, ...)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Upstream answered 429
    #[error("Rate limited by upstream (429)")]
    RateLimited,

    /// Upstream answered 401/403, treated as a block
    #[error("Blocked by upstream ({0})")]
    Blocked(u16),

    /// Any other non-success status
    #[error("Unexpected status: {0}")]
    Status(u16),

    /// Request timeout
    #[error("Request timeout")]
    Timeout,

    /// Every attempt failed; carries the last observed error
    #[error("Retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// Request could not be built (bad URL, bad header value)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl FetchError {
    /// Whether another attempt could plausibly succeed
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::InvalidRequest(_) | Self::RetriesExhausted { .. })
    }
}

/// Errors that can occur while extracting records from an upstream payload
#[derive(Error, Debug)]
pub enum ParseError {
    /// Payload is not in the expected shape at all
    #[error("Malformed payload: {0}")]
    Malformed(String),

    /// Query endpoint returned an `errors` array
    #[error("Upstream query errors: {0}")]
    QueryErrors(String),

    /// A required field is missing from a record
    #[error("Missing field: {0}")]
    MissingField(&'static str),
}

/// Errors raised by the persistent event store
#[derive(Error, Debug)]
pub enum StoreError {
    /// Underlying SQLite failure
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The human-readable slug is already taken by another row
    #[error("Slug already exists: {0}")]
    SlugConflict(String),

    /// A row with this external id already exists
    #[error("External id already exists: {0}")]
    DuplicateExternalId(String),

    /// Update target does not exist
    #[error("Event not found: {0}")]
    NotFound(i64),

    /// Database file or directory could not be prepared
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Lineup (de)serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Lock poisoned by a panicking writer
    #[error("Store lock poisoned")]
    Poisoned,
}
