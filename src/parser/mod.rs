//! Upstream payload extraction
//!
//! Two interchangeable strategies turn an area into raw event records: the RSS
//! feed ([`FeedParser`], tried first) and the GraphQL query endpoint
//! ([`QueryParser`], the fallback). Both fetch through the run's
//! [`ResilientFetcher`], handed in per call so its limiter and cache never outlive
//! the run. A payload that cannot be parsed yields zero records rather than an error.

pub mod feed;
pub mod query;

pub use feed::FeedParser;
pub use query::QueryParser;

use async_trait::async_trait;

use crate::crawler::ResilientFetcher;
use crate::error::Result;
use crate::models::{RawEventRecord, TargetArea};

/// A strategy that produces raw event records for one area
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Short label used in logs and error messages ("feed", "query")
    fn name(&self) -> &'static str;

    /// Fetch and extract the records for `area` through `fetcher`
    ///
    /// # Errors
    ///
    /// Returns `Error::Fetch` once the fetcher has exhausted its attempts. Payloads
    /// that fetch successfully but cannot be parsed return `Ok(vec![])`.
    async fn fetch_events(
        &self,
        fetcher: &ResilientFetcher,
        area: &TargetArea,
    ) -> Result<Vec<RawEventRecord>>;
}

/// Empty text and whitespace-only text count as absent
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
