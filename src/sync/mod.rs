//! Sync orchestration
//!
//! A [`SyncEngine`] holds what outlives a run: the HTTP client, both parser
//! strategies, the upserter and the pacing policy. Every [`SyncEngine::run_sync`]
//! builds its own [`ResilientFetcher`], so the limiter and response cache start
//! empty on each run. Areas are processed strictly one after another:
//!
//! ```text
//! Idle → FetchingPrimary → (empty? FetchingFallback : Parsed) → Normalizing
//!      → Persisting → Cooldown → (next area | Done)
//! ```
//!
//! Nothing below `run_sync` can abort the run. Fetch failures, unparseable payloads,
//! invalid records and store conflicts become retries, drops, skips or `errors`
//! entries. The only error `run_sync` returns is a configuration error.

pub mod normalize;

pub use normalize::{normalize_record, parse_event_date, DropReason};

use chrono::Utc;
use std::sync::Arc;
use tokio::time::Instant;

use crate::config::{Config, SyncConfig};
use crate::crawler::delay::{pause, DelayPolicy};
use crate::crawler::fetcher::build_client;
use crate::crawler::{IdentityPolicy, RequestIdentityPool, ResilientFetcher};
use crate::error::{Error, Result};
use crate::metrics;
use crate::models::{AreaStats, RawEventRecord, RecordSource, SyncRunResult, TargetArea, UpsertOutcome};
use crate::parser::{EventSource, FeedParser, QueryParser};
use crate::storage::{EventUpserter, SharedEventRepository};

/// Sync engine; reusable across runs
pub struct SyncEngine {
    /// Shared by every run's fetcher
    client: reqwest::Client,

    /// Limiter, cache and backoff settings for each run's fetcher
    sync: SyncConfig,

    identities: Arc<dyn IdentityPolicy>,

    /// Tried first for every area
    primary: Arc<dyn EventSource>,

    /// Tried only when the primary produced nothing
    fallback: Arc<dyn EventSource>,

    upserter: EventUpserter,

    /// Request delay, inter-area cooldown and inter-event pause
    delays: Arc<dyn DelayPolicy>,

    /// Base for resolving relative ticket links
    base_url: String,

    /// Number of error strings kept in the result
    max_errors: usize,
}

impl SyncEngine {
    /// Build an engine with random pacing and rotating identities
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for invalid configuration and `Error::Fetch` if the
    /// HTTP client cannot be created
    pub fn new(config: &Config, repo: SharedEventRepository) -> Result<Self> {
        let identities = Arc::new(RequestIdentityPool::with_pools(
            &config.upstream.base_url,
            config.upstream.user_agents.clone(),
            Vec::new(),
        ));
        let delays = Arc::new(config.sync.delay_policy());
        Self::with_policies(config, repo, identities, delays)
    }

    /// Build an engine whose fetchers and orchestration share the given policies
    ///
    /// # Errors
    ///
    /// Same as [`SyncEngine::new`]
    pub fn with_policies(
        config: &Config,
        repo: SharedEventRepository,
        identities: Arc<dyn IdentityPolicy>,
        delays: Arc<dyn DelayPolicy>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| Error::config(format!("{e:#}")))?;

        let feed = Arc::new(FeedParser::new(config.upstream.clone()));
        let query = Arc::new(QueryParser::new(config.upstream.clone()));

        Self::with_parts(feed, query, repo, identities, delays, config)
    }

    /// Assemble an engine from explicit parts
    ///
    /// # Errors
    ///
    /// Returns `Error::Fetch` if the HTTP client cannot be created
    pub fn with_parts(
        primary: Arc<dyn EventSource>,
        fallback: Arc<dyn EventSource>,
        repo: SharedEventRepository,
        identities: Arc<dyn IdentityPolicy>,
        delays: Arc<dyn DelayPolicy>,
        config: &Config,
    ) -> Result<Self> {
        Ok(Self {
            client: build_client(&config.sync)?,
            sync: config.sync.clone(),
            identities,
            primary,
            fallback,
            upserter: EventUpserter::new(repo),
            delays,
            base_url: config.upstream.base_url.clone(),
            max_errors: config.sync.max_errors_reported,
        })
    }

    /// Fresh fetcher for one run: empty limiter window, empty cache
    fn run_fetcher(&self) -> ResilientFetcher {
        ResilientFetcher::with_client(
            self.client.clone(),
            &self.sync,
            Arc::clone(&self.identities),
            Arc::clone(&self.delays),
        )
    }

    /// Sync every area in order and return the run's result
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when `areas` is empty. Every other failure is
    /// reported inside the returned [`SyncRunResult`].
    pub async fn run_sync(&self, areas: &[TargetArea]) -> Result<SyncRunResult> {
        if areas.is_empty() {
            return Err(Error::config("no target areas to sync"));
        }

        let started = Instant::now();
        let fetcher = self.run_fetcher();
        let mut result = SyncRunResult::start();
        tracing::info!(areas = areas.len(), "Starting sync run");

        for (index, area) in areas.iter().enumerate() {
            tracing::info!(
                area = %area.area_key,
                city = %area.display_city,
                position = index + 1,
                total = areas.len(),
                "Processing area"
            );

            let stats = self.sync_area(&fetcher, area, &mut result).await;
            tracing::info!(
                area = %area.area_key,
                source = ?stats.source,
                found = stats.found,
                created = stats.created,
                updated = stats.updated,
                skipped = stats.skipped,
                dropped = stats.dropped,
                "Area done"
            );
            result.absorb(stats);

            if index + 1 < areas.len() {
                pause(self.delays.area_cooldown()).await;
            }
        }

        let result = result.finish(areas.len(), self.max_errors);
        metrics::observe_sync_duration(started.elapsed().as_secs_f64());

        tracing::info!(
            success = result.success,
            found = result.found,
            created = result.created,
            updated = result.updated,
            skipped = result.skipped,
            dropped = result.dropped,
            errors = result.error_count,
            duration_secs = started.elapsed().as_secs(),
            "Sync run finished"
        );

        Ok(result)
    }

    async fn sync_area(
        &self,
        fetcher: &ResilientFetcher,
        area: &TargetArea,
        result: &mut SyncRunResult,
    ) -> AreaStats {
        let mut stats = AreaStats::new(area);
        let mut failures = Vec::new();

        let mut records = self.fetch_from(fetcher, &self.primary, area, &mut failures).await;
        if !records.is_empty() {
            stats.source = RecordSource::Feed;
        } else {
            tracing::info!(area = %area.area_key, fallback = self.fallback.name(), "Primary source empty, trying fallback");
            records = self.fetch_from(fetcher, &self.fallback, area, &mut failures).await;
            if !records.is_empty() {
                stats.source = RecordSource::Query;
            }
        }

        if records.is_empty() && !failures.is_empty() {
            tracing::error!(area = %area.area_key, "No records and every source failed");
            result.record_error(format!("{}: {}", area.display_city, failures.join("; ")));
        }

        stats.found = records.len();
        let synced_at = Utc::now();
        let mut persisted_any = false;

        for raw in &records {
            let event = match normalize_record(raw, area, &self.base_url, synced_at) {
                Ok(event) => event,
                Err(reason) => {
                    tracing::debug!(area = %area.area_key, id = ?raw.id, %reason, "Dropping record");
                    metrics::record_dropped(reason.as_str());
                    stats.dropped += 1;
                    continue;
                }
            };

            if persisted_any {
                pause(self.delays.event_pause()).await;
            }
            persisted_any = true;

            let upserter = self.upserter.clone();
            let external_id = event.external_id.clone();
            let outcome = tokio::task::spawn_blocking(move || upserter.upsert(&event))
                .await
                .unwrap_or_else(|e| UpsertOutcome::Skipped {
                    reason: format!("upsert task failed: {e}"),
                });

            match outcome {
                UpsertOutcome::Created { .. } => stats.created += 1,
                UpsertOutcome::Updated { .. } => stats.updated += 1,
                UpsertOutcome::Skipped { reason } => {
                    stats.skipped += 1;
                    result.record_error(format!("{}: {external_id}: {reason}", area.display_city));
                }
            }
        }

        stats
    }

    /// Fetch from one source; a failure is remembered and yields no records
    async fn fetch_from(
        &self,
        fetcher: &ResilientFetcher,
        source: &Arc<dyn EventSource>,
        area: &TargetArea,
        failures: &mut Vec<String>,
    ) -> Vec<RawEventRecord> {
        match source.fetch_events(fetcher, area).await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(area = %area.area_key, source = source.name(), error = %e, "Source failed");
                failures.push(format!("{}: {e}", source.name()));
                Vec::new()
            }
        }
    }
}
