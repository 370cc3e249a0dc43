//! Resilient HTTP fetcher
//!
//! Wraps a single logical upstream call with:
//! - Response cache lookup and population
//! - Sliding-window rate limiting
//! - Randomized pre-request delay and identity rotation
//! - Retry with class-dependent exponential backoff (`2^n` for generic failures and
//!   429, `3^n` for 401/403 blocks), honoring `Retry-After` on 429

use reqwest::{
    header::{HeaderMap, RETRY_AFTER},
    Client, Method, StatusCode,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::cache::{request_signature, ResponseCache};
use crate::config::{Config, SyncConfig};
use crate::crawler::delay::{pause, DelayPolicy};
use crate::crawler::identity::{
    build_feed_headers, build_query_headers, IdentityPolicy, RequestIdentity,
    RequestIdentityPool,
};
use crate::crawler::limiter::SlidingWindowLimiter;
use crate::metrics;
use crate::utils::error::FetchError;
use crate::utils::retry::{BackoffPolicy, FailureClass};

/// HTTP method of an upstream request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// One logical upstream request
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Short label for logs and metrics ("feed", "query")
    pub endpoint: &'static str,
    pub method: HttpMethod,
    pub url: String,
    /// JSON body for POST requests
    pub body: Option<Value>,
    /// Whether a successful body may be served from / stored in the cache
    pub cacheable: bool,
}

impl FetchRequest {
    /// Cacheable GET request
    pub fn get(endpoint: &'static str, url: impl Into<String>) -> Self {
        Self {
            endpoint,
            method: HttpMethod::Get,
            url: url.into(),
            body: None,
            cacheable: true,
        }
    }

    /// Cacheable JSON POST request
    pub fn post_json(endpoint: &'static str, url: impl Into<String>, body: Value) -> Self {
        Self {
            endpoint,
            method: HttpMethod::Post,
            url: url.into(),
            body: Some(body),
            cacheable: true,
        }
    }

    /// Disable caching for this request
    pub fn uncached(mut self) -> Self {
        self.cacheable = false;
        self
    }

    /// Cache key for this request
    pub fn signature(&self) -> String {
        request_signature(self.method.as_str(), &self.url, self.body.as_ref())
    }
}

/// Successful upstream response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: String,
    /// True when served from the response cache without touching the network
    pub from_cache: bool,
}

/// Why a single attempt failed and how long to wait before the next one
struct AttemptFailure {
    error: FetchError,
    class: FailureClass,
    retry_after: Option<Duration>,
}

/// Upstream fetcher owning the run's limiter and cache
pub struct ResilientFetcher {
    /// HTTP client with configured timeout and compression
    client: Client,

    /// Sliding-window limiter shared by every request of the run
    limiter: SlidingWindowLimiter,

    /// Response cache shared by every request of the run
    cache: ResponseCache,

    identities: Arc<dyn IdentityPolicy>,

    delays: Arc<dyn DelayPolicy>,

    /// Cap for computed backoff and `Retry-After` hints
    max_backoff: Duration,
}

impl ResilientFetcher {
    /// Create a fetcher from configuration with random delays and rotating identities
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created
    pub fn from_config(config: &Config) -> Result<Self, FetchError> {
        let identities = Arc::new(RequestIdentityPool::with_pools(
            &config.upstream.base_url,
            config.upstream.user_agents.clone(),
            Vec::new(),
        ));
        let delays = Arc::new(config.sync.delay_policy());
        Self::with_policies(config, identities, delays)
    }

    /// Create a fetcher from configuration with injected pacing and identity policies
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created
    pub fn with_policies(
        config: &Config,
        identities: Arc<dyn IdentityPolicy>,
        delays: Arc<dyn DelayPolicy>,
    ) -> Result<Self, FetchError> {
        let client = build_client(&config.sync)?;
        Ok(Self::with_client(client, &config.sync, identities, delays))
    }

    /// Create a fetcher around an existing HTTP client
    ///
    /// The limiter and cache are always fresh; only the client (and its cookie jar)
    /// is shared with whoever built it.
    pub fn with_client(
        client: Client,
        sync: &SyncConfig,
        identities: Arc<dyn IdentityPolicy>,
        delays: Arc<dyn DelayPolicy>,
    ) -> Self {
        Self {
            client,
            limiter: sync.limiter(),
            cache: ResponseCache::new(sync.cache_ttl()),
            identities,
            delays,
            max_backoff: sync.max_backoff(),
        }
    }

    /// Fetch with cache, rate limiting and retry
    ///
    /// `max_retries` is the total number of network attempts (at least one). A cache
    /// hit returns immediately without consuming limiter budget or attempts.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::InvalidRequest` for an unparseable URL and
    /// `FetchError::RetriesExhausted` carrying the last error once every attempt failed
    pub async fn fetch(
        &self,
        request: &FetchRequest,
        max_retries: u32,
        base_delay: Duration,
    ) -> Result<FetchResponse, FetchError> {
        let url = Url::parse(&request.url)
            .map_err(|e| FetchError::InvalidRequest(format!("{}: {e}", request.url)))?;

        let attempts = max_retries.max(1);
        let backoff = BackoffPolicy::new(base_delay, self.max_backoff);
        let key = request.signature();
        let mut last_error: Option<FetchError> = None;

        for attempt in 1..=attempts {
            if request.cacheable {
                if let Some(body) = self.cache.get(&key) {
                    tracing::debug!(endpoint = request.endpoint, url = %url, "Serving cached response");
                    metrics::record_cache_hit(request.endpoint);
                    return Ok(FetchResponse {
                        status: StatusCode::OK.as_u16(),
                        body,
                        from_cache: true,
                    });
                }
            }

            self.limiter.acquire().await;
            pause(self.delays.request_delay()).await;
            let identity = self.identities.next();

            tracing::debug!(
                endpoint = request.endpoint,
                url = %url,
                attempt,
                attempts,
                "Sending upstream request"
            );

            let failure = match self.attempt(request, &url, &identity).await {
                Ok((status, body)) => {
                    metrics::record_fetch_attempt(request.endpoint, "success");
                    if request.cacheable {
                        self.cache.put(&key, body.clone());
                    }
                    return Ok(FetchResponse {
                        status,
                        body,
                        from_cache: false,
                    });
                }
                Err(failure) => failure,
            };

            metrics::record_fetch_attempt(request.endpoint, failure.class.as_str());

            let wait = match failure.retry_after {
                Some(hint) => backoff.clamp_hint(hint),
                None => backoff.delay_for(failure.class, attempt) + self.delays.jitter(failure.class),
            };

            if attempt < attempts {
                tracing::warn!(
                    endpoint = request.endpoint,
                    attempt,
                    attempts,
                    class = failure.class.as_str(),
                    wait_secs = wait.as_secs_f64(),
                    error = %failure.error,
                    "Upstream attempt failed, backing off"
                );
                pause(wait).await;
            } else {
                tracing::warn!(
                    endpoint = request.endpoint,
                    attempts,
                    class = failure.class.as_str(),
                    error = %failure.error,
                    "Upstream attempts exhausted"
                );
            }

            last_error = Some(failure.error);
        }

        Err(FetchError::RetriesExhausted {
            attempts,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempt made".to_string()),
        })
    }

    /// Issue one HTTP call and classify the outcome
    async fn attempt(
        &self,
        request: &FetchRequest,
        url: &Url,
        identity: &RequestIdentity,
    ) -> Result<(u16, String), AttemptFailure> {
        let (method, headers) = match request.method {
            HttpMethod::Get => (Method::GET, build_feed_headers(identity)),
            HttpMethod::Post => (
                Method::POST,
                build_query_headers(identity, &url.origin().ascii_serialization()),
            ),
        };

        let mut builder = self.client.request(method, url.clone()).headers(headers);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(transport_failure)?;
        let status = response.status();

        if !status.is_success() {
            let class = FailureClass::from_status(status.as_u16());
            let retry_after = match class {
                FailureClass::RateLimited => retry_after(response.headers()),
                _ => None,
            };
            let error = match class {
                FailureClass::RateLimited => FetchError::RateLimited,
                FailureClass::Blocked => FetchError::Blocked(status.as_u16()),
                FailureClass::Transient => FetchError::Status(status.as_u16()),
            };
            return Err(AttemptFailure {
                error,
                class,
                retry_after,
            });
        }

        let body = response.text().await.map_err(transport_failure)?;
        Ok((status.as_u16(), body))
    }

    /// The run's response cache
    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// The run's rate limiter
    pub fn limiter(&self) -> &SlidingWindowLimiter {
        &self.limiter
    }
}

/// Build the upstream HTTP client with the configured timeout, compression and cookies
///
/// # Errors
///
/// Returns `FetchError::Http` if the TLS backend cannot be initialized
pub fn build_client(sync: &SyncConfig) -> Result<Client, FetchError> {
    Ok(Client::builder()
        .timeout(sync.request_timeout())
        .gzip(true)
        .cookie_store(true)
        .build()?)
}

fn transport_failure(e: reqwest::Error) -> AttemptFailure {
    let error = if e.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Http(e)
    };
    AttemptFailure {
        error,
        class: FailureClass::Transient,
        retry_after: None,
    }
}

/// Parse a delta-seconds `Retry-After` header; HTTP-date values are ignored
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::delay::NoDelay;
    use crate::crawler::identity::FixedIdentity;
    use reqwest::header::HeaderValue;
    use serde_json::json;

    fn test_fetcher() -> ResilientFetcher {
        let mut config = Config::default();
        config.sync.max_requests = 100;
        ResilientFetcher::with_policies(
            &config,
            Arc::new(FixedIdentity::new("test-agent", "https://ra.co/")),
            Arc::new(NoDelay),
        )
        .unwrap()
    }

    #[test]
    fn test_request_signature_matches_cache_signature() {
        let request = FetchRequest::post_json(
            "query",
            "https://ra.co/graphql",
            json!({"variables": {"area": "madrid"}}),
        );
        assert_eq!(
            request.signature(),
            request_signature("POST", "https://ra.co/graphql", request.body.as_ref())
        );
        assert!(request.cacheable);
        assert!(!request.uncached().cacheable);
    }

    #[test]
    fn test_retry_after_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after(&headers), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(7)));

        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(retry_after(&headers), None);
    }

    #[tokio::test]
    async fn test_invalid_url_is_not_retried() {
        let fetcher = test_fetcher();
        let request = FetchRequest::get("feed", "not a url");

        let result = fetcher.fetch(&request, 3, Duration::ZERO).await;
        assert!(matches!(result, Err(FetchError::InvalidRequest(_))));
        assert_eq!(fetcher.limiter().in_window(), 0);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_limiter() {
        let fetcher = test_fetcher();
        let request = FetchRequest::get("feed", "http://127.0.0.1:9/events/madrid/rss");
        fetcher.cache().put(&request.signature(), "<rss/>".to_string());

        let response = fetcher.fetch(&request, 3, Duration::ZERO).await.unwrap();
        assert!(response.from_cache);
        assert_eq!(response.status, 200);
        assert_eq!(response.body, "<rss/>");
        assert_eq!(fetcher.limiter().in_window(), 0);
    }
}
