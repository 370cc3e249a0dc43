//! Rotating client identities and browser-like headers
//!
//! Each outbound call draws a fresh user-agent and referer so consecutive requests
//! within a run do not share an obvious fingerprint. This is a politeness heuristic,
//! not a security control.

use rand::seq::SliceRandom;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, ORIGIN, REFERER,
    USER_AGENT,
};

/// Pool of realistic User-Agent strings for rotation
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
];

/// Smallest custom user-agent pool worth rotating through
pub const MIN_USER_AGENTS: usize = 5;

/// Referer paths, joined onto the upstream base URL
pub const REFERER_PATHS: &[&str] = &[
    "/",
    "/events",
    "/events/spain",
    "/events/madrid",
    "/events/barcelona",
    "/events/uk/london",
];

/// One client identity used for a single request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestIdentity {
    pub user_agent: String,
    pub referer: String,
}

/// Source of request identities
pub trait IdentityPolicy: Send + Sync {
    /// Identity for the next outbound call
    fn next(&self) -> RequestIdentity;
}

/// Uniform random selection from fixed user-agent and referer pools
#[derive(Debug, Clone)]
pub struct RequestIdentityPool {
    user_agents: Vec<String>,
    referers: Vec<String>,
}

impl RequestIdentityPool {
    /// Build the default pools with referers rooted at `base_url`
    pub fn new(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            user_agents: USER_AGENTS.iter().map(|ua| ua.to_string()).collect(),
            referers: REFERER_PATHS
                .iter()
                .map(|path| format!("{base}{path}"))
                .collect(),
        }
    }

    /// Build from explicit pools; empty pools fall back to the defaults
    pub fn with_pools(base_url: &str, user_agents: Vec<String>, referers: Vec<String>) -> Self {
        let defaults = Self::new(base_url);
        Self {
            user_agents: if user_agents.is_empty() {
                defaults.user_agents
            } else {
                user_agents
            },
            referers: if referers.is_empty() {
                defaults.referers
            } else {
                referers
            },
        }
    }
}

impl IdentityPolicy for RequestIdentityPool {
    fn next(&self) -> RequestIdentity {
        let mut rng = rand::thread_rng();
        RequestIdentity {
            user_agent: self
                .user_agents
                .choose(&mut rng)
                .cloned()
                .unwrap_or_else(|| USER_AGENTS[0].to_string()),
            referer: self.referers.choose(&mut rng).cloned().unwrap_or_default(),
        }
    }
}

/// Always returns the same identity
#[derive(Debug, Clone)]
pub struct FixedIdentity(pub RequestIdentity);

impl FixedIdentity {
    pub fn new(user_agent: &str, referer: &str) -> Self {
        Self(RequestIdentity {
            user_agent: user_agent.to_string(),
            referer: referer.to_string(),
        })
    }
}

impl IdentityPolicy for FixedIdentity {
    fn next(&self) -> RequestIdentity {
        self.0.clone()
    }
}

fn insert_identity(headers: &mut HeaderMap, identity: &RequestIdentity) {
    if let Ok(value) = HeaderValue::from_str(&identity.user_agent) {
        headers.insert(USER_AGENT, value);
    }
    if let Ok(value) = HeaderValue::from_str(&identity.referer) {
        headers.insert(REFERER, value);
    }
}

/// Headers for the feed endpoint (plain browser navigation)
pub fn build_feed_headers(identity: &RequestIdentity) -> HeaderMap {
    let mut headers = HeaderMap::new();

    insert_identity(&mut headers, identity);
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("application/rss+xml, application/xml, text/xml, */*"),
    );
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static("es-ES,es;q=0.9,en;q=0.8"),
    );
    headers.insert(
        HeaderName::from_static("upgrade-insecure-requests"),
        HeaderValue::from_static("1"),
    );

    headers
}

/// Headers for the structured query endpoint (XHR-style JSON POST)
pub fn build_query_headers(identity: &RequestIdentity, origin: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();

    insert_identity(&mut headers, identity);
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static("es-ES,es;q=0.9,en;q=0.8"),
    );
    if let Ok(value) = HeaderValue::from_str(origin) {
        headers.insert(ORIGIN, value);
    }

    headers
}
