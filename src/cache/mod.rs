//! Run-scoped response cache
//!
//! Keeps successful upstream payloads in memory for a short TTL so identical calls
//! inside one run never hit the network twice. Nothing is persisted across runs.
//!
//! # Example
//!
//! ```rust
//! use eventsync::cache::{request_signature, ResponseCache};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let cache = ResponseCache::new(Duration::from_secs(1800));
//! let key = request_signature("GET", "https://ra.co/events/madrid/rss", None);
//!
//! cache.put(&key, "<rss/>".to_string());
//! assert_eq!(cache.get(&key).as_deref(), Some("<rss/>"));
//! # }
//! ```

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Deterministic signature of an outbound request: hex SHA-256 over method, URL and body
pub fn request_signature(method: &str, url: &str, body: Option<&Value>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.to_ascii_uppercase().as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    if let Some(body) = body {
        hasher.update(b"\n");
        // serde_json maps are ordered, so this is stable for equal values
        hasher.update(body.to_string().as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// One cached payload
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub payload: String,
    pub stored_at: Instant,
}

/// Cache statistics
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Total cache hits
    pub hits: u64,
    /// Total cache misses (absent or expired)
    pub misses: u64,
}

impl CacheStats {
    /// Calculate hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// In-memory TTL cache keyed by request signature
#[derive(Debug)]
pub struct ResponseCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResponseCache {
    /// Create an empty cache with the given TTL
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Payload for `key` if present and younger than the TTL
    pub fn get(&self, key: &str) -> Option<String> {
        let entries = self.lock();
        let payload = entries
            .get(key)
            .filter(|entry| entry.stored_at.elapsed() < self.ttl)
            .map(|entry| entry.payload.clone());

        match payload {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        payload
    }

    /// Store unconditionally, overwriting any previous entry for `key`
    pub fn put(&self, key: &str, payload: String) {
        let entry = CacheEntry {
            key: key.to_string(),
            payload,
            stored_at: Instant::now(),
        };
        self.lock().insert(key.to_string(), entry);
    }

    /// Drop entries older than the TTL, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.stored_at.elapsed() < self.ttl);
        before - entries.len()
    }

    /// Number of stored entries, expired or not
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_signature_is_deterministic() {
        let body = json!({"query": "q", "variables": {"area": "madrid"}});
        let a = request_signature("POST", "https://ra.co/graphql", Some(&body));
        let b = request_signature("post", "https://ra.co/graphql", Some(&body.clone()));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_signature_depends_on_body_and_url() {
        let madrid = json!({"variables": {"area": "madrid"}});
        let berlin = json!({"variables": {"area": "berlin"}});
        let url = "https://ra.co/graphql";

        assert_ne!(
            request_signature("POST", url, Some(&madrid)),
            request_signature("POST", url, Some(&berlin))
        );
        assert_ne!(
            request_signature("GET", "https://ra.co/events/madrid/rss", None),
            request_signature("GET", "https://ra.co/events/berlin/rss", None)
        );
        assert_ne!(
            request_signature("GET", url, None),
            request_signature("POST", url, None)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_within_ttl() {
        let cache = ResponseCache::new(Duration::from_secs(1800));
        cache.put("k", "payload".to_string());

        tokio::time::advance(Duration::from_secs(1799)).await;
        assert_eq!(cache.get("k").as_deref(), Some("payload"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires() {
        let cache = ResponseCache::new(Duration::from_secs(1800));
        cache.put("k", "payload".to_string());

        tokio::time::advance(Duration::from_secs(1800)).await;
        assert!(cache.get("k").is_none());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_put_overwrites_and_refreshes() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        cache.put("k", "old".to_string());

        tokio::time::advance(Duration::from_secs(50)).await;
        cache.put("k", "new".to_string());

        tokio::time::advance(Duration::from_secs(50)).await;
        assert_eq!(cache.get("k").as_deref(), Some("new"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_stats() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        assert!(cache.get("missing").is_none());
        cache.put("k", "v".to_string());
        assert!(cache.get("k").is_some());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }
}
