//! Common test utilities

use std::sync::Arc;

use eventsync::config::Config;
use eventsync::crawler::{FixedIdentity, NoDelay, ResilientFetcher};
use eventsync::models::TargetArea;
use eventsync::storage::SharedEventRepository;
use eventsync::sync::SyncEngine;

pub const TEST_AGENT: &str = "eventsync-test/1.0";

/// Config pointed at a mock server with no waiting anywhere
pub fn test_config(base_url: &str) -> Config {
    let mut config = Config::default();
    config.upstream.base_url = base_url.to_string();
    config.upstream.feed_base_delay_ms = 0;
    config.upstream.query_base_delay_ms = 0;
    config.sync.max_requests = 100;
    config.sync.request_timeout_secs = 5;
    config
}

/// Fetcher with a fixed identity and zero delays
pub fn test_fetcher(config: &Config) -> ResilientFetcher {
    ResilientFetcher::with_policies(
        config,
        Arc::new(FixedIdentity::new(TEST_AGENT, "http://localhost/")),
        Arc::new(NoDelay),
    )
    .expect("Failed to build fetcher")
}

/// Full engine with a fixed identity and zero delays
pub fn test_engine(config: &Config, repo: SharedEventRepository) -> SyncEngine {
    SyncEngine::with_policies(
        config,
        repo,
        Arc::new(FixedIdentity::new(TEST_AGENT, "http://localhost/")),
        Arc::new(NoDelay),
    )
    .expect("Failed to build engine")
}

pub fn madrid() -> TargetArea {
    TargetArea::new("madrid", "Madrid", "Spain")
}

/// RSS document with one `<item>` per `(guid, title, date)`
pub fn rss_feed(items: &[(&str, &str, &str)]) -> String {
    let items: String = items
        .iter()
        .map(|(guid, title, date)| {
            format!(
                "<item><title><![CDATA[{title}]]></title>\
                 <guid isPermaLink=\"false\">{guid}</guid>\
                 <pubDate>{date}</pubDate></item>"
            )
        })
        .collect();
    format!(
        "<?xml version=\"1.0\"?><rss version=\"2.0\"><channel><title>Events</title>{items}</channel></rss>"
    )
}

/// GraphQL response with one event per `(id, title, date)`
#[allow(dead_code)]
pub fn graphql_events(events: &[(&str, &str, &str)]) -> serde_json::Value {
    let events: Vec<serde_json::Value> = events
        .iter()
        .map(|(id, title, date)| {
            serde_json::json!({
                "id": id,
                "title": title,
                "date": date,
                "contentUrl": format!("/events/{id}"),
                "venue": {"name": "Fabrik", "address": null, "area": {"name": "Madrid", "country": {"name": "Spain"}}},
                "artists": [{"name": "Ben Klock"}]
            })
        })
        .collect();
    serde_json::json!({ "data": { "events": events } })
}
