//! RSS feed strategy
//!
//! The feed is semi-structured and parsed with a handful of regular expressions
//! rather than a full XML parser. Anything that goes wrong here stays here: a bad
//! item is skipped, a bad document is zero records.

use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;

use crate::config::UpstreamConfig;
use crate::crawler::{FetchRequest, ResilientFetcher};
use crate::error::Result;
use crate::models::{RawEventRecord, TargetArea};
use crate::parser::{non_empty, EventSource};
use crate::utils::error::ParseError;
use crate::utils::{decode_xml_entities, normalize_whitespace};

/// Regex patterns for feed extraction
struct FeedPatterns {
    document: Regex,
    item: Regex,
    title: Regex,
    link: Regex,
    guid: Regex,
    pub_date: Regex,
    description: Regex,
    enclosure: Regex,
    cdata: Regex,
    tags: Regex,
    trailing_id: Regex,
}

fn patterns() -> &'static FeedPatterns {
    static PATTERNS: OnceLock<FeedPatterns> = OnceLock::new();

    PATTERNS.get_or_init(|| {
        let field = |tag: &str| {
            Regex::new(&format!(r"(?is)<{tag}\b[^>]*>(.*?)</{tag}>")).expect("Invalid regex pattern")
        };
        FeedPatterns {
            document: Regex::new(r"(?i)<(rss|channel|item)\b").expect("Invalid regex pattern"),
            item: field("item"),
            title: field("title"),
            link: field("link"),
            guid: field("guid"),
            pub_date: field("pubDate"),
            description: field("description"),
            enclosure: Regex::new(r#"(?i)<enclosure\b[^>]*\burl\s*=\s*"([^"]+)""#)
                .expect("Invalid regex pattern"),
            cdata: Regex::new(r"(?s)^\s*<!\[CDATA\[(.*?)\]\]>\s*$").expect("Invalid regex pattern"),
            tags: Regex::new(r"(?s)<[^>]+>").expect("Invalid regex pattern"),
            trailing_id: Regex::new(r"/(\d+)/?$").expect("Invalid regex pattern"),
        }
    })
}

/// Strategy reading `{base}/events/{area}/rss`
pub struct FeedParser {
    upstream: UpstreamConfig,
}

impl FeedParser {
    pub fn new(upstream: UpstreamConfig) -> Self {
        Self { upstream }
    }
}

#[async_trait]
impl EventSource for FeedParser {
    fn name(&self) -> &'static str {
        "feed"
    }

    async fn fetch_events(
        &self,
        fetcher: &ResilientFetcher,
        area: &TargetArea,
    ) -> Result<Vec<RawEventRecord>> {
        let request = FetchRequest::get("feed", self.upstream.feed_url(&area.area_key));
        let response = fetcher
            .fetch(
                &request,
                self.upstream.feed_max_retries,
                self.upstream.feed_base_delay(),
            )
            .await?;

        match parse_feed(&response.body, self.upstream.max_events_per_area) {
            Ok(records) => {
                tracing::debug!(
                    area = %area.area_key,
                    records = records.len(),
                    from_cache = response.from_cache,
                    "Parsed feed"
                );
                Ok(records)
            }
            Err(e) => {
                tracing::warn!(area = %area.area_key, error = %e, "Unreadable feed, treating as empty");
                Ok(Vec::new())
            }
        }
    }
}

/// Extract up to `max_items` records from an RSS document
///
/// # Errors
///
/// Returns `ParseError::Malformed` when the text does not look like RSS at all.
/// Individual items missing a title or an id are skipped.
pub fn parse_feed(xml: &str, max_items: usize) -> std::result::Result<Vec<RawEventRecord>, ParseError> {
    let p = patterns();

    if !p.document.is_match(xml) {
        return Err(ParseError::Malformed("no RSS document found".to_string()));
    }

    let mut records = Vec::new();
    for item in p.item.captures_iter(xml) {
        if records.len() >= max_items {
            break;
        }

        let Some(body) = item.get(1).map(|m| m.as_str()) else {
            continue;
        };

        match parse_item(body) {
            Ok(record) => records.push(record),
            Err(e) => tracing::debug!(error = %e, "Skipping feed item"),
        }
    }

    Ok(records)
}

fn parse_item(item: &str) -> std::result::Result<RawEventRecord, ParseError> {
    let p = patterns();

    let title = non_empty(field_text(&p.title, item).map(|t| normalize_whitespace(&t)))
        .ok_or(ParseError::MissingField("title"))?;
    let link = non_empty(field_text(&p.link, item));
    let guid = non_empty(field_text(&p.guid, item));
    let id = external_id(guid.as_deref(), link.as_deref()).ok_or(ParseError::MissingField("id"))?;

    let description = field_text(&p.description, item)
        .map(|d| normalize_whitespace(&p.tags.replace_all(&d, " ")));

    Ok(RawEventRecord {
        id: Some(id),
        title: Some(title),
        date: non_empty(field_text(&p.pub_date, item)),
        content_url: link,
        description: non_empty(description),
        image_url: p
            .enclosure
            .captures(item)
            .and_then(|c| c.get(1))
            .map(|m| decode_xml_entities(m.as_str())),
        ..Default::default()
    })
}

/// Inner text of the first match of `re`, with CDATA unwrapped or entities decoded
fn field_text(re: &Regex, item: &str) -> Option<String> {
    let raw = re.captures(item)?.get(1)?.as_str();

    match patterns().cdata.captures(raw).and_then(|c| c.get(1)) {
        Some(inner) => Some(inner.as_str().to_string()),
        None => Some(decode_xml_entities(raw)),
    }
}

/// A non-URL guid is the id; otherwise the trailing digits of the link (or guid URL)
fn external_id(guid: Option<&str>, link: Option<&str>) -> Option<String> {
    let is_url = |s: &str| s.starts_with("http://") || s.starts_with("https://");

    if let Some(guid) = guid.filter(|g| !is_url(g)) {
        return Some(guid.to_string());
    }

    [link, guid]
        .into_iter()
        .flatten()
        .find_map(|url| patterns().trailing_id.captures(url))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}
