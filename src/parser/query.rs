//! GraphQL query strategy
//!
//! Fallback for areas whose feed came back empty. The upstream schema is loose:
//! ids arrive as strings or numbers, artists as strings or `{ name }` objects, and
//! the list lives under either `data.events` or `data.popularEvents`.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::UpstreamConfig;
use crate::crawler::{FetchRequest, ResilientFetcher};
use crate::error::Result;
use crate::models::{RawEventRecord, TargetArea};
use crate::parser::{non_empty, EventSource};
use crate::utils::error::ParseError;
use crate::utils::normalize_whitespace;

/// GraphQL document for one page of area events
pub fn events_query(page_size: usize) -> String {
    format!(
        "query GetEvents($area: String!) {{ events(filters: {{ area: $area }}, pageSize: {page_size}) \
         {{ id title date contentUrl flyerFront venue {{ name address area {{ name country {{ name }} }} }} \
         artists {{ name }} }} }}"
    )
}

/// Strategy POSTing to `{base}/graphql`
pub struct QueryParser {
    upstream: UpstreamConfig,
}

impl QueryParser {
    pub fn new(upstream: UpstreamConfig) -> Self {
        Self { upstream }
    }

    /// Request body for `area`; equal areas produce equal bodies, and so equal cache keys
    pub fn request_body(&self, area: &TargetArea) -> Value {
        json!({
            "query": events_query(self.upstream.query_page_size),
            "variables": { "area": area.area_key.to_lowercase() },
        })
    }
}

#[async_trait]
impl EventSource for QueryParser {
    fn name(&self) -> &'static str {
        "query"
    }

    async fn fetch_events(
        &self,
        fetcher: &ResilientFetcher,
        area: &TargetArea,
    ) -> Result<Vec<RawEventRecord>> {
        let request =
            FetchRequest::post_json("query", self.upstream.query_url(), self.request_body(area));
        let response = fetcher
            .fetch(
                &request,
                self.upstream.query_max_retries,
                self.upstream.query_base_delay(),
            )
            .await?;

        match parse_query_response(&response.body) {
            Ok(records) => {
                tracing::debug!(
                    area = %area.area_key,
                    records = records.len(),
                    from_cache = response.from_cache,
                    "Parsed query response"
                );
                Ok(records)
            }
            Err(e) => {
                tracing::warn!(area = %area.area_key, error = %e, "Unusable query response, treating as empty");
                Ok(Vec::new())
            }
        }
    }
}

/// Extract records from a GraphQL response body
///
/// # Errors
///
/// `ParseError::Malformed` for non-JSON or a response without an event list,
/// `ParseError::QueryErrors` when the upstream reported query errors.
pub fn parse_query_response(body: &str) -> std::result::Result<Vec<RawEventRecord>, ParseError> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| ParseError::Malformed(e.to_string()))?;

    if let Some(errors) = value.get("errors").and_then(Value::as_array) {
        if !errors.is_empty() {
            let messages: Vec<String> = errors
                .iter()
                .map(|e| {
                    e.get("message")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| e.to_string())
                })
                .collect();
            return Err(ParseError::QueryErrors(messages.join("; ")));
        }
    }

    let data = value
        .get("data")
        .ok_or_else(|| ParseError::Malformed("missing data".to_string()))?;
    let events = data
        .get("events")
        .or_else(|| data.get("popularEvents"))
        .and_then(Value::as_array)
        .ok_or_else(|| ParseError::Malformed("missing events list".to_string()))?;

    Ok(events.iter().filter_map(record_from_value).collect())
}

fn record_from_value(event: &Value) -> Option<RawEventRecord> {
    let event = event.as_object()?;
    let venue = event.get("venue");
    let area = venue.and_then(|v| v.get("area"));

    let artists = event
        .get("artists")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(|a| scalar_text(a).or_else(|| a.get("name").and_then(scalar_text)))
                .map(|name| normalize_whitespace(&name))
                .filter(|name| !name.is_empty())
                .collect()
        })
        .unwrap_or_default();

    Some(RawEventRecord {
        id: event.get("id").and_then(scalar_text),
        title: event.get("title").and_then(scalar_text),
        date: event.get("date").and_then(scalar_text),
        venue_name: venue.and_then(|v| v.get("name")).and_then(scalar_text),
        venue_address: venue.and_then(|v| v.get("address")).and_then(scalar_text),
        area_name: area.and_then(|a| a.get("name")).and_then(scalar_text),
        country_name: area
            .and_then(|a| a.get("country"))
            .and_then(|c| c.get("name"))
            .and_then(scalar_text),
        artists,
        image_url: event.get("flyerFront").and_then(scalar_text),
        content_url: event.get("contentUrl").and_then(scalar_text),
        description: None,
    })
}

/// Strings and numbers as text; anything else is absent
fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    non_empty(Some(text))
}
