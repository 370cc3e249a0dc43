// Core data structures for the eventsync engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Geographic query unit, used as the upstream's filter key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetArea {
    pub area_key: String,        // upstream filter key, e.g. "madrid"
    pub display_city: String,    // e.g. "Madrid"
    pub display_country: String, // e.g. "Spain"
}

impl TargetArea {
    pub fn new(
        area_key: impl Into<String>,
        display_city: impl Into<String>,
        display_country: impl Into<String>,
    ) -> Self {
        Self {
            area_key: area_key.into(),
            display_city: display_city.into(),
            display_country: display_country.into(),
        }
    }
}

impl fmt::Display for TargetArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_city, self.display_country)
    }
}

/// Parses `key:City:Country` as accepted on the command line
impl FromStr for TargetArea {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.splitn(3, ':').map(str::trim).collect();
        match parts.as_slice() {
            [key, city, country] if !key.is_empty() && !city.is_empty() && !country.is_empty() => {
                Ok(Self::new(*key, *city, *country))
            }
            _ => Err(format!("expected key:City:Country, got '{s}'")),
        }
    }
}

/// Whatever the upstream gave us for one event, before validation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawEventRecord {
    pub id: Option<String>,
    pub title: Option<String>,
    pub date: Option<String>,
    pub venue_name: Option<String>,
    pub venue_address: Option<String>,
    pub area_name: Option<String>,
    pub country_name: Option<String>,
    pub artists: Vec<String>,
    pub image_url: Option<String>,
    pub content_url: Option<String>,
    pub description: Option<String>,
}

/// Validated, storage-ready event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    pub external_id: String,
    pub title: String,
    pub description: String,
    pub event_date: DateTime<Utc>,
    pub venue: String,
    pub city: String,
    pub country: String,
    pub lineup: Vec<String>, // order preserved, duplicates tolerated
    pub image_url: Option<String>,
    pub ticket_url: Option<String>,
    pub synced_at: DateTime<Utc>,
}

/// Result of persisting one normalized event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created { id: i64 },
    Updated { id: i64 },
    Skipped { reason: String },
}

/// Which strategy produced an area's records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordSource {
    Feed,
    Query,
    None,
}

/// Per-area counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaStats {
    pub area: String,
    pub source: RecordSource,
    pub found: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub dropped: usize,
}

impl AreaStats {
    pub fn new(area: &TargetArea) -> Self {
        Self {
            area: area.area_key.clone(),
            source: RecordSource::None,
            found: 0,
            created: 0,
            updated: 0,
            skipped: 0,
            dropped: 0,
        }
    }
}

/// Outcome of exactly one sync run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRunResult {
    pub success: bool,
    pub found: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub dropped: usize,
    pub errors: Vec<String>,
    pub error_count: usize, // before truncation
    pub areas: Vec<AreaStats>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SyncRunResult {
    /// Start accumulating a run
    pub fn start() -> Self {
        let now = Utc::now();
        Self {
            success: false,
            found: 0,
            created: 0,
            updated: 0,
            skipped: 0,
            dropped: 0,
            errors: Vec::new(),
            error_count: 0,
            areas: Vec::new(),
            started_at: now,
            finished_at: now,
        }
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
        self.error_count += 1;
    }

    /// Fold an area's counters into the run totals
    pub fn absorb(&mut self, stats: AreaStats) {
        self.found += stats.found;
        self.created += stats.created;
        self.updated += stats.updated;
        self.skipped += stats.skipped;
        self.dropped += stats.dropped;
        self.areas.push(stats);
    }

    /// Close the run: success means fewer errors than areas attempted
    pub fn finish(mut self, areas_attempted: usize, max_errors: usize) -> Self {
        self.success = self.error_count < areas_attempted;
        self.errors.truncate(max_errors);
        self.finished_at = Utc::now();
        self
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}
