//! Raw record validation
//!
//! Turns a [`RawEventRecord`] into a [`NormalizedEvent`] or says why it was dropped.
//! Dates that cannot be read drop the record; they are never replaced by "now".

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::fmt;
use url::Url;

use crate::models::{NormalizedEvent, RawEventRecord, TargetArea};
use crate::utils::normalize_whitespace;

/// Venue used when the upstream gives none
pub const UNKNOWN_VENUE: &str = "TBA";

/// Why a raw record did not become an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    MissingId,
    MissingTitle,
    InvalidDate(String),
}

impl DropReason {
    /// Metric label
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingId => "missing_id",
            Self::MissingTitle => "missing_title",
            Self::InvalidDate(_) => "invalid_date",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingId => write!(f, "missing id"),
            Self::MissingTitle => write!(f, "missing title"),
            Self::InvalidDate(raw) => write!(f, "invalid date '{raw}'"),
        }
    }
}

/// Parse the date forms the upstream is known to emit, as UTC
pub fn parse_event_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Resolve a possibly relative content URL against the upstream base
fn absolute_url(base_url: &str, link: &str) -> Option<String> {
    if let Ok(url) = Url::parse(link) {
        return Some(url.to_string());
    }
    Url::parse(base_url)
        .and_then(|base| base.join(link))
        .ok()
        .map(|url| url.to_string())
}

fn clean(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(normalize_whitespace)
        .filter(|v| !v.is_empty())
}

/// Validate and shape one record for storage
///
/// # Errors
///
/// Returns the [`DropReason`] when the record has no id, no title, or a date that
/// none of the accepted forms can read.
pub fn normalize_record(
    raw: &RawEventRecord,
    area: &TargetArea,
    base_url: &str,
    synced_at: DateTime<Utc>,
) -> Result<NormalizedEvent, DropReason> {
    let external_id = clean(&raw.id).ok_or(DropReason::MissingId)?;
    let title = clean(&raw.title).ok_or(DropReason::MissingTitle)?;

    let raw_date = raw.date.as_deref().unwrap_or_default();
    let event_date =
        parse_event_date(raw_date).ok_or_else(|| DropReason::InvalidDate(raw_date.to_string()))?;

    let venue = clean(&raw.venue_name).unwrap_or_else(|| UNKNOWN_VENUE.to_string());
    let address = clean(&raw.venue_address);
    let lineup: Vec<String> = raw
        .artists
        .iter()
        .map(|a| normalize_whitespace(a))
        .filter(|a| !a.is_empty())
        .collect();

    let description = clean(&raw.description).unwrap_or_else(|| {
        let mut text = format!("Event at {venue}");
        if let Some(address) = &address {
            text.push_str(&format!(", {address}"));
        }
        if !lineup.is_empty() {
            text.push_str(&format!(". Lineup: {}", lineup.join(", ")));
        }
        text
    });

    Ok(NormalizedEvent {
        external_id,
        title,
        description,
        event_date,
        venue,
        city: clean(&raw.area_name).unwrap_or_else(|| area.display_city.clone()),
        country: clean(&raw.country_name).unwrap_or_else(|| area.display_country.clone()),
        lineup,
        image_url: clean(&raw.image_url),
        ticket_url: clean(&raw.content_url).and_then(|link| absolute_url(base_url, &link)),
        synced_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn madrid() -> TargetArea {
        TargetArea::new("madrid", "Madrid", "Spain")
    }

    fn record(id: &str, title: &str, date: &str) -> RawEventRecord {
        RawEventRecord {
            id: Some(id.to_string()),
            title: Some(title.to_string()),
            date: Some(date.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_minimal_record() {
        let now = Utc::now();
        let event = normalize_record(
            &record("ra-1", "Test Night", "2025-04-05T22:00:00Z"),
            &madrid(),
            "https://ra.co",
            now,
        )
        .unwrap();

        assert_eq!(event.external_id, "ra-1");
        assert_eq!(event.city, "Madrid");
        assert_eq!(event.country, "Spain");
        assert_eq!(event.venue, UNKNOWN_VENUE);
        assert_eq!(event.description, "Event at TBA");
        assert_eq!(
            event.event_date,
            Utc.with_ymd_and_hms(2025, 4, 5, 22, 0, 0).unwrap()
        );
        assert_eq!(event.synced_at, now);
        assert!(event.ticket_url.is_none());
    }

    #[test]
    fn test_full_record() {
        let raw = RawEventRecord {
            id: Some("2001".into()),
            title: Some("  Closing   Party ".into()),
            date: Some("2025-04-05T23:00:00.000".into()),
            venue_name: Some("Fabrik".into()),
            venue_address: Some("Av. de la Industria 82".into()),
            area_name: Some("Humanes".into()),
            country_name: None,
            artists: vec!["Ben Klock".into(), "Ben Klock".into(), " ".into()],
            image_url: Some("https://images.ra.co/2001.jpg".into()),
            content_url: Some("/events/2001".into()),
            description: None,
        };

        let event = normalize_record(&raw, &madrid(), "https://ra.co", Utc::now()).unwrap();
        assert_eq!(event.title, "Closing Party");
        assert_eq!(event.city, "Humanes");
        assert_eq!(event.country, "Spain");
        assert_eq!(event.lineup, vec!["Ben Klock", "Ben Klock"]);
        assert_eq!(event.ticket_url.as_deref(), Some("https://ra.co/events/2001"));
        assert_eq!(
            event.description,
            "Event at Fabrik, Av. de la Industria 82. Lineup: Ben Klock, Ben Klock"
        );
    }

    #[test]
    fn test_drop_reasons() {
        let area = madrid();
        let now = Utc::now();

        let mut raw = record("", "Title", "2025-01-01");
        assert_eq!(
            normalize_record(&raw, &area, "https://ra.co", now),
            Err(DropReason::MissingId)
        );

        raw = record("1", "   ", "2025-01-01");
        assert_eq!(
            normalize_record(&raw, &area, "https://ra.co", now),
            Err(DropReason::MissingTitle)
        );

        raw = record("1", "Title", "next friday");
        let err = normalize_record(&raw, &area, "https://ra.co", now).unwrap_err();
        assert_eq!(err, DropReason::InvalidDate("next friday".into()));
        assert_eq!(err.as_str(), "invalid_date");

        raw.date = None;
        assert!(matches!(
            normalize_record(&raw, &area, "https://ra.co", now),
            Err(DropReason::InvalidDate(_))
        ));
    }

    #[test]
    fn test_date_formats() {
        let expected = Utc.with_ymd_and_hms(2025, 4, 5, 22, 0, 0).unwrap();
        assert_eq!(parse_event_date("2025-04-05T22:00:00Z"), Some(expected));
        assert_eq!(parse_event_date("2025-04-06T00:00:00+02:00"), Some(expected));
        assert_eq!(parse_event_date("Sat, 05 Apr 2025 22:00:00 GMT"), Some(expected));
        assert_eq!(parse_event_date("2025-04-05T22:00:00.000"), Some(expected));
        assert_eq!(parse_event_date("2025-04-05 22:00:00"), Some(expected));
        assert_eq!(
            parse_event_date("2025-04-05"),
            Some(Utc.with_ymd_and_hms(2025, 4, 5, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_event_date("05/04/2025"), None);
        assert_eq!(parse_event_date(""), None);
    }

    #[test]
    fn test_absolute_url() {
        assert_eq!(
            absolute_url("https://ra.co", "https://ra.co/events/1").as_deref(),
            Some("https://ra.co/events/1")
        );
        assert_eq!(
            absolute_url("http://127.0.0.1:8080/", "/events/1").as_deref(),
            Some("http://127.0.0.1:8080/events/1")
        );
    }
}
