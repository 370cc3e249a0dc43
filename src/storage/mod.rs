//! Event persistence
//!
//! [`EventUpserter`] merges normalized events into an [`EventRepository`] keyed by
//! the upstream id. Only a slug collision is retried (once, with a random suffix);
//! every other store failure becomes a `Skipped` outcome carrying the error text.

pub mod repository;

pub use repository::{
    create_mock_repository, create_sqlite_repository, EventRepository, EventStatus,
    MockEventRepository, SharedEventRepository, SqliteEventRepository, StoredEvent,
};

use uuid::Uuid;

use crate::metrics;
use crate::models::{NormalizedEvent, UpsertOutcome};
use crate::utils::error::StoreError;
use crate::utils::{event_slug, MAX_SLUG_LEN};

/// Length of the hex suffix appended to a colliding slug
const SLUG_SUFFIX_LEN: usize = 8;

/// `{slug}-{8 hex}`, keeping the whole thing within [`MAX_SLUG_LEN`]
pub fn disambiguate_slug(slug: &str) -> String {
    let suffix: String = Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(SLUG_SUFFIX_LEN)
        .collect();
    let base: String = slug
        .chars()
        .take(MAX_SLUG_LEN - SLUG_SUFFIX_LEN - 1)
        .collect();
    format!("{}-{suffix}", base.trim_end_matches('-'))
}

/// Create-or-update by external id
#[derive(Clone)]
pub struct EventUpserter {
    repo: SharedEventRepository,
}

impl EventUpserter {
    pub fn new(repo: SharedEventRepository) -> Self {
        Self { repo }
    }

    /// Persist one event, never failing
    pub fn upsert(&self, event: &NormalizedEvent) -> UpsertOutcome {
        let outcome = match self.repo.find_by_external_id(&event.external_id) {
            Ok(Some(existing)) => match self.repo.update(existing.id, event) {
                Ok(()) => UpsertOutcome::Updated { id: existing.id },
                Err(e) => skipped(event, e),
            },
            Ok(None) => self.insert_new(event),
            Err(e) => skipped(event, e),
        };

        let label = match &outcome {
            UpsertOutcome::Created { .. } => "created",
            UpsertOutcome::Updated { .. } => "updated",
            UpsertOutcome::Skipped { .. } => "skipped",
        };
        metrics::record_upsert(label);
        outcome
    }

    fn insert_new(&self, event: &NormalizedEvent) -> UpsertOutcome {
        let slug = event_slug(&event.external_id, &event.title);

        match self.repo.insert(event, &slug) {
            Ok(id) => UpsertOutcome::Created { id },
            Err(StoreError::SlugConflict(_)) => {
                let retry = disambiguate_slug(&slug);
                tracing::debug!(
                    external_id = %event.external_id,
                    slug = %slug,
                    retry = %retry,
                    "Slug taken, retrying with suffix"
                );
                match self.repo.insert(event, &retry) {
                    Ok(id) => UpsertOutcome::Created { id },
                    Err(e) => skipped(event, e),
                }
            }
            Err(e) => skipped(event, e),
        }
    }

    /// The underlying repository
    pub fn repository(&self) -> &SharedEventRepository {
        &self.repo
    }
}

fn skipped(event: &NormalizedEvent, error: StoreError) -> UpsertOutcome {
    tracing::warn!(external_id = %event.external_id, error = %error, "Event skipped");
    UpsertOutcome::Skipped {
        reason: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    fn sample_event(external_id: &str, title: &str) -> NormalizedEvent {
        NormalizedEvent {
            external_id: external_id.to_string(),
            title: title.to_string(),
            description: "Event at TBA".to_string(),
            event_date: Utc.with_ymd_and_hms(2025, 4, 5, 22, 0, 0).unwrap(),
            venue: "TBA".to_string(),
            city: "Madrid".to_string(),
            country: "Spain".to_string(),
            lineup: Vec::new(),
            image_url: None,
            ticket_url: None,
            synced_at: Utc::now(),
        }
    }

    fn upserters() -> Vec<EventUpserter> {
        vec![
            EventUpserter::new(Arc::new(SqliteEventRepository::in_memory().unwrap())),
            EventUpserter::new(create_mock_repository()),
        ]
    }

    #[test]
    fn test_created_then_updated() {
        for upserter in upserters() {
            let event = sample_event("ra-1", "Test Night");

            let id = match upserter.upsert(&event) {
                UpsertOutcome::Created { id } => id,
                other => panic!("expected Created, got {other:?}"),
            };

            let mut changed = event.clone();
            changed.title = "Test Night (Sold Out)".to_string();
            assert_eq!(upserter.upsert(&changed), UpsertOutcome::Updated { id });

            let stored = upserter
                .repository()
                .find_by_external_id("ra-1")
                .unwrap()
                .unwrap();
            assert_eq!(stored.event.title, "Test Night (Sold Out)");
            assert_eq!(stored.slug, "ra-1-test-night");
            assert_eq!(upserter.repository().count().unwrap(), 1);
        }
    }

    #[test]
    fn test_slug_collision_retries_with_suffix() {
        for upserter in upserters() {
            // Occupy the slug the next event would derive
            upserter
                .repository()
                .insert(&sample_event("other", "x"), "ra-2-test-night")
                .unwrap();

            let outcome = upserter.upsert(&sample_event("ra-2", "Test Night"));
            assert!(matches!(outcome, UpsertOutcome::Created { .. }));

            let stored = upserter
                .repository()
                .find_by_external_id("ra-2")
                .unwrap()
                .unwrap();
            assert!(stored.slug.starts_with("ra-2-test-night-"));
            assert_eq!(stored.slug.len(), "ra-2-test-night-".len() + SLUG_SUFFIX_LEN);
        }
    }

    #[test]
    fn test_second_collision_is_skipped() {
        let mock = Arc::new(MockEventRepository::new());
        mock.reject_slugs_starting_with("ra-3-");
        let upserter = EventUpserter::new(mock.clone());

        match upserter.upsert(&sample_event("ra-3", "Test Night")) {
            UpsertOutcome::Skipped { reason } => assert!(reason.contains("Slug already exists")),
            other => panic!("expected Skipped, got {other:?}"),
        }
        assert!(mock.is_empty());
    }

    #[test]
    fn test_disambiguate_slug_bounded() {
        let long = "a".repeat(MAX_SLUG_LEN);
        let slug = disambiguate_slug(&long);
        assert_eq!(slug.chars().count(), MAX_SLUG_LEN);
        assert!(slug[..MAX_SLUG_LEN - SLUG_SUFFIX_LEN - 1]
            .chars()
            .all(|c| c == 'a'));

        let short = disambiguate_slug("1-party");
        assert!(short.starts_with("1-party-"));
        assert!(short["1-party-".len()..]
            .chars()
            .all(|c| c.is_ascii_hexdigit()));
        assert_ne!(disambiguate_slug("1-party"), short);
    }
}
