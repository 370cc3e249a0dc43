//! Repository Pattern for the event store
//!
//! This module provides a trait-based repository abstraction so the upsert logic
//! never touches SQL directly, enabling:
//! - Testing with an in-memory mock that enforces the same uniqueness rules
//! - Swappable storage backends
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                EventUpserter (storage::mod)                 │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  EventRepository trait                      │
//! └─────────────────────────────────────────────────────────────┘
//!                  │                               │
//!                  ▼                               ▼
//!        ┌─────────────────┐             ┌─────────────────┐
//!        │     SQLite      │             │      Mock       │
//!        │  Implementation │             │ Implementation  │
//!        └─────────────────┘             └─────────────────┘
//! ```
//!
//! Rows carry two unique keys: the upstream `external_id` (idempotency) and a
//! human-readable `slug` derived from the title. Only the slug can collide for
//! two different events.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use rusqlite::{params, types::Type, Connection, ErrorCode, OptionalExtension, Row};

use crate::models::NormalizedEvent;
use crate::utils::error::StoreError;

/// Result type for repository operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

// ============================================================================
// Core Types
// ============================================================================

/// Moderation status of a stored event
///
/// Sync only ever writes `Draft`; the other states are set by moderators outside
/// this crate and are preserved across updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    Draft,
    Published,
    Rejected,
}

impl EventStatus {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Draft => "draft",
            EventStatus::Published => "published",
            EventStatus::Rejected => "rejected",
        }
    }
}

impl std::str::FromStr for EventStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "draft" => Ok(EventStatus::Draft),
            "published" => Ok(EventStatus::Published),
            "rejected" => Ok(EventStatus::Rejected),
            other => Err(format!("unknown event status '{other}'")),
        }
    }
}

/// A persisted event row
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEvent {
    pub id: i64,
    pub slug: String,
    pub status: EventStatus,
    pub event: NormalizedEvent,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Repository Trait
// ============================================================================

/// Repository for synced events
pub trait EventRepository: Send + Sync {
    /// Look up a row by the upstream's id
    fn find_by_external_id(&self, external_id: &str) -> StoreResult<Option<StoredEvent>>;

    /// Insert a new `draft` row, returning its primary key
    ///
    /// Fails with `StoreError::SlugConflict` when the slug is taken and
    /// `StoreError::DuplicateExternalId` when the external id is.
    fn insert(&self, event: &NormalizedEvent, slug: &str) -> StoreResult<i64>;

    /// Overwrite the mutable fields of row `id`; slug and status are left alone
    fn update(&self, id: i64, event: &NormalizedEvent) -> StoreResult<()>;

    /// Most recently synced rows first, optionally only those in `status`
    fn list_recent(&self, limit: usize, status: Option<EventStatus>)
        -> StoreResult<Vec<StoredEvent>>;

    /// Count stored events
    fn count(&self) -> StoreResult<usize>;
}

// ============================================================================
// SQLite Implementation
// ============================================================================

/// SQLite implementation of EventRepository
///
/// Uses `Mutex` to ensure thread-safety for the SQLite connection.
pub struct SqliteEventRepository {
    conn: Mutex<Connection>,
}

impl SqliteEventRepository {
    /// Open (or create) the database at `path`
    pub fn new(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();

        // Create parent directory if needed
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let repo = Self {
            conn: Mutex::new(conn),
        };
        repo.create_schema()?;

        tracing::info!(path = %path.display(), "SQLite event store initialized");
        Ok(repo)
    }

    /// Create in-memory repository (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let repo = Self {
            conn: Mutex::new(conn),
        };
        repo.create_schema()?;
        Ok(repo)
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Create database schema
    fn create_schema(&self) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
                CREATE TABLE IF NOT EXISTS events (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    external_id TEXT NOT NULL UNIQUE,
                    slug TEXT NOT NULL UNIQUE,
                    title TEXT NOT NULL,
                    description TEXT NOT NULL,
                    event_date TEXT NOT NULL,
                    venue TEXT NOT NULL,
                    city TEXT NOT NULL,
                    country TEXT NOT NULL,
                    lineup TEXT NOT NULL DEFAULT '[]',
                    image_url TEXT,
                    ticket_url TEXT,
                    status TEXT NOT NULL DEFAULT 'draft',
                    synced_at TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_events_event_date
                    ON events(event_date);

                CREATE INDEX IF NOT EXISTS idx_events_synced_at
                    ON events(synced_at);
                "#,
        )?;

        Ok(())
    }
}

const SELECT_COLUMNS: &str = "id, slug, status, external_id, title, description, event_date, \
     venue, city, country, lineup, image_url, ticket_url, synced_at, created_at, updated_at";

fn parse_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_stored(row: &Row<'_>) -> rusqlite::Result<StoredEvent> {
    let lineup_json: String = row.get(10)?;
    let lineup: Vec<String> = serde_json::from_str(&lineup_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(10, Type::Text, Box::new(e)))?;
    let status: String = row.get(2)?;

    Ok(StoredEvent {
        id: row.get(0)?,
        slug: row.get(1)?,
        status: status.parse().unwrap_or(EventStatus::Draft),
        event: NormalizedEvent {
            external_id: row.get(3)?,
            title: row.get(4)?,
            description: row.get(5)?,
            event_date: parse_timestamp(row, 6)?,
            venue: row.get(7)?,
            city: row.get(8)?,
            country: row.get(9)?,
            lineup,
            image_url: row.get(11)?,
            ticket_url: row.get(12)?,
            synced_at: parse_timestamp(row, 13)?,
        },
        created_at: parse_timestamp(row, 14)?,
        updated_at: parse_timestamp(row, 15)?,
    })
}

/// Map a UNIQUE violation to the key that caused it
fn classify_insert_error(err: rusqlite::Error, event: &NormalizedEvent, slug: &str) -> StoreError {
    if let rusqlite::Error::SqliteFailure(failure, Some(message)) = &err {
        if failure.code == ErrorCode::ConstraintViolation {
            if message.contains("events.slug") {
                return StoreError::SlugConflict(slug.to_string());
            }
            if message.contains("events.external_id") {
                return StoreError::DuplicateExternalId(event.external_id.clone());
            }
        }
    }
    StoreError::Database(err)
}

impl EventRepository for SqliteEventRepository {
    fn find_by_external_id(&self, external_id: &str) -> StoreResult<Option<StoredEvent>> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM events WHERE external_id = ?1"),
                params![external_id],
                row_to_stored,
            )
            .optional()?;

        Ok(record)
    }

    fn insert(&self, event: &NormalizedEvent, slug: &str) -> StoreResult<i64> {
        let lineup = serde_json::to_string(&event.lineup)?;
        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();

        conn.execute(
            r#"
                INSERT INTO events (external_id, slug, title, description, event_date, venue,
                                    city, country, lineup, image_url, ticket_url, status,
                                    synced_at, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)
                "#,
            params![
                event.external_id,
                slug,
                event.title,
                event.description,
                event.event_date.to_rfc3339(),
                event.venue,
                event.city,
                event.country,
                lineup,
                event.image_url,
                event.ticket_url,
                EventStatus::Draft.as_str(),
                event.synced_at.to_rfc3339(),
                now,
            ],
        )
        .map_err(|e| classify_insert_error(e, event, slug))?;

        Ok(conn.last_insert_rowid())
    }

    fn update(&self, id: i64, event: &NormalizedEvent) -> StoreResult<()> {
        let lineup = serde_json::to_string(&event.lineup)?;
        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();

        let changed = conn.execute(
            r#"
                UPDATE events SET
                    title = ?2,
                    description = ?3,
                    event_date = ?4,
                    venue = ?5,
                    city = ?6,
                    country = ?7,
                    lineup = ?8,
                    image_url = ?9,
                    ticket_url = ?10,
                    synced_at = ?11,
                    updated_at = ?12
                WHERE id = ?1
                "#,
            params![
                id,
                event.title,
                event.description,
                event.event_date.to_rfc3339(),
                event.venue,
                event.city,
                event.country,
                lineup,
                event.image_url,
                event.ticket_url,
                event.synced_at.to_rfc3339(),
                now,
            ],
        )?;

        if changed == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    fn list_recent(
        &self,
        limit: usize,
        status: Option<EventStatus>,
    ) -> StoreResult<Vec<StoredEvent>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM events \
             WHERE (?2 IS NULL OR status = ?2) \
             ORDER BY synced_at DESC, id DESC LIMIT ?1"
        ))?;

        let rows = stmt
            .query_map(
                params![limit as i64, status.map(|s| s.as_str())],
                row_to_stored,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
    }

    fn count(&self) -> StoreResult<usize> {
        let conn = self.lock()?;
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        Ok(total as usize)
    }
}

// ============================================================================
// Mock Implementation (for testing)
// ============================================================================

/// In-memory mock implementation of EventRepository
///
/// Enforces the same uniqueness rules as the SQLite store and can be told to
/// reject slugs, which is the only way to provoke a slug collision on demand.
pub struct MockEventRepository {
    rows: RwLock<HashMap<i64, StoredEvent>>,
    rejected_slug_prefixes: RwLock<HashSet<String>>,
    next_id: AtomicI64,
}

impl MockEventRepository {
    /// Create a new mock repository
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            rejected_slug_prefixes: RwLock::new(HashSet::new()),
            next_id: AtomicI64::new(1),
        }
    }

    /// Make every insert whose slug starts with `prefix` fail with a slug conflict
    pub fn reject_slugs_starting_with(&self, prefix: &str) {
        if let Ok(mut prefixes) = self.rejected_slug_prefixes.write() {
            prefixes.insert(prefix.to_string());
        }
    }

    /// Get the number of rows
    pub fn len(&self) -> usize {
        self.rows.read().map(|rows| rows.len()).unwrap_or(0)
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of one row by slug
    pub fn find_by_slug(&self, slug: &str) -> Option<StoredEvent> {
        self.rows
            .read()
            .ok()?
            .values()
            .find(|row| row.slug == slug)
            .cloned()
    }
}

impl Default for MockEventRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl EventRepository for MockEventRepository {
    fn find_by_external_id(&self, external_id: &str) -> StoreResult<Option<StoredEvent>> {
        let rows = self.rows.read().map_err(|_| StoreError::Poisoned)?;
        Ok(rows
            .values()
            .find(|row| row.event.external_id == external_id)
            .cloned())
    }

    fn insert(&self, event: &NormalizedEvent, slug: &str) -> StoreResult<i64> {
        let rejected = self
            .rejected_slug_prefixes
            .read()
            .map_err(|_| StoreError::Poisoned)?
            .iter()
            .any(|prefix| slug.starts_with(prefix.as_str()));

        let mut rows = self.rows.write().map_err(|_| StoreError::Poisoned)?;

        if rows
            .values()
            .any(|row| row.event.external_id == event.external_id)
        {
            return Err(StoreError::DuplicateExternalId(event.external_id.clone()));
        }
        if rejected || rows.values().any(|row| row.slug == slug) {
            return Err(StoreError::SlugConflict(slug.to_string()));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        rows.insert(
            id,
            StoredEvent {
                id,
                slug: slug.to_string(),
                status: EventStatus::Draft,
                event: event.clone(),
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    fn update(&self, id: i64, event: &NormalizedEvent) -> StoreResult<()> {
        let mut rows = self.rows.write().map_err(|_| StoreError::Poisoned)?;
        let row = rows.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        // external_id is the lookup key and never changes
        row.event = NormalizedEvent {
            external_id: row.event.external_id.clone(),
            ..event.clone()
        };
        row.updated_at = Utc::now();
        Ok(())
    }

    fn list_recent(
        &self,
        limit: usize,
        status: Option<EventStatus>,
    ) -> StoreResult<Vec<StoredEvent>> {
        let rows = self.rows.read().map_err(|_| StoreError::Poisoned)?;
        let mut recent: Vec<StoredEvent> = rows
            .values()
            .filter(|row| status.map_or(true, |s| row.status == s))
            .cloned()
            .collect();
        recent.sort_by(|a, b| {
            b.event
                .synced_at
                .cmp(&a.event.synced_at)
                .then(b.id.cmp(&a.id))
        });
        recent.truncate(limit);
        Ok(recent)
    }

    fn count(&self) -> StoreResult<usize> {
        Ok(self.rows.read().map_err(|_| StoreError::Poisoned)?.len())
    }
}

// ============================================================================
// Shared Repository Types
// ============================================================================

/// Thread-safe shared repository wrapper
pub type SharedEventRepository = Arc<dyn EventRepository>;

/// Create a shared SQLite repository
pub fn create_sqlite_repository(path: impl AsRef<Path>) -> StoreResult<SharedEventRepository> {
    let repo = SqliteEventRepository::new(path)?;
    Ok(Arc::new(repo))
}

/// Create a shared mock repository
pub fn create_mock_repository() -> SharedEventRepository {
    Arc::new(MockEventRepository::new())
}

// ============================================================================
// Tests
// ============================================================================
