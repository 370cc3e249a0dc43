use anyhow::{Context, Result};
use std::path::Path;

use eventsync::storage::{EventRepository, EventStatus, SqliteEventRepository};
use eventsync::utils::truncate_text;

pub fn events(db_path: &Path, limit: usize, status: Option<EventStatus>) -> Result<()> {
    let repo = SqliteEventRepository::new(db_path)
        .with_context(|| format!("Failed to open event store: {}", db_path.display()))?;

    let total = repo.count()?;
    let recent = repo.list_recent(limit, status)?;

    match status {
        Some(status) => println!(
            "Synced events, {} only ({} of {total})",
            status.as_str(),
            recent.len()
        ),
        None => println!("Synced events ({} of {total})", recent.len()),
    }
    println!("============================");

    if recent.is_empty() {
        println!("\nNo events synced yet. Run 'eventsync sync' first.");
        return Ok(());
    }

    for (i, row) in recent.iter().enumerate() {
        let event = &row.event;
        println!(
            "{}. {} [{}]",
            i + 1,
            truncate_text(&event.title, 80),
            row.status.as_str()
        );
        println!(
            "   {} | {}, {}, {}",
            event.event_date.format("%Y-%m-%d %H:%M UTC"),
            event.venue,
            event.city,
            event.country
        );
        if !event.lineup.is_empty() {
            println!("   Lineup: {}", truncate_text(&event.lineup.join(", "), 100));
        }
        if let Some(url) = &event.ticket_url {
            println!("   URL: {url}");
        }
        println!(
            "   id: {}  slug: {}  synced: {}",
            event.external_id,
            row.slug,
            event.synced_at.format("%Y-%m-%d %H:%M:%S")
        );
        println!();
    }

    Ok(())
}
