use anyhow::{Context, Result};
use std::path::PathBuf;

use eventsync::config::Config;
use eventsync::metrics;
use eventsync::models::{SyncRunResult, TargetArea};
use eventsync::storage::create_sqlite_repository;
use eventsync::sync::SyncEngine;

/// Parameters for the sync command
pub struct SyncParams {
    pub config: Config,
    /// Overrides `config.areas` when non-empty
    pub areas: Vec<TargetArea>,
    /// Overrides `config.database.path`
    pub db: Option<PathBuf>,
    pub json: bool,
    pub metrics_file: Option<PathBuf>,
}

/// Run one sync and report it; returns the run's `success` flag
pub async fn sync(params: SyncParams) -> Result<bool> {
    let SyncParams {
        mut config,
        areas,
        db,
        json,
        metrics_file,
    } = params;

    if !areas.is_empty() {
        config.areas = areas;
    }
    if let Some(db) = db {
        config.database.path = db;
    }

    if metrics_file.is_some() {
        metrics::init_metrics().context("Failed to register metrics")?;
    }

    let repo = create_sqlite_repository(&config.database.path).with_context(|| {
        format!(
            "Failed to open event store: {}",
            config.database.path.display()
        )
    })?;
    let engine = SyncEngine::new(&config, repo)?;

    let result = tokio::select! {
        result = engine.run_sync(&config.areas) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, abandoning sync run");
            anyhow::bail!("sync interrupted");
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_summary(&result);
    }

    if let Some(path) = metrics_file {
        std::fs::write(&path, metrics::gather_metrics())
            .with_context(|| format!("Failed to write metrics file: {}", path.display()))?;
        tracing::info!(path = %path.display(), "Metrics written");
    }

    Ok(result.success)
}

fn print_summary(result: &SyncRunResult) {
    println!("\nSync Results");
    println!("============");
    println!(
        "Status:   {}",
        if result.success { "success" } else { "failed" }
    );
    println!("Duration: {}s", result.duration().num_seconds());
    println!("Found:    {}", result.found);
    println!("Created:  {}", result.created);
    println!("Updated:  {}", result.updated);
    println!("Skipped:  {}", result.skipped);
    println!("Dropped:  {}", result.dropped);

    println!("\nPer area:");
    for area in &result.areas {
        println!(
            "  {:<16} source={:<6} found={} created={} updated={} skipped={} dropped={}",
            area.area,
            format!("{:?}", area.source).to_lowercase(),
            area.found,
            area.created,
            area.updated,
            area.skipped,
            area.dropped
        );
    }

    if result.error_count > 0 {
        println!("\nErrors ({}):", result.error_count);
        for error in &result.errors {
            println!("  - {error}");
        }
        if result.error_count > result.errors.len() {
            println!("  ... {} more", result.error_count - result.errors.len());
        }
    }
}
