pub mod bulk;
pub mod csv;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::Serialize;
use tracing::info;

use crate::model::{HymnRecord, RunResult, RunScope};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Json,
    Csv,
    /// Bulk-import JSON with verses nested under each hymn
    Bulk,
}

impl Format {
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Csv => "csv",
            Format::Bulk => "bulk",
        }
    }
}

#[derive(Serialize)]
struct JsonMeta<'a> {
    scraped_at: DateTime<Utc>,
    total_hymns: usize,
    range: String,
    skipped_ids: &'a [i64],
}

#[derive(Serialize)]
struct JsonDocument<'a> {
    meta: JsonMeta<'a>,
    hymns: &'a [HymnRecord],
}

/// Timestamp used in file names: `2024-05-01T13-45-09`.
pub fn file_timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%dT%H-%M-%S").to_string()
}

pub fn file_name(scope: &RunScope, format: Format, now: DateTime<Utc>) -> String {
    let label = scope.label();
    match format {
        Format::Json => format!("myanmar-hymns-{}-{}.json", label, file_timestamp(now)),
        Format::Csv => format!("myanmar-hymns-{}-{}.csv", label, file_timestamp(now)),
        Format::Bulk => format!("bulk-hymns-{}.json", label),
    }
}

/// Serialize a run into `output_dir` and return the written path.
pub fn write(
    result: &RunResult,
    scope: &RunScope,
    format: Format,
    output_dir: &Path,
    now: DateTime<Utc>,
) -> Result<PathBuf> {
    let path = output_dir.join(file_name(scope, format, now));

    let content = match format {
        Format::Json => serde_json::to_string_pretty(&JsonDocument {
            meta: JsonMeta {
                scraped_at: now,
                total_hymns: result.accepted.len(),
                range: scope.label(),
                skipped_ids: &result.skipped,
            },
            hymns: &result.accepted,
        })?,
        Format::Csv => csv::render_records(&result.accepted),
        Format::Bulk => {
            serde_json::to_string_pretty(&bulk::BulkDocument::from_records(&result.accepted, now))?
        }
    };

    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Wrote {} hymns to {}", result.accepted.len(), path.display());
    Ok(path)
}

pub fn print_summary(result: &RunResult, saved_to: Option<&Path>) {
    println!("\n{}", "=".repeat(50));
    println!("SCRAPING SUMMARY");
    println!("{}", "=".repeat(50));
    println!("Scraped:   {} hymns", result.accepted.len());
    println!("Skipped:   {} hymns", result.skipped.len());
    if !result.skipped.is_empty() {
        println!("  Skipped IDs: {}", join_ids(&result.skipped));
    }
    if let Some(path) = saved_to {
        println!("Saved to:  {}", path.display());
    }
    println!("{}", "=".repeat(50));
}

pub fn join_ids(ids: &[i64]) -> String {
    itertools::join(ids, ", ")
}
