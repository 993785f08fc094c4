use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use itertools::Itertools;
use tracing::info;

use crate::assembler::HymnSource;
use crate::output::{csv, file_timestamp, join_ids};
use crate::runner::RangeRunner;

#[derive(Debug)]
pub enum MergeOutcome {
    /// Every requested id was already in the CSV; nothing scraped or written.
    AlreadyComplete,
    Merged(MergeReport),
}

#[derive(Debug)]
pub struct MergeReport {
    pub existing: usize,
    pub scraped: usize,
    pub skipped: Vec<i64>,
    pub total: usize,
    pub merged_path: PathBuf,
}

/// Accept the CSV as given, or relative to the output dir.
pub fn resolve_csv_path(arg: &Path, output_dir: &Path) -> Result<PathBuf> {
    if arg.is_file() {
        return Ok(arg.to_path_buf());
    }
    let under_output = output_dir.join(arg);
    if under_output.is_file() {
        return Ok(under_output);
    }
    bail!(
        "CSV file not found: {} (also looked in {})",
        arg.display(),
        under_output.display()
    );
}

/// Requested ids not present in the CSV, first occurrence order, deduplicated.
pub fn missing_ids(rows: &[csv::CsvRow], requested: &[i64]) -> Vec<i64> {
    let present: HashSet<i64> = rows.iter().map(|r| r.reference_id).collect();
    requested
        .iter()
        .copied()
        .filter(|id| !present.contains(id))
        .unique()
        .collect()
}

/// `hymns.csv` -> `hymns-merged-2024-05-01T13-45-09.csv`, next to the input.
pub fn merged_path(csv_path: &Path, now: DateTime<Utc>) -> PathBuf {
    let stem = csv_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "hymns".to_string());
    csv_path.with_file_name(format!("{}-merged-{}.csv", stem, file_timestamp(now)))
}

pub async fn run_merge<S: HymnSource>(
    source: &S,
    csv_path: &Path,
    requested: &[i64],
    delay: Duration,
    now: DateTime<Utc>,
    on_progress: Option<&mut dyn FnMut(i64)>,
) -> Result<MergeOutcome> {
    let content = std::fs::read_to_string(csv_path)
        .with_context(|| format!("Failed to read {}", csv_path.display()))?;
    let parsed = csv::parse(&content);
    info!(
        "Read {} existing hymns from {} ({} malformed rows dropped)",
        parsed.rows.len(),
        csv_path.display(),
        parsed.dropped
    );

    let missing = missing_ids(&parsed.rows, requested);
    if missing.is_empty() {
        return Ok(MergeOutcome::AlreadyComplete);
    }
    info!("Scraping {} missing hymn ids: {}", missing.len(), join_ids(&missing));

    let result = RangeRunner::new(source, delay)
        .run_ids(&missing, on_progress)
        .await;

    let existing = parsed.rows.len();
    let scraped = result.accepted.len();
    let mut rows = parsed.rows;
    rows.extend(result.accepted.iter().map(csv::CsvRow::from_record));
    rows.sort_by_key(|r| r.reference_id);

    let merged_path = merged_path(csv_path, now);
    std::fs::write(&merged_path, csv::render(&parsed.header, &rows))
        .with_context(|| format!("Failed to write {}", merged_path.display()))?;

    Ok(MergeOutcome::Merged(MergeReport {
        existing,
        scraped,
        skipped: result.skipped,
        total: rows.len(),
        merged_path,
    }))
}

pub fn print_report(csv_path: &Path, report: &MergeReport) {
    println!("\n{}", "=".repeat(50));
    println!("MERGE SUMMARY");
    println!("{}", "=".repeat(50));
    println!("Input CSV:    {} ({} hymns)", csv_path.display(), report.existing);
    println!("Scraped:      {} hymns", report.scraped);
    println!("Skipped:      {} hymns", report.skipped.len());
    if !report.skipped.is_empty() {
        println!("  Skipped IDs: {}", join_ids(&report.skipped));
    }
    println!(
        "Merged CSV:   {} ({} total hymns)",
        report.merged_path.display(),
        report.total
    );
    println!("{}", "=".repeat(50));

    if !report.skipped.is_empty() {
        println!("\nTo retry skipped IDs, run:");
        println!(
            "  hymn_scraper merge {} {}",
            csv_path.display(),
            report.skipped.iter().join(",")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::FakeSource;
    use crate::model::{sample_record, VerseKind, VerseSegment};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 13, 45, 9).unwrap()
    }

    fn write_existing(dir: &Path, ids: &[i64]) -> PathBuf {
        let records: Vec<_> = ids
            .iter()
            .map(|&id| {
                sample_record(
                    id,
                    vec![VerseSegment {
                        number: Some(1),
                        kind: VerseKind::Verse,
                        text: format!("line one\n\"quoted\" line of {}", id),
                    }],
                )
            })
            .collect();
        let path = dir.join("myanmar-hymns-12-20.csv");
        std::fs::write(&path, csv::render_records(&records)).unwrap();
        path
    }

    fn csv_files(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter(|e| e.as_ref().unwrap().path().extension().is_some_and(|x| x == "csv"))
            .count()
    }

    #[tokio::test]
    async fn complete_csv_scrapes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_existing(dir.path(), &[12, 16, 20]);
        let source = FakeSource::accepting(&[16, 20]);

        for _ in 0..2 {
            let outcome = run_merge(&source, &path, &[16, 20], Duration::ZERO, now(), None)
                .await
                .unwrap();
            assert!(matches!(outcome, MergeOutcome::AlreadyComplete));
        }
        assert!(source.calls.borrow().is_empty());
        assert_eq!(csv_files(dir.path()), 1);
    }

    #[tokio::test]
    async fn missing_ids_are_appended_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_existing(dir.path(), &[12, 20]);
        let source = FakeSource::accepting(&[16]);

        let outcome = run_merge(&source, &path, &[20, 16, 18, 16], Duration::ZERO, now(), None)
            .await
            .unwrap();
        let MergeOutcome::Merged(report) = outcome else {
            panic!("expected a merge");
        };
        assert_eq!(*source.calls.borrow(), vec![16, 18]);
        assert_eq!(report.existing, 2);
        assert_eq!(report.scraped, 1);
        assert_eq!(report.skipped, vec![18]);
        assert_eq!(report.total, 3);
        assert_eq!(
            report.merged_path.file_name().unwrap(),
            "myanmar-hymns-12-20-merged-2024-05-01T13-45-09.csv"
        );

        let merged = csv::parse(&std::fs::read_to_string(&report.merged_path).unwrap());
        let ids: Vec<i64> = merged.rows.iter().map(|r| r.reference_id).collect();
        assert_eq!(ids, vec![12, 16, 20]);
        assert_eq!(merged.rows[0].lyrics, "[Verse 1]\nline one\n\"quoted\" line of 12");
        assert_eq!(merged.header, csv::HEADER);
    }

    #[test]
    fn missing_ids_dedup() {
        let rows = csv::parse(&csv::render_records(&[sample_record(5, vec![])])).rows;
        assert_eq!(missing_ids(&rows, &[5, 7, 7, 9, 5]), vec![7, 9]);
    }

    #[test]
    fn csv_path_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_existing(dir.path(), &[1]);

        assert_eq!(resolve_csv_path(&path, Path::new("/nonexistent")).unwrap(), path);
        assert_eq!(
            resolve_csv_path(Path::new("myanmar-hymns-12-20.csv"), dir.path()).unwrap(),
            path
        );
        assert!(resolve_csv_path(Path::new("nope.csv"), dir.path()).is_err());
    }
}
