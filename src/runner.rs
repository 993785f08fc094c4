use std::time::Duration;

use anyhow::{bail, Result};
use tracing::info;

use crate::assembler::HymnSource;
use crate::model::RunResult;

/// Reject ranges that would scrape nothing, before any request goes out.
pub fn check_range(start: i64, end: i64) -> Result<()> {
    if start > end {
        bail!("start_id ({}) must be less than or equal to end_id ({})", start, end);
    }
    Ok(())
}

/// Parse "16, 87,102" into ids, rejecting blanks and non-numbers.
pub fn parse_id_list(s: &str) -> Result<Vec<i64>, String> {
    s.split(',')
        .map(|part| {
            let part = part.trim();
            part.parse::<i64>()
                .map_err(|_| format!("'{}' is not a valid hymn id", part))
        })
        .collect()
}

/// Sequential, paced iteration over source ids. Never issues two requests at
/// once; the delay applies between ids, not after the last one.
pub struct RangeRunner<'a, S> {
    source: &'a S,
    delay: Duration,
}

impl<'a, S: HymnSource> RangeRunner<'a, S> {
    pub fn new(source: &'a S, delay: Duration) -> Self {
        Self { source, delay }
    }

    /// Scrape `start..=end`. `on_progress` sees each id right after it is processed.
    pub async fn run(
        &self,
        start: i64,
        end: i64,
        on_progress: Option<&mut dyn FnMut(i64)>,
    ) -> RunResult {
        let ids: Vec<i64> = (start..=end).collect();
        info!("Starting scrape from hymn {} to {}", start, end);
        self.run_ids(&ids, on_progress).await
    }

    pub async fn run_ids(
        &self,
        ids: &[i64],
        mut on_progress: Option<&mut dyn FnMut(i64)>,
    ) -> RunResult {
        info!(
            "Scraping {} hymn ids, {}ms between requests",
            ids.len(),
            self.delay.as_millis()
        );

        let mut result = RunResult::default();
        for (i, &id) in ids.iter().enumerate() {
            match self.source.assemble(id).await {
                Some(record) => result.accepted.push(record),
                None => result.skipped.push(id),
            }

            if let Some(cb) = on_progress.as_deref_mut() {
                cb(id);
            }

            if i + 1 < ids.len() {
                tokio::time::sleep(self.delay).await;
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::{Assembler, FakeSource};
    use crate::config::test_settings;
    use crate::fetch::spawn_test_server;

    #[tokio::test]
    async fn partitions_in_id_order() {
        let source = FakeSource::accepting(&[1, 3, 4]);
        let runner = RangeRunner::new(&source, Duration::ZERO);

        let result = runner.run(1, 5, None).await;
        let accepted: Vec<i64> = result.accepted.iter().map(|r| r.source_id).collect();
        assert_eq!(accepted, vec![1, 3, 4]);
        assert_eq!(result.skipped, vec![2, 5]);
        assert_eq!(*source.calls.borrow(), vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn single_id_range() {
        let source = FakeSource::accepting(&[7]);
        let runner = RangeRunner::new(&source, Duration::ZERO);

        let result = runner.run(7, 7, None).await;
        assert_eq!(result.accepted.len(), 1);
        assert_eq!(*source.calls.borrow(), vec![7]);
    }

    #[tokio::test]
    async fn progress_sees_every_id() {
        let source = FakeSource::accepting(&[]);
        let runner = RangeRunner::new(&source, Duration::ZERO);
        let mut seen = Vec::new();

        let result = runner.run(10, 12, Some(&mut |id: i64| seen.push(id))).await;
        assert_eq!(seen, vec![10, 11, 12]);
        assert_eq!(result.skipped, vec![10, 11, 12]);
    }

    #[tokio::test(start_paused = true)]
    async fn delay_only_between_ids() {
        let source = FakeSource::accepting(&[]);
        let runner = RangeRunner::new(&source, Duration::from_secs(10));

        let t0 = tokio::time::Instant::now();
        runner.run(1, 3, None).await;
        assert_eq!(t0.elapsed(), Duration::from_secs(20));

        let t1 = tokio::time::Instant::now();
        runner.run(7, 7, None).await;
        assert_eq!(t1.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn explicit_id_list_keeps_given_order() {
        let source = FakeSource::accepting(&[87, 16]);
        let runner = RangeRunner::new(&source, Duration::ZERO);

        let result = runner.run_ids(&[87, 5, 16], None).await;
        let accepted: Vec<i64> = result.accepted.iter().map(|r| r.source_id).collect();
        assert_eq!(accepted, vec![87, 16]);
        assert_eq!(result.skipped, vec![5]);
    }

    #[tokio::test]
    async fn not_found_lands_in_skipped() {
        let root = spawn_test_server(|_| (404, Vec::new())).await;
        let dir = tempfile::tempdir().unwrap();
        let assembler = Assembler::new(test_settings(dir.path(), &root)).unwrap();
        let runner = RangeRunner::new(&assembler, Duration::ZERO);

        let result = runner.run(999, 999, None).await;
        assert!(result.accepted.is_empty());
        assert_eq!(result.skipped, vec![999]);
    }

    #[test]
    fn range_checks() {
        assert!(check_range(1, 1).is_ok());
        assert!(check_range(1, 50).is_ok());
        assert!(check_range(5, 4).is_err());
    }

    #[test]
    fn id_lists() {
        assert_eq!(parse_id_list("16,87, 102").unwrap(), vec![16, 87, 102]);
        assert!(parse_id_list("16,abc").is_err());
        assert!(parse_id_list("16,,87").is_err());
        assert!(parse_id_list("").is_err());
    }
}
