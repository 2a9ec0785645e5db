//! Most-viewed title of an hour, and where the report line goes

use crate::error::AnalysisError;
use crate::layout::ensure_parent;
use crate::models::{AnalysisResult, TitleTotal};
use crate::storage::PageviewStore;
use pageviews_common::TargetHour;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Destination for report lines
pub trait ReportSink: Send + Sync {
    fn name(&self) -> &str;

    fn write_line(&self, line: &str) -> std::io::Result<()>;
}

/// Emits report lines as `tracing` events
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReportSink;

impl ReportSink for LogReportSink {
    fn name(&self) -> &str {
        "log"
    }

    fn write_line(&self, line: &str) -> std::io::Result<()> {
        info!(target: "pageviews_etl::report", "{line}");
        Ok(())
    }
}

/// Appends report lines to a text file, creating it and its parent
/// directories on first use
#[derive(Debug, Clone)]
pub struct FileReportSink {
    path: PathBuf,
}

impl FileReportSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl ReportSink for FileReportSink {
    fn name(&self) -> &str {
        "file"
    }

    fn write_line(&self, line: &str) -> std::io::Result<()> {
        ensure_parent(&self.path)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")
    }
}

/// Find the most viewed title in `hour` and report it to every sink.
///
/// Ties go to the lexicographically smallest title. A sink that fails is
/// logged and skipped; the analysis itself still succeeds.
pub async fn analyze(
    store: &dyn PageviewStore,
    hour: &TargetHour,
    sinks: &[Box<dyn ReportSink>],
) -> Result<AnalysisResult, AnalysisError> {
    info!(target_hour = %hour, backend = store.backend(), "Analyzing window");

    let totals = store.window_totals(hour).await?;
    let winner = pick_winner(totals).ok_or(AnalysisError::EmptyWindow { window: *hour })?;

    let result = AnalysisResult {
        winning_title: winner.page_title,
        total_views: winner.total_views,
        time_window: *hour,
    };

    let line = result.report_line();
    for sink in sinks {
        if let Err(e) = sink.write_line(&line) {
            warn!(sink = sink.name(), error = %e, "Failed to write report line");
        }
    }

    Ok(result)
}

fn pick_winner(totals: Vec<TitleTotal>) -> Option<TitleTotal> {
    totals.into_iter().min_by(|a, b| {
        b.total_views
            .cmp(&a.total_views)
            .then_with(|| a.page_title.cmp(&b.page_title))
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::TransformedRow;
    use crate::storage::SqlitePageviewStore;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    fn hour(h: u32) -> TargetHour {
        TargetHour::new(2025, 12, 10, h).unwrap()
    }

    #[derive(Default, Clone)]
    struct MemorySink {
        lines: Arc<Mutex<Vec<String>>>,
    }

    impl ReportSink for MemorySink {
        fn name(&self) -> &str {
            "memory"
        }

        fn write_line(&self, line: &str) -> std::io::Result<()> {
            self.lines.lock().unwrap().push(line.to_string());
            Ok(())
        }
    }

    struct BrokenSink;

    impl ReportSink for BrokenSink {
        fn name(&self) -> &str {
            "broken"
        }

        fn write_line(&self, _line: &str) -> std::io::Result<()> {
            Err(std::io::Error::other("disk full"))
        }
    }

    async fn store_with(rows: &[TransformedRow]) -> SqlitePageviewStore {
        let store = SqlitePageviewStore::in_memory().await.unwrap();
        store.ensure_schema().await.unwrap();
        store.insert_batch(rows).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_reports_most_viewed_title() {
        let store = store_with(&[
            TransformedRow::new("Amazon", 100, &hour(16)),
            TransformedRow::new("Apple", 50, &hour(16)),
        ])
        .await;
        let sink = MemorySink::default();
        let sinks: Vec<Box<dyn ReportSink>> = vec![Box::new(sink.clone())];

        let result = analyze(&store, &hour(16), &sinks).await.unwrap();

        assert_eq!(result.winning_title, "Amazon");
        assert_eq!(result.total_views, 100);
        assert_eq!(
            *sink.lines.lock().unwrap(),
            vec![
                "Most viewed Wikipedia page: 'Amazon' | Total views: 100 | Time window: 2025-12-10 at 16:00"
                    .to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_window_writes_nothing() {
        let store = store_with(&[TransformedRow::new("Amazon", 100, &hour(16))]).await;
        let sink = MemorySink::default();
        let sinks: Vec<Box<dyn ReportSink>> = vec![Box::new(sink.clone())];

        let err = analyze(&store, &hour(17), &sinks).await.unwrap_err();

        assert!(matches!(err, AnalysisError::EmptyWindow { window } if window == hour(17)));
        assert!(sink.lines.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_other_hours_do_not_count() {
        let store = store_with(&[
            TransformedRow::new("Amazon", 10, &hour(16)),
            TransformedRow::new("Google", 20, &hour(16)),
            TransformedRow::new("Amazon", 5000, &hour(15)),
        ])
        .await;

        let result = analyze(&store, &hour(16), &[]).await.unwrap();

        assert_eq!(result.winning_title, "Google");
        assert_eq!(result.total_views, 20);
    }

    #[tokio::test]
    async fn test_tie_goes_to_smallest_title() {
        let store = store_with(&[
            TransformedRow::new("Microsoft", 42, &hour(16)),
            TransformedRow::new("Facebook", 42, &hour(16)),
            TransformedRow::new("Google", 41, &hour(16)),
        ])
        .await;

        let result = analyze(&store, &hour(16), &[]).await.unwrap();

        assert_eq!(result.winning_title, "Facebook");
    }

    #[tokio::test]
    async fn test_sink_failure_does_not_fail_analysis() {
        let store = store_with(&[TransformedRow::new("Apple", 7, &hour(16))]).await;
        let sink = MemorySink::default();
        let sinks: Vec<Box<dyn ReportSink>> = vec![Box::new(BrokenSink), Box::new(sink.clone())];

        let result = analyze(&store, &hour(16), &sinks).await.unwrap();

        assert_eq!(result.winning_title, "Apple");
        assert_eq!(sink.lines.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_file_sink_appends() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("reports").join("analysis_result.log");
        let sink = FileReportSink::new(&path);

        sink.write_line("first").unwrap();
        sink.write_line("second").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }
}
