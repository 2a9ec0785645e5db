//! Runs the five stages for one target hour
//!
//! The runner owns the resolved configuration and the shared collaborators
//! (HTTP client, store, report sinks). Each stage is exposed on its own for
//! orchestrators that schedule stages individually; [`PipelineRunner::run`]
//! chains them with per-stage retries and returns a [`RunRecord`].

use crate::analyze::{analyze, FileReportSink, LogReportSink, ReportSink};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Stage};
use crate::extract::extract;
use crate::fetch::{build_client, fetch};
use crate::layout::RunPaths;
use crate::load::{load, LoadStats};
use crate::models::AnalysisResult;
use crate::storage::PageviewStore;
use crate::transform::{transform, TransformOutput};
use chrono::{DateTime, Utc};
use pageviews_common::TargetHour;
use reqwest::Client;
use serde::Serialize;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    Failed,
}

/// Outcome of one run, handed back to the orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunRecord {
    pub target_hour: TargetHour,
    pub status: RunStatus,
    pub failed_stage: Option<Stage>,
    pub error: Option<String>,
    pub rows_inserted: u64,
    /// Dump lines dropped by the transformer, filtered or malformed
    pub rows_skipped: u64,
    pub report_line: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl RunRecord {
    fn started(target_hour: TargetHour) -> Self {
        let now = Utc::now();
        Self {
            target_hour,
            status: RunStatus::Failed,
            failed_stage: None,
            error: None,
            rows_inserted: 0,
            rows_skipped: 0,
            report_line: None,
            started_at: now,
            completed_at: now,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Succeeded
    }
}

pub struct PipelineRunner {
    config: PipelineConfig,
    client: Client,
    store: Arc<dyn PageviewStore>,
    sinks: Vec<Box<dyn ReportSink>>,
}

impl PipelineRunner {
    /// Runner with the default sinks: the log stream and the configured
    /// report file
    pub fn new(config: PipelineConfig, store: Arc<dyn PageviewStore>) -> reqwest::Result<Self> {
        let client = build_client(&config.source)?;
        let sinks: Vec<Box<dyn ReportSink>> = vec![
            Box::new(LogReportSink),
            Box::new(FileReportSink::new(config.staging.report_file())),
        ];
        Ok(Self {
            config,
            client,
            store,
            sinks,
        })
    }

    pub fn with_sinks(mut self, sinks: Vec<Box<dyn ReportSink>>) -> Self {
        self.sinks = sinks;
        self
    }

    pub fn paths(&self, hour: &TargetHour) -> RunPaths {
        RunPaths::new(
            &self.config.staging.raw_dir(),
            &self.config.staging.staging_dir(),
            hour,
        )
    }

    pub async fn fetch(&self, hour: &TargetHour) -> Result<PathBuf, PipelineError> {
        let paths = self.paths(hour);
        Ok(fetch(&self.client, &self.config.source, hour, &paths.raw_dump).await?)
    }

    pub async fn extract(&self, hour: &TargetHour) -> Result<PathBuf, PipelineError> {
        let paths = self.paths(hour);
        let min_output_bytes = self.config.staging.min_extracted_bytes;
        run_blocking(Stage::Extract, move || {
            extract(&paths.raw_dump, &paths.extracted, min_output_bytes)
        })
        .await
    }

    pub async fn transform(&self, hour: &TargetHour) -> Result<TransformOutput, PipelineError> {
        let paths = self.paths(hour);
        let watch_list = self.config.watch_list.clone();
        let hour = *hour;
        run_blocking(Stage::Transform, move || {
            transform(&paths.extracted, &paths.transformed, &watch_list, &hour)
        })
        .await
    }

    pub async fn load(&self, hour: &TargetHour) -> Result<LoadStats, PipelineError> {
        let paths = self.paths(hour);
        Ok(load(&paths.transformed, self.store.as_ref(), self.config.batch_size).await?)
    }

    pub async fn analyze(&self, hour: &TargetHour) -> Result<AnalysisResult, PipelineError> {
        Ok(analyze(self.store.as_ref(), hour, &self.sinks).await?)
    }

    /// Run every stage in order. Never returns an error; failures are
    /// reported in the record.
    pub async fn run(&self, hour: &TargetHour) -> RunRecord {
        let mut record = RunRecord::started(*hour);
        let span = info_span!("pipeline_run", target_hour = %hour);

        let outcome = self.run_stages(hour, &mut record).instrument(span).await;
        record.completed_at = Utc::now();

        match outcome {
            Ok(()) => {
                record.status = RunStatus::Succeeded;
                info!(
                    target_hour = %hour,
                    rows_inserted = record.rows_inserted,
                    rows_skipped = record.rows_skipped,
                    "Pipeline run succeeded"
                );
                self.cleanup(hour);
            },
            Err(e) => {
                let stage = e.stage();
                error!(target_hour = %hour, %stage, error = %e, "Pipeline run failed");
                record.failed_stage = Some(stage);
                record.error = Some(e.to_string());
            },
        }

        record
    }

    async fn run_stages(
        &self,
        hour: &TargetHour,
        record: &mut RunRecord,
    ) -> Result<(), PipelineError> {
        self.with_retry(Stage::Fetch, move || self.fetch(hour)).await?;
        self.with_retry(Stage::Extract, move || self.extract(hour)).await?;

        let transformed = self
            .with_retry(Stage::Transform, move || self.transform(hour))
            .await?;
        record.rows_skipped = transformed.stats.skipped();

        let loaded = self.with_retry(Stage::Load, move || self.load(hour)).await?;
        record.rows_inserted = loaded.rows_inserted;

        let analysis = self
            .with_retry(Stage::Analyze, move || self.analyze(hour))
            .await?;
        record.report_line = Some(analysis.report_line());

        Ok(())
    }

    async fn with_retry<T, F, Fut>(&self, stage: Stage, mut op: F) -> Result<T, PipelineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        let max_attempts = self.config.retry.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < max_attempts && e.is_retryable() => {
                    warn!(
                        %stage,
                        attempt,
                        max_attempts,
                        error = %e,
                        "Stage failed, retrying in {}s",
                        self.config.retry.delay_secs
                    );
                    tokio::time::sleep(self.config.retry.delay()).await;
                    attempt += 1;
                },
                Err(e) => return Err(e),
            }
        }
    }

    fn cleanup(&self, hour: &TargetHour) {
        if self.config.staging.keep_staging {
            return;
        }
        if let Err(e) = self.paths(hour).clean_staging(self.config.staging.clean_raw) {
            warn!(target_hour = %hour, error = %e, "Failed to clean staging files");
        }
    }
}

/// Run a blocking stage on the blocking pool, keeping the caller's span
async fn run_blocking<T, E, F>(stage: Stage, f: F) -> Result<T, PipelineError>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<PipelineError> + Send + 'static,
{
    let span = Span::current();
    tokio::task::spawn_blocking(move || span.in_scope(f))
        .await
        .map_err(|e| PipelineError::Aborted {
            stage,
            reason: e.to_string(),
        })?
        .map_err(Into::into)
}
