//! Error types for the pipeline stages
//!
//! Each stage has its own error type so the orchestrator can tell where a run
//! stopped. Data-quality problems in the dump are never errors; the
//! transformer counts and skips them.

use pageviews_common::TargetHour;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Pipeline stage, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetch,
    Extract,
    Transform,
    Load,
    Analyze,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::Extract => "extract",
            Stage::Transform => "transform",
            Stage::Load => "load",
            Stage::Analyze => "analyze",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Dump not published: {url}")]
    NotPublished { url: String },

    #[error("HTTP error {status} from {url}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("Transfer from {url} failed: {source}")]
    Transfer {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Download from {url} produced no data")]
    Empty { url: String },

    #[error("Failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Corrupt or truncated archive {}: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Extracted only {bytes} bytes from {} (expected at least {minimum}); the download is probably truncated", .path.display())]
    TooSmall {
        path: PathBuf,
        bytes: u64,
        minimum: u64,
    },

    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("Failed to open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read input: {0}")]
    Read(#[source] std::io::Error),

    #[error("Failed to write transformed rows: {0}")]
    Write(#[from] csv::Error),

    #[error("Failed to finalize {}: {source}", .path.display())]
    Finalize {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Failed to read transformed rows from {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("No rows loaded for {window}; the load stage did not complete for this hour")]
    EmptyWindow { window: TargetHour },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Failure of a whole pipeline run, tagged with the stage that failed
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("extract failed: {0}")]
    Extract(#[from] ExtractError),

    #[error("transform failed: {0}")]
    Transform(#[from] TransformError),

    #[error("load failed: {0}")]
    Load(#[from] LoadError),

    #[error("analyze failed: {0}")]
    Analyze(#[from] AnalysisError),

    #[error("{stage} task aborted: {reason}")]
    Aborted { stage: Stage, reason: String },
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Fetch(_) => Stage::Fetch,
            PipelineError::Extract(_) => Stage::Extract,
            PipelineError::Transform(_) => Stage::Transform,
            PipelineError::Load(_) => Stage::Load,
            PipelineError::Analyze(_) => Stage::Analyze,
            PipelineError::Aborted { stage, .. } => *stage,
        }
    }

    /// Whether a later attempt can succeed without operator action.
    ///
    /// Only network and database round trips qualify; bad input stays bad.
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::Fetch(e) => !matches!(e, FetchError::Io { .. }),
            PipelineError::Load(LoadError::Database(_)) => true,
            PipelineError::Analyze(AnalysisError::Database(_)) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_error_reports_stage() {
        let err = PipelineError::from(FetchError::NotPublished {
            url: "https://example.org/pageviews-20251210-160000.gz".to_string(),
        });
        assert_eq!(err.stage(), Stage::Fetch);
        assert!(err.to_string().starts_with("fetch failed: Dump not published"));

        let window = TargetHour::new(2025, 12, 10, 16).unwrap();
        let err = PipelineError::from(AnalysisError::EmptyWindow { window });
        assert_eq!(err.stage(), Stage::Analyze);
        assert!(err.to_string().contains("2025-12-10T16:00"));
    }

    #[test]
    fn test_only_transient_failures_are_retryable() {
        let url = "https://example.org/pageviews-20251210-160000.gz".to_string();
        let window = TargetHour::new(2025, 12, 10, 16).unwrap();

        let not_published = PipelineError::from(FetchError::NotPublished { url: url.clone() });
        assert!(not_published.is_retryable());
        let status = PipelineError::from(FetchError::Status {
            url,
            status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
        });
        assert!(status.is_retryable());
        let pool_timeout = PipelineError::from(LoadError::Database(sqlx::Error::PoolTimedOut));
        assert!(pool_timeout.is_retryable());

        let too_small = PipelineError::from(ExtractError::TooSmall {
            path: PathBuf::from("pageviews-20251210-160000"),
            bytes: 10,
            minimum: 1024,
        });
        assert!(!too_small.is_retryable());
        assert!(!PipelineError::from(AnalysisError::EmptyWindow { window }).is_retryable());
        let aborted = PipelineError::Aborted {
            stage: Stage::Transform,
            reason: "panicked".to_string(),
        };
        assert!(!aborted.is_retryable());
    }

    #[test]
    fn test_stage_names() {
        let names: Vec<_> = [
            Stage::Fetch,
            Stage::Extract,
            Stage::Transform,
            Stage::Load,
            Stage::Analyze,
        ]
        .iter()
        .map(Stage::as_str)
        .collect();
        assert_eq!(names, ["fetch", "extract", "transform", "load", "analyze"]);
        assert_eq!(serde_json::to_string(&Stage::Analyze).unwrap(), "\"analyze\"");
    }
}
