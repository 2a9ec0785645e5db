//! Wikipedia Pageviews ETL
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Batch pipeline for one hour of Wikipedia pageview counts:
//!
//! 1. [`fetch`]: stream the hourly gzip dump to disk
//! 2. [`extract`]: decompress it to plain text
//! 3. [`transform`]: keep English rows for the watched titles, tagged with the hour
//! 4. [`load`]: insert them idempotently into `wikipedia_pageviews`
//! 5. [`analyze`]: report the most viewed title of the hour
//!
//! [`PipelineRunner`] chains the stages with retries and returns a
//! [`RunRecord`] for the orchestrator.
//!
//! # Example
//!
//! ```no_run
//! use pageviews_etl::{connect_store, PipelineConfig, PipelineRunner};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PipelineConfig::default();
//!     let store = connect_store(&config.database).await?;
//!     let runner = PipelineRunner::new(config, store)?;
//!
//!     let record = runner.run(&"20251210-16".parse()?).await;
//!     println!("{}", serde_json::to_string_pretty(&record)?);
//!     Ok(())
//! }
//! ```

pub mod analyze;
pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod layout;
pub mod load;
pub mod models;
pub mod pipeline;
pub mod storage;
pub mod transform;
pub mod watch_list;

pub use analyze::{FileReportSink, LogReportSink, ReportSink};
pub use config::{DatabaseConfig, DumpLayout, PipelineConfig, RetryConfig, SourceConfig, StagingConfig};
pub use error::{AnalysisError, ExtractError, FetchError, LoadError, PipelineError, Stage, TransformError};
pub use layout::RunPaths;
pub use load::LoadStats;
pub use models::{AnalysisResult, TransformedRow};
pub use pipeline::{PipelineRunner, RunRecord, RunStatus};
pub use storage::{connect_store, PageviewStore};
pub use transform::{TransformOutput, TransformStats};
pub use watch_list::WatchList;
