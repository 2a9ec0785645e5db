//! Pageviews Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, logging setup, and error handling for the pageviews ETL workspace.
//!
//! - **Types**: [`TargetHour`], the single hour a pipeline run processes
//! - **Logging**: `tracing` subscriber configuration shared by every binary
//! - **Errors**: [`CommonError`] and the [`Result`] alias
//!
//! # Example
//!
//! ```no_run
//! use pageviews_common::TargetHour;
//!
//! fn main() -> pageviews_common::Result<()> {
//!     let hour: TargetHour = "20251210-16".parse()?;
//!     assert_eq!(hour.file_name(), "pageviews-20251210-160000.gz");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;
pub mod types;

pub use error::{CommonError, Result};
pub use types::TargetHour;
