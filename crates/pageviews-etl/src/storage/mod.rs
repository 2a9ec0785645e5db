//! Persistence of transformed rows
//!
//! The loader and the analyzer only see [`PageviewStore`]. PostgreSQL is the
//! production backend; SQLite serves local runs and tests. The backend is
//! picked from the connection URL scheme by [`connect_store`].

mod postgres;
mod schema;
mod sqlite;

pub use postgres::PgPageviewStore;
pub use sqlite::SqlitePageviewStore;

use crate::config::DatabaseConfig;
use crate::models::{TitleTotal, TransformedRow};
use async_trait::async_trait;
use pageviews_common::TargetHour;
use std::sync::Arc;
use tracing::info;

/// Storage of the `wikipedia_pageviews` table
#[async_trait]
pub trait PageviewStore: Send + Sync {
    /// Backend name for logging
    fn backend(&self) -> &'static str;

    /// Create the table and its window index if they do not exist
    async fn ensure_schema(&self) -> Result<(), sqlx::Error>;

    /// Insert rows in a single transaction, ignoring keys already present.
    ///
    /// Returns the number of rows actually inserted.
    async fn insert_batch(&self, rows: &[TransformedRow]) -> Result<u64, sqlx::Error>;

    /// Row count, optionally restricted to one hour window
    async fn count_rows(&self, window: Option<&TargetHour>) -> Result<i64, sqlx::Error>;

    /// Total views per title within one hour window, in no particular order
    async fn window_totals(&self, window: &TargetHour) -> Result<Vec<TitleTotal>, sqlx::Error>;
}

/// Connect to the backend named by the configured URL's scheme
pub async fn connect_store(config: &DatabaseConfig) -> Result<Arc<dyn PageviewStore>, sqlx::Error> {
    let url = config.connection_url();

    let store: Arc<dyn PageviewStore> = if url.starts_with("sqlite:") {
        Arc::new(SqlitePageviewStore::connect(&url, config).await?)
    } else if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        Arc::new(PgPageviewStore::connect(&url, config).await?)
    } else {
        let scheme = url.split(':').next().unwrap_or_default();
        return Err(sqlx::Error::Configuration(
            format!("Unsupported database scheme: {scheme}").into(),
        ));
    };

    info!(backend = store.backend(), "Connected to pageviews store");
    Ok(store)
}
