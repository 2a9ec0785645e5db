use super::schema::{CREATE_TABLE, CREATE_WINDOW_INDEX, INSERT_PREFIX, INSERT_SUFFIX};
use super::PageviewStore;
use crate::config::DatabaseConfig;
use crate::models::{window_columns, TitleTotal, TransformedRow};
use async_trait::async_trait;
use pageviews_common::TargetHour;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite};
use std::str::FromStr;
use tracing::debug;

/// SQLite-backed store for local runs and tests
#[derive(Debug, Clone)]
pub struct SqlitePageviewStore {
    pool: SqlitePool,
}

impl SqlitePageviewStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str, config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        if url.contains(":memory:") {
            return Self::in_memory().await;
        }

        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout())
            .connect_with(options)
            .await?;
        Ok(Self::new(pool))
    }

    /// Private in-memory database. A single connection that is never recycled,
    /// since every connection would otherwise see its own empty database.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl PageviewStore for SqlitePageviewStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn ensure_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_WINDOW_INDEX).execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_batch(&self, rows: &[TransformedRow]) -> Result<u64, sqlx::Error> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;

        let mut query_builder: QueryBuilder<Sqlite> = QueryBuilder::new(INSERT_PREFIX);
        query_builder.push_values(rows, |mut b, row| {
            b.push_bind(row.page_title_id)
                .push_bind(row.page_title.as_str())
                .push_bind(row.pageviews)
                .push_bind(row.year)
                .push_bind(row.month)
                .push_bind(row.day)
                .push_bind(row.hour);
        });
        query_builder.push(INSERT_SUFFIX);

        let inserted = query_builder
            .build()
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;

        debug!(rows = rows.len(), inserted, "Committed batch");
        Ok(inserted)
    }

    async fn count_rows(&self, window: Option<&TargetHour>) -> Result<i64, sqlx::Error> {
        match window {
            Some(window) => {
                let (year, month, day, hour) = window_columns(window);
                sqlx::query_scalar::<_, i64>(
                    r#"
                    SELECT COUNT(*) FROM wikipedia_pageviews
                    WHERE year = ?1 AND month = ?2 AND day = ?3 AND hour = ?4
                    "#,
                )
                .bind(year)
                .bind(month)
                .bind(day)
                .bind(hour)
                .fetch_one(&self.pool)
                .await
            },
            None => {
                sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM wikipedia_pageviews")
                    .fetch_one(&self.pool)
                    .await
            },
        }
    }

    async fn window_totals(&self, window: &TargetHour) -> Result<Vec<TitleTotal>, sqlx::Error> {
        let (year, month, day, hour) = window_columns(window);
        sqlx::query_as::<_, TitleTotal>(
            r#"
            SELECT page_title, CAST(SUM(pageviews) AS BIGINT) AS total_views
            FROM wikipedia_pageviews
            WHERE year = ?1 AND month = ?2 AND day = ?3 AND hour = ?4
            GROUP BY page_title
            "#,
        )
        .bind(year)
        .bind(month)
        .bind(day)
        .bind(hour)
        .fetch_all(&self.pool)
        .await
    }
}
