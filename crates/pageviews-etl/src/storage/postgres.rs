use super::schema::{CREATE_TABLE, CREATE_WINDOW_INDEX, INSERT_PREFIX, INSERT_SUFFIX};
use super::PageviewStore;
use crate::config::DatabaseConfig;
use crate::models::{window_columns, TitleTotal, TransformedRow};
use async_trait::async_trait;
use pageviews_common::TargetHour;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};
use tracing::debug;

/// PostgreSQL-backed store
#[derive(Debug, Clone)]
pub struct PgPageviewStore {
    pool: PgPool,
}

impl PgPageviewStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str, config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout())
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl PageviewStore for PgPageviewStore {
    fn backend(&self) -> &'static str {
        "postgres"
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

        let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(INSERT_PREFIX);
        query_builder.push_values(rows, |mut b, row| {
            b.push_bind(row.page_title_id)
                .push_bind(&row.page_title)
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
                    WHERE year = $1 AND month = $2 AND day = $3 AND hour = $4
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
            WHERE year = $1 AND month = $2 AND day = $3 AND hour = $4
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
