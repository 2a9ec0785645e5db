//! DDL shared by both backends

pub(crate) const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS wikipedia_pageviews (
        page_title_id BIGINT PRIMARY KEY,
        page_title TEXT NOT NULL,
        pageviews BIGINT NOT NULL,
        year INTEGER NOT NULL,
        month INTEGER NOT NULL,
        day INTEGER NOT NULL,
        hour INTEGER NOT NULL
    )
"#;

pub(crate) const CREATE_WINDOW_INDEX: &str = r#"
    CREATE INDEX IF NOT EXISTS idx_wikipedia_pageviews_window
        ON wikipedia_pageviews (year, month, day, hour)
"#;

pub(crate) const INSERT_PREFIX: &str =
    "INSERT INTO wikipedia_pageviews (page_title_id, page_title, pageviews, year, month, day, hour) ";

pub(crate) const INSERT_SUFFIX: &str = " ON CONFLICT (page_title_id) DO NOTHING";
