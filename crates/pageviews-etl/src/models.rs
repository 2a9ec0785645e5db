//! Records flowing between the pipeline stages

use pageviews_common::TargetHour;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Column order of the transformed CSV and of the `wikipedia_pageviews` table
pub const TRANSFORMED_COLUMNS: [&str; 7] = [
    "page_title_id",
    "page_title",
    "pageviews",
    "year",
    "month",
    "day",
    "hour",
];

/// One line of an hourly dump: `<domain_code> <page_title> <view_count> <response_size>`
///
/// Borrows from the line buffer; records that fail the filter are never copied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageviewRecord<'a> {
    pub domain_code: &'a str,
    pub page_title: &'a str,
    pub view_count: u64,
    pub response_size: u64,
}

/// Why a dump line could not be parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedLine {
    FieldCount(usize),
    ViewCount,
    ResponseSize,
    Encoding,
}

impl std::fmt::Display for MalformedLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MalformedLine::FieldCount(n) => write!(f, "expected 4 fields, found {n}"),
            MalformedLine::ViewCount => f.write_str("view count is not a non-negative integer"),
            MalformedLine::ResponseSize => {
                f.write_str("response size is not a non-negative integer")
            },
            MalformedLine::Encoding => f.write_str("line is not valid UTF-8"),
        }
    }
}

impl<'a> PageviewRecord<'a> {
    pub fn parse(line: &'a str) -> Result<Self, MalformedLine> {
        let mut fields = line.split_whitespace();
        let (Some(domain_code), Some(page_title), Some(view_count), Some(response_size), None) = (
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
        ) else {
            return Err(MalformedLine::FieldCount(line.split_whitespace().count()));
        };

        let view_count = view_count
            .parse::<u64>()
            .ok()
            .filter(|count| i64::try_from(*count).is_ok())
            .ok_or(MalformedLine::ViewCount)?;
        let response_size = response_size
            .parse::<u64>()
            .map_err(|_| MalformedLine::ResponseSize)?;

        Ok(Self {
            domain_code,
            page_title,
            view_count,
            response_size,
        })
    }
}

/// A watched title's count for one hour, as written by the transformer and
/// stored by the loader
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformedRow {
    pub page_title_id: i64,
    pub page_title: String,
    pub pageviews: i64,
    pub year: i32,
    pub month: i32,
    pub day: i32,
    pub hour: i32,
}

impl TransformedRow {
    pub fn new(page_title: &str, pageviews: i64, window: &TargetHour) -> Self {
        let (year, month, day, hour) = window_columns(window);
        Self {
            page_title_id: page_title_id(page_title, window),
            page_title: page_title.to_string(),
            pageviews,
            year,
            month,
            day,
            hour,
        }
    }
}

/// Stable key of a (title, hour) pair.
///
/// First 8 bytes of `SHA-256("<title>|<YYYYMMDDHH>")`, sign bit cleared so it
/// fits a signed BIGINT column.
pub fn page_title_id(page_title: &str, window: &TargetHour) -> i64 {
    let digest = Sha256::new()
        .chain_update(page_title.as_bytes())
        .chain_update(b"|")
        .chain_update(window.compact_key().as_bytes())
        .finalize();

    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(prefix) & i64::MAX as u64) as i64
}

/// (year, month, day, hour) as stored in the table's INTEGER columns
pub fn window_columns(window: &TargetHour) -> (i32, i32, i32, i32) {
    // month/day/hour are bounded by the calendar, so the casts cannot truncate
    (
        window.year(),
        window.month() as i32,
        window.day() as i32,
        window.hour() as i32,
    )
}

/// Aggregated views of one title within a window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct TitleTotal {
    pub page_title: String,
    pub total_views: i64,
}

/// Most viewed title for one hour. Recomputed from the table on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisResult {
    pub winning_title: String,
    pub total_views: i64,
    pub time_window: TargetHour,
}

impl AnalysisResult {
    pub fn report_line(&self) -> String {
        format!(
            "Most viewed Wikipedia page: '{}' | Total views: {} | Time window: {}",
            self.winning_title,
            self.total_views,
            self.time_window.window_label()
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn hour() -> TargetHour {
        TargetHour::new(2025, 12, 10, 16).unwrap()
    }

    #[test]
    fn test_parse_dump_line() {
        let record = PageviewRecord::parse("en Amazon 100 500\n").unwrap();
        assert_eq!(record.domain_code, "en");
        assert_eq!(record.page_title, "Amazon");
        assert_eq!(record.view_count, 100);
        assert_eq!(record.response_size, 500);
    }

    #[test]
    fn test_parse_rejects_malformed_lines() {
        assert_eq!(
            PageviewRecord::parse("en Amazon 100"),
            Err(MalformedLine::FieldCount(3))
        );
        assert_eq!(
            PageviewRecord::parse("en Amazon 100 0 extra"),
            Err(MalformedLine::FieldCount(5))
        );
        assert_eq!(PageviewRecord::parse(""), Err(MalformedLine::FieldCount(0)));
        assert_eq!(
            PageviewRecord::parse("en Amazon lots 0"),
            Err(MalformedLine::ViewCount)
        );
        assert_eq!(
            PageviewRecord::parse("en Amazon -5 0"),
            Err(MalformedLine::ViewCount)
        );
        assert_eq!(
            PageviewRecord::parse("en Amazon 18446744073709551615 0"),
            Err(MalformedLine::ViewCount)
        );
        assert_eq!(
            PageviewRecord::parse("en Amazon 5 n/a"),
            Err(MalformedLine::ResponseSize)
        );
    }

    #[test]
    fn test_page_title_id_is_deterministic() {
        let first = page_title_id("Amazon", &hour());
        let second = page_title_id("Amazon", &hour());
        assert_eq!(first, second);
        assert!(first >= 0);
    }

    #[test]
    fn test_page_title_id_depends_on_title_and_window() {
        let next_hour = TargetHour::new(2025, 12, 10, 17).unwrap();
        assert_ne!(page_title_id("Amazon", &hour()), page_title_id("Apple", &hour()));
        assert_ne!(
            page_title_id("Amazon", &hour()),
            page_title_id("Amazon", &next_hour)
        );
    }

    #[test]
    fn test_transformed_row_is_tagged_with_window() {
        let row = TransformedRow::new("Apple", 50, &hour());
        assert_eq!(row.page_title, "Apple");
        assert_eq!(row.pageviews, 50);
        assert_eq!((row.year, row.month, row.day, row.hour), (2025, 12, 10, 16));
    }

    #[test]
    fn test_report_line_format() {
        let result = AnalysisResult {
            winning_title: "Amazon".to_string(),
            total_views: 100,
            time_window: hour(),
        };
        assert_eq!(
            result.report_line(),
            "Most viewed Wikipedia page: 'Amazon' | Total views: 100 | Time window: 2025-12-10 at 16:00"
        );
    }
}
