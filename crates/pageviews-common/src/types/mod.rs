//! Common types used across the pageviews pipeline

use crate::error::{CommonError, Result};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// The single (year, month, day, hour) window one pipeline run processes.
///
/// Accepted textual forms:
///
/// - `20251210-16` (the execution stamp used by the scheduler)
/// - `2025121016`
/// - `20251210-160000` (the stamp embedded in dump file names)
/// - `2025-12-10T16`, `2025-12-10T16:00`, `2025-12-10 16:00:00`
///
/// Minutes and seconds, when present, must be zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TargetHour {
    start: NaiveDateTime,
}

impl TargetHour {
    /// Build a target hour from its components
    pub fn new(year: i32, month: u32, day: u32, hour: u32) -> Result<Self> {
        let label = format!("{year:04}-{month:02}-{day:02}T{hour:02}");
        let date = NaiveDate::from_ymd_opt(year, month, day)
            .ok_or_else(|| CommonError::invalid_hour(&label, "no such calendar date"))?;
        let start = date
            .and_hms_opt(hour, 0, 0)
            .ok_or_else(|| CommonError::invalid_hour(&label, "hour must be between 0 and 23"))?;
        Ok(Self { start })
    }

    /// Build a target hour from a timestamp that sits exactly on an hour boundary
    pub fn from_datetime(value: NaiveDateTime) -> Result<Self> {
        if value.minute() != 0 || value.second() != 0 || value.nanosecond() != 0 {
            return Err(CommonError::invalid_hour(
                &value.to_string(),
                "partial hours are not supported",
            ));
        }
        Ok(Self { start: value })
    }

    pub fn year(&self) -> i32 {
        self.start.year()
    }

    pub fn month(&self) -> u32 {
        self.start.month()
    }

    pub fn day(&self) -> u32 {
        self.start.day()
    }

    pub fn hour(&self) -> u32 {
        self.start.hour()
    }

    /// `YYYYMMDD-HH`, used to namespace per-run artifacts
    pub fn partition_key(&self) -> String {
        self.start.format("%Y%m%d-%H").to_string()
    }

    /// `YYYYMMDD-HH0000`, as embedded in dump file names
    pub fn dump_stamp(&self) -> String {
        self.start.format("%Y%m%d-%H0000").to_string()
    }

    /// Name of the published dump for this hour
    pub fn file_name(&self) -> String {
        format!("pageviews-{}.gz", self.dump_stamp())
    }

    /// `YYYY-MM-DD at HH:00`, the form used in analysis reports
    pub fn window_label(&self) -> String {
        self.start.format("%Y-%m-%d at %H:00").to_string()
    }

    /// `YYYYMMDDHH`, a compact sortable key
    pub fn compact_key(&self) -> String {
        self.start.format("%Y%m%d%H").to_string()
    }

    fn parse_compact(input: &str, date: &str, time: &str) -> Result<Self> {
        let date = NaiveDate::parse_from_str(date, "%Y%m%d")
            .map_err(|e| CommonError::invalid_hour(input, e.to_string()))?;

        if !time.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CommonError::invalid_hour(input, "expected HH or HH0000"));
        }

        let hour = match time.len() {
            2 => time,
            6 if &time[2..] == "0000" => &time[..2],
            6 => {
                return Err(CommonError::invalid_hour(
                    input,
                    "partial hours are not supported",
                ))
            },
            _ => return Err(CommonError::invalid_hour(input, "expected HH or HH0000")),
        };

        Self::from_date_and_hour(input, date, hour)
    }

    fn parse_iso(input: &str, date: &str, time: &str) -> Result<Self> {
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|e| CommonError::invalid_hour(input, e.to_string()))?;

        let mut parts = time.split(':');
        let hour = parts.next().unwrap_or_default();
        for rest in parts {
            if rest.parse::<u32>().ok() != Some(0) {
                return Err(CommonError::invalid_hour(
                    input,
                    "partial hours are not supported",
                ));
            }
        }

        Self::from_date_and_hour(input, date, hour)
    }

    fn from_date_and_hour(input: &str, date: NaiveDate, hour: &str) -> Result<Self> {
        if hour.len() != 2 || !hour.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CommonError::invalid_hour(input, "hour must be two digits"));
        }
        let hour: u32 = hour
            .parse()
            .map_err(|_| CommonError::invalid_hour(input, "hour must be two digits"))?;
        let start = date
            .and_hms_opt(hour, 0, 0)
            .ok_or_else(|| CommonError::invalid_hour(input, "hour must be between 0 and 23"))?;
        Ok(Self { start })
    }
}

impl FromStr for TargetHour {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self> {
        let input = s.trim();

        if let Some((date, time)) = input.split_once(['T', ' ']) {
            return Self::parse_iso(input, date, time);
        }

        if let Some((date, time)) = input.split_once('-') {
            if date.len() == 8 {
                return Self::parse_compact(input, date, time);
            }
        }

        if input.len() == 10 && input.bytes().all(|b| b.is_ascii_digit()) {
            return Self::parse_compact(input, &input[..8], &input[8..]);
        }

        Err(CommonError::invalid_hour(
            input,
            "expected YYYYMMDD-HH, YYYYMMDDHH or YYYY-MM-DDTHH",
        ))
    }
}

impl std::fmt::Display for TargetHour {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.start.format("%Y-%m-%dT%H:00"))
    }
}

impl From<TargetHour> for String {
    fn from(hour: TargetHour) -> Self {
        hour.to_string()
    }
}

impl TryFrom<String> for TargetHour {
    type Error = CommonError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scheduler_stamp() {
        let hour: TargetHour = "20251210-16".parse().unwrap();
        assert_eq!(
            (hour.year(), hour.month(), hour.day(), hour.hour()),
            (2025, 12, 10, 16)
        );
    }

    #[test]
    fn test_accepted_forms_agree() {
        let expected = TargetHour::new(2025, 12, 10, 16).unwrap();
        for input in [
            "20251210-16",
            "2025121016",
            "20251210-160000",
            "2025-12-10T16",
            "2025-12-10T16:00",
            "2025-12-10 16:00:00",
            "  2025-12-10T16  ",
        ] {
            assert_eq!(input.parse::<TargetHour>().unwrap(), expected, "input {input}");
        }
    }

    #[test]
    fn test_rejects_partial_hours() {
        assert!("2025-12-10T16:30".parse::<TargetHour>().is_err());
        assert!("20251210-163000".parse::<TargetHour>().is_err());

        let half_past = NaiveDate::from_ymd_opt(2025, 12, 10)
            .unwrap()
            .and_hms_opt(16, 30, 0)
            .unwrap();
        assert!(TargetHour::from_datetime(half_past).is_err());
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!("20251310-16".parse::<TargetHour>().is_err());
        assert!("20251210-24".parse::<TargetHour>().is_err());
        assert!("2025-12-10".parse::<TargetHour>().is_err());
        assert!("yesterday".parse::<TargetHour>().is_err());
        assert!(TargetHour::new(2025, 2, 30, 0).is_err());
    }

    #[test]
    fn test_renderings() {
        let hour = TargetHour::new(2025, 12, 10, 6).unwrap();
        assert_eq!(hour.partition_key(), "20251210-06");
        assert_eq!(hour.dump_stamp(), "20251210-060000");
        assert_eq!(hour.file_name(), "pageviews-20251210-060000.gz");
        assert_eq!(hour.window_label(), "2025-12-10 at 06:00");
        assert_eq!(hour.compact_key(), "2025121006");
        assert_eq!(hour.to_string(), "2025-12-10T06:00");
    }

    #[test]
    fn test_display_parses_back() {
        let hour = TargetHour::new(2024, 2, 29, 23).unwrap();
        assert_eq!(hour.to_string().parse::<TargetHour>().unwrap(), hour);
    }
}
