//! Filter a decompressed dump down to the watched English titles

use crate::error::TransformError;
use crate::layout::{discard_part, ensure_parent, part_path};
use crate::models::{MalformedLine, PageviewRecord, TransformedRow, TRANSFORMED_COLUMNS};
use crate::watch_list::WatchList;
use pageviews_common::TargetHour;
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Only the primary English Wikipedia counts
pub const PRIMARY_DOMAIN: &str = "en";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransformStats {
    pub lines_read: u64,
    pub rows_written: u64,
    /// Well-formed lines outside the domain or the watch-list
    pub filtered: u64,
    pub malformed: u64,
}

impl TransformStats {
    pub fn skipped(&self) -> u64 {
        self.filtered + self.malformed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransformOutput {
    pub path: PathBuf,
    pub stats: TransformStats,
}

/// Stream `input` line by line and write the surviving rows to `output` as CSV
pub fn transform(
    input: &Path,
    output: &Path,
    watch_list: &WatchList,
    hour: &TargetHour,
) -> Result<TransformOutput, TransformError> {
    info!(
        input = %input.display(),
        output = %output.display(),
        watched = watch_list.len(),
        target_hour = %hour,
        "Transforming dump"
    );

    let file = File::open(input).map_err(|source| TransformError::Open {
        path: input.to_path_buf(),
        source,
    })?;
    let finalize_err = |source| TransformError::Finalize {
        path: output.to_path_buf(),
        source,
    };
    ensure_parent(output).map_err(finalize_err)?;

    let part = part_path(output);
    let stats = match write_part(file, &part, watch_list, hour) {
        Ok(stats) => stats,
        Err(e) => {
            discard_part(&part);
            return Err(e);
        },
    };
    std::fs::rename(&part, output).map_err(finalize_err)?;

    info!(
        lines_read = stats.lines_read,
        rows_written = stats.rows_written,
        filtered = stats.filtered,
        malformed = stats.malformed,
        "Transform complete"
    );

    Ok(TransformOutput {
        path: output.to_path_buf(),
        stats,
    })
}

fn write_part(
    input: File,
    part: &Path,
    watch_list: &WatchList,
    hour: &TargetHour,
) -> Result<TransformStats, TransformError> {
    let writer = File::create(part).map_err(|source| TransformError::Finalize {
        path: part.to_path_buf(),
        source,
    })?;
    let stats = transform_reader(BufReader::new(input), &writer, watch_list, hour)?;
    writer.sync_all().map_err(|source| TransformError::Finalize {
        path: part.to_path_buf(),
        source,
    })?;
    Ok(stats)
}

/// Core of [`transform`] over any reader and writer.
///
/// The header is always written, so an hour with no watched titles still
/// produces a valid, empty CSV.
pub fn transform_reader<R: BufRead, W: Write>(
    mut reader: R,
    writer: W,
    watch_list: &WatchList,
    hour: &TargetHour,
) -> Result<TransformStats, TransformError> {
    let mut csv_writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    csv_writer.write_record(TRANSFORMED_COLUMNS)?;

    let mut stats = TransformStats::default();
    let mut buffer = Vec::with_capacity(256);

    loop {
        buffer.clear();
        let n = reader
            .read_until(b'\n', &mut buffer)
            .map_err(TransformError::Read)?;
        if n == 0 {
            break;
        }
        stats.lines_read += 1;

        let record = std::str::from_utf8(&buffer)
            .map_err(|_| MalformedLine::Encoding)
            .and_then(PageviewRecord::parse);

        let record = match record {
            Ok(record) => record,
            Err(reason) => {
                stats.malformed += 1;
                debug!(line = stats.lines_read, %reason, "Skipping malformed line");
                continue;
            },
        };

        if record.domain_code != PRIMARY_DOMAIN || !watch_list.contains(record.page_title) {
            stats.filtered += 1;
            continue;
        }

        // parse() guarantees the count fits in i64
        let pageviews = record.view_count as i64;
        csv_writer.serialize(TransformedRow::new(record.page_title, pageviews, hour))?;
        stats.rows_written += 1;
    }

    csv_writer
        .flush()
        .map_err(|e| TransformError::Write(e.into()))?;
    Ok(stats)
}
