//! On-disk layout of a run's artifacts
//!
//! Every artifact is namespaced by the target hour so runs for different
//! hours never share a path. Stages write to `<name>.part` and rename onto the
//! final name only once the file is complete.

use pageviews_common::TargetHour;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const EXTRACTED_FILE_NAME: &str = "pageviews.txt";
pub const TRANSFORMED_FILE_NAME: &str = "pageviews.csv";

/// Artifact paths for one target hour
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    /// `<raw_dir>/pageviews-YYYYMMDD-HH0000.gz`
    pub raw_dump: PathBuf,
    /// `<staging_dir>/YYYYMMDD-HH`
    pub staging_dir: PathBuf,
    pub extracted: PathBuf,
    pub transformed: PathBuf,
}

impl RunPaths {
    pub fn new(raw_dir: &Path, staging_dir: &Path, hour: &TargetHour) -> Self {
        let staging_dir = staging_dir.join(hour.partition_key());
        Self {
            raw_dump: raw_dir.join(hour.file_name()),
            extracted: staging_dir.join(EXTRACTED_FILE_NAME),
            transformed: staging_dir.join(TRANSFORMED_FILE_NAME),
            staging_dir,
        }
    }

    /// Remove this hour's staging directory, and the raw dump too if asked
    pub fn clean_staging(&self, remove_raw: bool) -> io::Result<()> {
        remove_if_exists(&self.staging_dir, true)?;
        if remove_raw {
            remove_if_exists(&self.raw_dump, false)?;
        }
        Ok(())
    }
}

fn remove_if_exists(path: &Path, dir: bool) -> io::Result<()> {
    let result = if dir {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };

    match result {
        Ok(()) => {
            debug!(path = %path.display(), "Removed run artifact");
            Ok(())
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// In-progress sibling of `path`
pub fn part_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}

/// Create the parent directory of `path` if it is missing
pub fn ensure_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

/// Best-effort removal of a half-written file after a failure
pub fn discard_part(part: &Path) {
    if let Err(e) = std::fs::remove_file(part) {
        if e.kind() != io::ErrorKind::NotFound {
            debug!(path = %part.display(), error = %e, "Could not remove partial file");
        }
    }
}
