//! Gzip decompression of a downloaded dump

use crate::error::ExtractError;
use crate::layout::{discard_part, ensure_parent, part_path};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const CHUNK_SIZE: usize = 64 * 1024;

/// Decompress `compressed` into `output`, streaming in fixed-size chunks.
///
/// Output goes to `<output>.part` and is renamed on success, so a failed run
/// leaves nothing behind. An output smaller than `min_output_bytes` is treated
/// as a truncated download.
pub fn extract(
    compressed: &Path,
    output: &Path,
    min_output_bytes: u64,
) -> Result<PathBuf, ExtractError> {
    info!(
        input = %compressed.display(),
        output = %output.display(),
        "Extracting dump"
    );

    let input = File::open(compressed).map_err(|source| ExtractError::Io {
        path: compressed.to_path_buf(),
        source,
    })?;
    ensure_parent(output).map_err(|source| ExtractError::Io {
        path: output.to_path_buf(),
        source,
    })?;

    let part = part_path(output);
    let written = match decompress(compressed, input, &part) {
        Ok(bytes) => bytes,
        Err(e) => {
            discard_part(&part);
            return Err(e);
        },
    };

    if written < min_output_bytes {
        discard_part(&part);
        warn!(
            path = %compressed.display(),
            bytes = written,
            minimum = min_output_bytes,
            "Extracted file is suspiciously small"
        );
        return Err(ExtractError::TooSmall {
            path: compressed.to_path_buf(),
            bytes: written,
            minimum: min_output_bytes,
        });
    }

    std::fs::rename(&part, output).map_err(|source| ExtractError::Io {
        path: output.to_path_buf(),
        source,
    })?;

    info!(path = %output.display(), bytes = written, "Extraction complete");
    Ok(output.to_path_buf())
}

/// Copy decoded bytes into `part`, telling decoder failures apart from
/// local write failures
fn decompress(compressed: &Path, input: File, part: &Path) -> Result<u64, ExtractError> {
    let write_err = |source| ExtractError::Io {
        path: part.to_path_buf(),
        source,
    };

    let mut decoder = MultiGzDecoder::new(BufReader::new(input));
    let mut writer = BufWriter::new(File::create(part).map_err(write_err)?);
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut written = 0u64;

    loop {
        let n = match decoder.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(source) => {
                return Err(ExtractError::Corrupt {
                    path: compressed.to_path_buf(),
                    source,
                })
            },
        };
        writer.write_all(&buffer[..n]).map_err(write_err)?;
        written += n as u64;
    }

    let file = writer
        .into_inner()
        .map_err(|e| write_err(e.into_error()))?;
    file.sync_all().map_err(write_err)?;

    Ok(written)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tempfile::TempDir;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    const DUMP: &str = "en Amazon 100 0\nen Apple 50 0\nde Amazon 30 0\n";

    #[test]
    fn test_extract_round() {
        let temp = TempDir::new().unwrap();
        let compressed = temp.path().join("pageviews-20251210-160000.gz");
        std::fs::write(&compressed, gzip(DUMP.as_bytes())).unwrap();
        let output = temp.path().join("staging").join("pageviews.txt");

        let path = extract(&compressed, &output, 1).unwrap();

        assert_eq!(path, output);
        assert_eq!(std::fs::read_to_string(&output).unwrap(), DUMP);
        assert!(!part_path(&output).exists());
    }

    #[test]
    fn test_extract_concatenated_members() {
        let temp = TempDir::new().unwrap();
        let compressed = temp.path().join("dump.gz");
        let mut bytes = gzip(b"en Amazon 1 0\n");
        bytes.extend(gzip(b"en Apple 2 0\n"));
        std::fs::write(&compressed, bytes).unwrap();
        let output = temp.path().join("pageviews.txt");

        extract(&compressed, &output, 1).unwrap();

        assert_eq!(
            std::fs::read_to_string(&output).unwrap(),
            "en Amazon 1 0\nen Apple 2 0\n"
        );
    }

    #[test]
    fn test_extract_rejects_non_gzip() {
        let temp = TempDir::new().unwrap();
        let compressed = temp.path().join("dump.gz");
        std::fs::write(&compressed, b"<html>Not Found</html>").unwrap();
        let output = temp.path().join("pageviews.txt");

        let err = extract(&compressed, &output, 1).unwrap_err();

        assert!(matches!(err, ExtractError::Corrupt { .. }));
        assert!(!output.exists());
        assert!(!part_path(&output).exists());
    }

    #[test]
    fn test_extract_rejects_truncated_archive() {
        let temp = TempDir::new().unwrap();
        let compressed = temp.path().join("dump.gz");
        let full = gzip(DUMP.repeat(200).as_bytes());
        std::fs::write(&compressed, &full[..full.len() / 2]).unwrap();
        let output = temp.path().join("pageviews.txt");

        let err = extract(&compressed, &output, 1).unwrap_err();

        assert!(matches!(err, ExtractError::Corrupt { .. }));
        assert!(!output.exists());
    }

    #[test]
    fn test_extract_too_small() {
        let temp = TempDir::new().unwrap();
        let compressed = temp.path().join("dump.gz");
        std::fs::write(&compressed, gzip(b"en Amazon 1 0\n")).unwrap();
        let output = temp.path().join("pageviews.txt");

        let err = extract(&compressed, &output, 1024).unwrap_err();

        match err {
            ExtractError::TooSmall { bytes, minimum, .. } => {
                assert_eq!(bytes, 14);
                assert_eq!(minimum, 1024);
            },
            other => panic!("unexpected error: {other}"),
        }
        assert!(!output.exists());
        assert!(!part_path(&output).exists());
    }

    #[test]
    fn test_extract_missing_input() {
        let temp = TempDir::new().unwrap();
        let err = extract(
            &temp.path().join("missing.gz"),
            &temp.path().join("pageviews.txt"),
            1,
        )
        .unwrap_err();
        assert!(matches!(err, ExtractError::Io { .. }));
    }
}
