//! Two-column `time,voltage` table files.
//!
//! One sample per line, six decimal places, no header:
//!
//! ```text
//! 0.000000,1.000000
//! 0.010000,1.250000
//! ```
//!
//! Reading is bounded by the caller's row limit and the table capacity; see
//! [`OverflowPolicy`] for what happens when the source holds more rows than fit.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AppResult, DaqError};
use crate::waveform::Sample;

/// How many rows the caller wants from a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowLimit {
    /// Everything the source holds, up to capacity
    All,
    /// At most this many rows
    AtMost(usize),
}

impl RowLimit {
    /// Row limit for a playback run budget (0 = whole table).
    pub fn from_budget(budget: u64) -> Self {
        match budget {
            0 => RowLimit::All,
            n => RowLimit::AtMost(usize::try_from(n).unwrap_or(usize::MAX)),
        }
    }
}

/// Behavior when a source holds more rows than the table capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Keep the first `capacity` rows and log a warning
    #[default]
    Truncate,
    /// Fail with [`DaqError::CapacityExceeded`]
    Reject,
}

/// Resolve `path` against the working directory for diagnostics.
pub fn resolve_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Read up to `limit` samples from `path`, never more than `capacity`.
pub fn read_table(
    path: impl AsRef<Path>,
    limit: RowLimit,
    capacity: usize,
    overflow: OverflowPolicy,
) -> AppResult<Vec<Sample>> {
    let path = path.as_ref();
    let resolved = resolve_path(path);
    let file = File::open(path).map_err(|source| DaqError::SourceUnavailable {
        path: resolved.clone(),
        source,
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(BufReader::new(file));

    let (wanted, beyond_capacity) = match limit {
        RowLimit::All => (capacity, true),
        RowLimit::AtMost(n) => (n.min(capacity), n > capacity),
    };

    let mut rows = Vec::with_capacity(wanted.min(crate::waveform::BUF_SIZE));
    let mut record = csv::StringRecord::new();

    while rows.len() < wanted {
        if !reader
            .read_record(&mut record)
            .map_err(|e| csv_error(e, &resolved))?
        {
            break;
        }
        rows.push(parse_record(&record, &resolved)?);
    }

    if rows.len() == capacity && beyond_capacity {
        let more = reader
            .read_record(&mut record)
            .map_err(|e| csv_error(e, &resolved))?;
        if more {
            match overflow {
                OverflowPolicy::Truncate => {
                    warn!(
                        path = %resolved.display(),
                        capacity,
                        "Waveform source exceeds table capacity, truncating"
                    );
                }
                OverflowPolicy::Reject => return Err(DaqError::CapacityExceeded { capacity }),
            }
        }
    }

    debug!(path = %resolved.display(), rows = rows.len(), "Loaded waveform table");
    Ok(rows)
}

/// Write `samples` to `path`, replacing any existing file.
pub fn write_table(path: impl AsRef<Path>, samples: &[Sample]) -> AppResult<()> {
    let path = path.as_ref();
    let resolved = resolve_path(path);
    let file = File::create(path).map_err(|source| DaqError::SinkUnavailable {
        path: resolved.clone(),
        source,
    })?;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(BufWriter::new(file));

    for sample in samples {
        writer
            .write_record([
                format!("{:.6}", sample.time),
                format!("{:.6}", sample.voltage),
            ])
            .map_err(|e| csv_error(e, &resolved))?;
    }

    let mut inner = writer.into_inner().map_err(|e| DaqError::Io(e.into_error()))?;
    inner.flush()?;

    debug!(path = %resolved.display(), rows = samples.len(), "Wrote sample table");
    Ok(())
}

fn parse_record(record: &csv::StringRecord, path: &Path) -> AppResult<Sample> {
    let line = record.position().map_or(0, |p| p.line());
    let parse_error = |message: String| DaqError::Parse {
        path: path.to_path_buf(),
        line,
        message,
    };

    if record.len() != 2 {
        return Err(parse_error(format!(
            "expected 2 fields (time,voltage), found {}",
            record.len()
        )));
    }

    let field = |i: usize| -> AppResult<f64> {
        let raw = &record[i];
        raw.parse::<f64>()
            .map_err(|e| parse_error(format!("invalid number '{}': {}", raw, e)))
    };

    Ok(Sample::new(field(0)?, field(1)?))
}

fn csv_error(err: csv::Error, path: &Path) -> DaqError {
    let line = err.position().map_or(0, |p| p.line());
    match err.into_kind() {
        csv::ErrorKind::Io(io) => DaqError::Io(io),
        other => DaqError::Parse {
            path: path.to_path_buf(),
            line,
            message: format!("{:?}", other),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn source(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_round_trip_preserves_six_decimals() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wave.csv");
        let samples = vec![
            Sample::new(0.0, 1.0),
            Sample::new(0.01, 4.123456),
            Sample::new(0.02, -0.5),
        ];

        write_table(&path, &samples).unwrap();
        let back = read_table(&path, RowLimit::All, 10, OverflowPolicy::Reject).unwrap();

        assert_eq!(back.len(), samples.len());
        for (a, b) in samples.iter().zip(&back) {
            assert!((a.time - b.time).abs() < 1e-6);
            assert!((a.voltage - b.voltage).abs() < 1e-6);
        }
    }

    #[test]
    fn test_written_format_is_fixed_precision() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        write_table(&path, &[Sample::new(0.01, 3.3)]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "0.010000,3.300000\n");
    }

    #[test]
    fn test_row_limit_stops_early() {
        let file = source("0,1\n0.01,2\n0.02,3\n0.03,4\n");
        let rows = read_table(file.path(), RowLimit::AtMost(2), 100, OverflowPolicy::Reject)
            .unwrap();
        assert_eq!(rows, vec![Sample::new(0.0, 1.0), Sample::new(0.01, 2.0)]);
    }

    #[test]
    fn test_end_of_source_before_limit() {
        let file = source("0,1\n0.01,2\n");
        let rows = read_table(file.path(), RowLimit::AtMost(50), 100, OverflowPolicy::Reject)
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_truncate_at_capacity() {
        let file = source("0,1\n0.01,2\n0.02,3\n");
        let rows = read_table(file.path(), RowLimit::All, 2, OverflowPolicy::Truncate).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_reject_over_capacity() {
        let file = source("0,1\n0.01,2\n0.02,3\n");
        let err = read_table(file.path(), RowLimit::All, 2, OverflowPolicy::Reject).unwrap_err();
        assert!(matches!(err, DaqError::CapacityExceeded { capacity: 2 }));
    }

    #[test]
    fn test_limit_beyond_capacity_rejects_extra_rows() {
        let file = source("0,1\n0.01,2\n0.02,3\n");
        let err = read_table(file.path(), RowLimit::AtMost(5), 2, OverflowPolicy::Reject)
            .unwrap_err();
        assert!(matches!(err, DaqError::CapacityExceeded { capacity: 2 }));

        // A limit past capacity is fine when the file itself fits.
        let file = source("0,1\n0.01,2\n");
        let rows = read_table(file.path(), RowLimit::AtMost(5), 2, OverflowPolicy::Reject)
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_reject_exactly_full_is_ok() {
        let file = source("0,1\n0.01,2\n");
        let rows = read_table(file.path(), RowLimit::All, 2, OverflowPolicy::Reject).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_limit_within_capacity_never_overflows() {
        let file = source("0,1\n0.01,2\n0.02,3\n");
        let rows = read_table(file.path(), RowLimit::AtMost(2), 2, OverflowPolicy::Reject)
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_malformed_row_is_rejected_with_line() {
        let file = source("0,1\n0.01,abc\n");
        let err = read_table(file.path(), RowLimit::All, 10, OverflowPolicy::Truncate)
            .unwrap_err();
        match err {
            DaqError::Parse { line, message, .. } => {
                assert_eq!(line, 2);
                assert!(message.contains("abc"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_wrong_field_count_is_rejected() {
        let file = source("0,1,2\n");
        let err = read_table(file.path(), RowLimit::All, 10, OverflowPolicy::Truncate)
            .unwrap_err();
        assert!(matches!(err, DaqError::Parse { line: 1, .. }));
    }

    #[test]
    fn test_whitespace_is_trimmed() {
        let file = source(" 0.5 , 2.25 \n");
        let rows = read_table(file.path(), RowLimit::All, 10, OverflowPolicy::Truncate).unwrap();
        assert_eq!(rows, vec![Sample::new(0.5, 2.25)]);
    }

    #[test]
    fn test_missing_source_reports_resolved_path() {
        let err = read_table(
            "definitely/not/here.csv",
            RowLimit::All,
            10,
            OverflowPolicy::Truncate,
        )
        .unwrap_err();
        match err {
            DaqError::SourceUnavailable { path, .. } => {
                assert!(path.is_absolute());
                assert!(path.ends_with("definitely/not/here.csv"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_unwritable_sink() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("out.csv");
        let err = write_table(&path, &[]).unwrap_err();
        assert!(matches!(err, DaqError::SinkUnavailable { .. }));
    }

    #[test]
    fn test_row_limit_from_budget() {
        assert_eq!(RowLimit::from_budget(0), RowLimit::All);
        assert_eq!(RowLimit::from_budget(500), RowLimit::AtMost(500));
    }
}
