//! Forward-only position sources.
//!
//! A [`PositionStream`] yields each record once, in order, and reports how far
//! through its input it is so the engine can compute a completion fraction.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{InputError, StabilizationResult, StreamError};
use crate::position::Position;

/// A single-pass source of position records.
///
/// Recoverable (`InputError`) items are skipped by the engine; any other
/// error ends the run.
pub trait PositionStream: Iterator<Item = StabilizationResult<Position>> {
    /// Units of input consumed so far (bytes for file-backed streams).
    fn bytes_consumed(&self) -> u64;

    /// Total units of input, 0 when unknown.
    fn total_bytes(&self) -> u64;

    /// Fraction of the input consumed, in `[0, 1]`.
    fn fraction_complete(&self) -> f64 {
        let total = self.total_bytes();
        if total == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let fraction = self.bytes_consumed() as f64 / total as f64;
        fraction.clamp(0.0, 1.0)
    }
}

/// In-memory records; progress is measured in records.
#[derive(Debug, Clone)]
pub struct MemoryStream {
    records: std::vec::IntoIter<Position>,
    total: u64,
    consumed: u64,
}

impl MemoryStream {
    /// Wraps `records` in consumption order.
    #[must_use]
    pub fn new(records: Vec<Position>) -> Self {
        let total = records.len() as u64;
        Self {
            records: records.into_iter(),
            total,
            consumed: 0,
        }
    }
}

impl Iterator for MemoryStream {
    type Item = StabilizationResult<Position>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.records.next()?;
        self.consumed += 1;
        Some(Ok(record))
    }
}

impl PositionStream for MemoryStream {
    fn bytes_consumed(&self) -> u64 {
        self.consumed
    }

    fn total_bytes(&self) -> u64 {
        self.total
    }
}

/// Reads newline-delimited JSON position records.
#[derive(Debug)]
pub struct PositionReader<R> {
    reader: R,
    buf: Vec<u8>,
    consumed: u64,
    total: u64,
    records: u64,
    failed: bool,
}

impl PositionReader<BufReader<File>> {
    /// Opens a file of position records.
    ///
    /// # Errors
    /// `StreamError::Open` if the file cannot be opened or inspected.
    pub fn open(path: &Path) -> Result<Self, StreamError> {
        let open_err = |e: std::io::Error| StreamError::Open {
            path: path.display().to_string(),
            message: e.to_string(),
        };
        let file = File::open(path).map_err(open_err)?;
        let total = file.metadata().map_err(open_err)?.len();
        Ok(Self::new(BufReader::new(file), total))
    }
}

impl<R: BufRead> PositionReader<R> {
    /// Wraps a reader whose total size is `total_bytes` (0 if unknown).
    pub fn new(reader: R, total_bytes: u64) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            consumed: 0,
            total: total_bytes,
            records: 0,
            failed: false,
        }
    }
}

impl<R: BufRead> Iterator for PositionReader<R> {
    type Item = StabilizationResult<Position>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            self.buf.clear();
            let read = match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(n) => n,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(StreamError::Read {
                        message: e.to_string(),
                    }
                    .into()));
                }
            };
            self.consumed += read as u64;

            // Undecodable text is a bad record, not a broken stream.
            let text = match std::str::from_utf8(&self.buf) {
                Ok(text) => text,
                Err(e) => {
                    self.records += 1;
                    return Some(Err(InputError::Malformed {
                        record: self.records,
                        message: e.to_string(),
                    }
                    .into()));
                }
            };
            let line = text.trim();
            if line.is_empty() {
                continue;
            }
            self.records += 1;
            let records = self.records;
            let parsed: StabilizationResult<Position> = serde_json::from_str(line).map_err(|e| {
                InputError::Malformed {
                    record: records,
                    message: e.to_string(),
                }
                .into()
            });
            return Some(parsed);
        }
    }
}

impl<R: BufRead> PositionStream for PositionReader<R> {
    fn bytes_consumed(&self) -> u64 {
        self.consumed
    }

    fn total_bytes(&self) -> u64 {
        self.total
    }
}
