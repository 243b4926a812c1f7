//! Streaming writer for cbak backup files
//!
//! The writer never holds more than one serialized record. Each record is
//! encoded into a scratch buffer first, so a record that fails validation
//! leaves the sink untouched and the array grammar intact.

use std::io::{BufWriter, Write};

use cbak_format::constants::{ARRAY_CLOSE, ARRAY_OPEN, DEFAULT_INDENT, RECORD_SEPARATOR};
use cbak_format::{CbakError, Limits, Record, Result};
use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use tracing::{debug, warn};

/// Options controlling backup output
#[derive(Debug, Clone)]
pub struct WriterOptions {
    /// Pretty-print indentation width in spaces
    pub indent: usize,
    /// Field and blob limits applied before a record is written
    pub limits: Limits,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            indent: DEFAULT_INDENT,
            limits: Limits::default(),
        }
    }
}

/// Result of a single [`BackupWriter::write_record`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The record reached the sink.
    Written {
        /// Bytes emitted for this record, separator included.
        bytes: u64,
    },
    /// The record could not be encoded and was left out.
    Skipped {
        /// Why the record was skipped.
        reason: String,
    },
}

/// Totals reported when the writer is closed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriterSummary {
    /// Records that reached the sink.
    pub records_written: u64,
    /// Records skipped because they could not be encoded.
    pub records_skipped: u64,
    /// Total bytes emitted, array tokens included.
    pub bytes_written: u64,
}

/// Incremental array-of-objects writer.
pub struct BackupWriter<W: Write> {
    sink: BufWriter<W>,
    indent: Vec<u8>,
    limits: Limits,
    scratch: Vec<u8>,
    summary: WriterSummary,
}

impl<W: Write> BackupWriter<W> {
    /// Open a backup on `sink`, emitting the array-open token.
    pub fn new(sink: W, opts: WriterOptions) -> Result<Self> {
        opts.limits.validate()?;

        let mut sink = BufWriter::new(sink);
        sink.write_all(ARRAY_OPEN)?;
        sink.flush()?;

        Ok(Self {
            sink,
            indent: vec![b' '; opts.indent],
            limits: opts.limits,
            scratch: Vec::new(),
            summary: WriterSummary {
                bytes_written: ARRAY_OPEN.len() as u64,
                ..WriterSummary::default()
            },
        })
    }

    /// Write the record at zero-based position `index` out of `total`.
    ///
    /// Encoding failures are absorbed and reported as
    /// [`WriteOutcome::Skipped`]; I/O failures are returned and leave
    /// previously flushed records in place.
    pub fn write_record(&mut self, record: &Record, index: u64, total: u64) -> Result<WriteOutcome> {
        if index >= total {
            return Err(CbakError::PositionOutOfRange { index, total });
        }

        self.scratch.clear();
        if let Err(err) = self.encode(record) {
            if !err.is_record_local() {
                return Err(err);
            }
            warn!(index, id = ?record.id, error = %err, "skipping record that cannot be encoded");
            self.summary.records_skipped += 1;
            return Ok(WriteOutcome::Skipped {
                reason: err.to_string(),
            });
        }

        let mut bytes = self.scratch.len() as u64;
        if self.summary.records_written > 0 {
            self.sink.write_all(RECORD_SEPARATOR)?;
            bytes += RECORD_SEPARATOR.len() as u64;
        }
        self.sink.write_all(&self.scratch)?;
        self.sink.flush()?;

        self.summary.records_written += 1;
        self.summary.bytes_written += bytes;
        debug!(index, total, bytes, last = index + 1 == total, "record written");

        Ok(WriteOutcome::Written { bytes })
    }

    /// Totals so far.
    pub fn summary(&self) -> &WriterSummary {
        &self.summary
    }

    /// Emit the array-close token, flush and release the sink.
    pub fn finish(mut self) -> Result<WriterSummary> {
        self.sink.write_all(ARRAY_CLOSE)?;
        self.sink.flush()?;
        self.summary.bytes_written += ARRAY_CLOSE.len() as u64;

        let inner = self.sink.into_inner().map_err(|e| e.into_error())?;
        drop(inner);
        Ok(self.summary)
    }

    fn encode(&mut self, record: &Record) -> Result<()> {
        record.validate(&self.limits)?;
        let formatter = PrettyFormatter::with_indent(&self.indent);
        let mut serializer = Serializer::with_formatter(&mut self.scratch, formatter);
        record.serialize(&mut serializer)?;
        Ok(())
    }
}
