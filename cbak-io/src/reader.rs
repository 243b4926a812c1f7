//! Streaming reader for cbak backup files
//!
//! Top-level objects are located purely by brace depth: a `{` at depth zero
//! opens a record, the matching `}` closes it, and the bytes in between are
//! decoded as one [`Record`]. Nothing outside an open object is interpreted,
//! so array brackets, separators and whitespace between records are simply
//! consumed. Memory use is bounded by the largest single record.
//!
//! String literals are not tracked. A brace inside a string value counts like
//! any other, so a value with unbalanced braces splits its record and the
//! pieces are reported as malformed. In exchange a broken quote can never
//! swallow the records that follow it.

use std::io::{BufRead, BufReader, ErrorKind, Read};

use cbak_format::constants::DEFAULT_PROGRESS_INTERVAL_BYTES;
use cbak_format::{CbakError, Limits, Record, Result};
use tracing::{debug, trace, warn};

use crate::progress::{CancellationToken, ProgressEvent, ProgressSender};
use crate::Outcome;

/// Options controlling backup scanning
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    /// Bytes consumed between two byte-progress notifications
    pub progress_interval_bytes: u64,
    /// Record size, field and blob limits
    pub limits: Limits,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            progress_interval_bytes: DEFAULT_PROGRESS_INTERVAL_BYTES,
            limits: Limits::default(),
        }
    }
}

/// What a [`RecordSink`] did with a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The record was taken.
    Accepted,
    /// The record was refused; scanning continues.
    Rejected,
}

/// Receiver for records reconstructed by [`BackupReader`].
///
/// Returning `Err` aborts the scan.
pub trait RecordSink {
    /// Take ownership of one decoded record.
    fn accept(&mut self, record: Record) -> Result<Disposition>;
}

impl<F> RecordSink for F
where
    F: FnMut(Record) -> Result<Disposition>,
{
    fn accept(&mut self, record: Record) -> Result<Disposition> {
        self(record)
    }
}

/// Totals reported at the end of a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSummary {
    /// Bytes consumed from the source.
    pub bytes_read: u64,
    /// Records the sink accepted.
    pub records_accepted: u64,
    /// Records the sink rejected.
    pub records_rejected: u64,
    /// Objects that could not be decoded or exceeded limits.
    pub records_failed: u64,
    /// Whether the scan ran to the end of the source.
    pub outcome: Outcome,
}

impl Default for ScanSummary {
    fn default() -> Self {
        Self {
            bytes_read: 0,
            records_accepted: 0,
            records_rejected: 0,
            records_failed: 0,
            outcome: Outcome::Completed,
        }
    }
}

/// Brace-depth scanner state.
struct Scanner {
    depth: usize,
    record_open: bool,
    overflow: bool,
    start: u64,
    buffer: Vec<u8>,
    max_record_bytes: usize,
}

impl Scanner {
    fn new(max_record_bytes: usize) -> Self {
        Self {
            depth: 0,
            record_open: false,
            overflow: false,
            start: 0,
            buffer: Vec::new(),
            max_record_bytes,
        }
    }

    /// Feed the byte found at `offset`; returns true when it closed a top-level object.
    fn feed(&mut self, byte: u8, offset: u64) -> bool {
        match byte {
            b'{' => {
                if self.depth == 0 {
                    self.buffer.clear();
                    self.record_open = true;
                    self.overflow = false;
                    self.start = offset;
                }
                self.depth += 1;
            }
            b'}' => {
                if self.depth == 0 {
                    trace!(offset, "ignoring stray closing brace");
                    return false;
                }
                self.depth -= 1;
            }
            _ => {}
        }

        if self.record_open && !self.overflow {
            if self.buffer.len() >= self.max_record_bytes {
                self.overflow = true;
                self.buffer = Vec::new();
            } else {
                self.buffer.push(byte);
            }
        }

        self.depth == 0 && self.record_open
    }
}

/// Incremental reader reconstructing one record at a time.
#[derive(Debug, Clone)]
pub struct BackupReader {
    opts: ReaderOptions,
}

impl BackupReader {
    /// Create a reader, validating the options.
    pub fn new(opts: ReaderOptions) -> Result<Self> {
        opts.limits.validate()?;
        if opts.progress_interval_bytes == 0 {
            return Err(CbakError::LimitExceeded(
                "progress_interval_bytes must be non-zero".to_string(),
            ));
        }
        Ok(Self { opts })
    }

    /// Scan `source` to the end, handing each complete object to `sink`.
    ///
    /// `total_hint` is the source length when known; without it byte-progress
    /// events report the bytes consumed so far as their total. One final
    /// byte-progress event with `position == total` is posted when the scan
    /// completes. Malformed objects are reported on `progress` and skipped;
    /// an object still open at end of stream is returned as
    /// [`CbakError::UnbalancedInput`].
    pub fn read_all<R, S>(
        &self,
        source: R,
        total_hint: Option<u64>,
        sink: &mut S,
        progress: &ProgressSender,
        cancel: &CancellationToken,
    ) -> Result<ScanSummary>
    where
        R: Read,
        S: RecordSink + ?Sized,
    {
        let mut source = BufReader::new(source);
        let mut scanner = Scanner::new(self.opts.limits.max_record_bytes);
        let mut summary = ScanSummary::default();
        let interval = self.opts.progress_interval_bytes;
        let known_total = total_hint.unwrap_or(0);
        let mut consumed: u64 = 0;

        'scan: loop {
            let chunk = match source.fill_buf() {
                Ok(chunk) => chunk,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            };
            if chunk.is_empty() {
                break;
            }
            let len = chunk.len();

            for &byte in chunk {
                if cancel.is_cancelled() {
                    debug!(offset = consumed, "scan cancelled");
                    summary.outcome = Outcome::Cancelled;
                    break 'scan;
                }

                if scanner.feed(byte, consumed) {
                    scanner.record_open = false;
                    self.complete(&scanner, &mut *sink, progress, &mut summary)?;
                }

                consumed += 1;
                // The final event covers the last byte of a known-length source.
                if consumed % interval == 0 && consumed != known_total {
                    progress.post(ProgressEvent::BytesProgress {
                        position: consumed,
                        total: known_total.max(consumed),
                    });
                }
            }

            source.consume(len);
        }

        summary.bytes_read = consumed;
        if summary.outcome == Outcome::Cancelled {
            return Ok(summary);
        }

        let final_position = known_total.max(consumed);
        progress.post(ProgressEvent::BytesProgress {
            position: final_position,
            total: final_position,
        });

        if scanner.record_open {
            return Err(CbakError::UnbalancedInput {
                offset: scanner.start,
                depth: scanner.depth,
            });
        }

        debug!(
            bytes = consumed,
            accepted = summary.records_accepted,
            rejected = summary.records_rejected,
            failed = summary.records_failed,
            "scan finished"
        );
        Ok(summary)
    }

    fn complete<S>(
        &self,
        scanner: &Scanner,
        sink: &mut S,
        progress: &ProgressSender,
        summary: &mut ScanSummary,
    ) -> Result<()>
    where
        S: RecordSink + ?Sized,
    {
        let offset = scanner.start;
        if scanner.overflow {
            summary.records_failed += 1;
            let message = format!(
                "skipping record at byte {offset}: larger than {} bytes",
                self.opts.limits.max_record_bytes
            );
            warn!(offset, "{message}");
            progress.error(message);
            return Ok(());
        }

        let decoded = serde_json::from_slice::<Record>(&scanner.buffer)
            .map_err(CbakError::from)
            .and_then(|record| record.validate(&self.opts.limits).map(|()| record));

        match decoded {
            Ok(record) => {
                let label = record.label();
                match sink.accept(record)? {
                    Disposition::Accepted => {
                        summary.records_accepted += 1;
                        progress.post(ProgressEvent::RecordNamed { name: label });
                    }
                    Disposition::Rejected => {
                        summary.records_rejected += 1;
                    }
                }
            }
            Err(err) => {
                summary.records_failed += 1;
                warn!(offset, error = %err, "skipping malformed record");
                progress.error(format!("skipping malformed record at byte {offset}: {err}"));
            }
        }

        Ok(())
    }
}
