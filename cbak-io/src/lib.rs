//! cbak I/O - Streaming backup and restore of contact records
//!
//! This crate provides the streaming layer on top of `cbak-format`:
//!
//! - Incremental array-of-objects writer
//! - Brace-depth reader with bounded memory
//! - Record store collaborator interface and an in-memory store
//! - Export and import tasks with progress and cancellation
//! - High-level one-shot export/import functions

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod mapping;
pub mod progress;
pub mod reader;
pub mod store;
pub mod task;
pub mod writer;

// Re-export commonly used types
pub use cbak_format::{CbakError, Limits, Record, Result};
pub use progress::{progress_channel, CancellationToken, ProgressEvent, ProgressReceiver, ProgressSender};
pub use reader::{BackupReader, Disposition, ReaderOptions, RecordSink, ScanSummary};
pub use store::{ChildKind, ContactStore, FieldValue, MemoryStore, RawRow, StoreError, StoreResult};
pub use task::{
    spawn_export, spawn_import, ExportOptions, ExportReport, ExportTask, Finished, ImportOptions,
    ImportReport, ImportTask, TaskHandle, TaskState,
};
pub use writer::{BackupWriter, WriteOutcome, WriterOptions, WriterSummary};

use std::io::{Read, Write};

/// How a task or scan ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Ran to the end of its input.
    Completed,
    /// Stopped early on request.
    Cancelled,
}

/// Export every record of `store` into `sink` on the current thread.
pub fn export_contacts<S, W>(store: &mut S, sink: W, opts: ExportOptions) -> Result<ExportReport>
where
    S: ContactStore + ?Sized,
    W: Write,
{
    ExportTask::new(store, opts).run(sink, &ProgressSender::disabled(), &CancellationToken::new())
}

/// Restore a backup from `source` into `store` on the current thread.
pub fn import_contacts<S, R>(
    store: &mut S,
    source: R,
    total_hint: Option<u64>,
    opts: ImportOptions,
) -> Result<ImportReport>
where
    S: ContactStore + ?Sized,
    R: Read,
{
    ImportTask::new(store, opts).run(
        source,
        total_hint,
        &ProgressSender::disabled(),
        &CancellationToken::new(),
    )
}
