//! Export and import tasks
//!
//! A task is one complete backup or restore. It can run on the caller's
//! thread ([`ExportTask::run`], [`ImportTask::run`]) or on a dedicated
//! background thread ([`spawn_export`], [`spawn_import`]) that reports through
//! a progress channel and stops at the next record or byte once its
//! [`CancellationToken`] is triggered.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use cbak_format::{CbakError, Record, Result};
use tracing::{debug, error, info, warn};

use crate::mapping;
use crate::progress::{progress_channel, CancellationToken, ProgressEvent, ProgressReceiver, ProgressSender};
use crate::reader::{BackupReader, Disposition, ReaderOptions};
use crate::store::ContactStore;
use crate::writer::{BackupWriter, WriteOutcome, WriterOptions};
use crate::Outcome;

/// Options for an export run
#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    /// Output formatting and limits
    pub writer: WriterOptions,
}

/// Options for an import run
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Scanning interval and limits
    pub reader: ReaderOptions,
    /// Remove every existing record before restoring
    pub clear_existing: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            reader: ReaderOptions::default(),
            clear_existing: true,
        }
    }
}

/// Totals of an export run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    /// Records in the store when the export started
    pub records_total: u64,
    /// Records written to the backup
    pub records_written: u64,
    /// Records left out because they could not be loaded or encoded
    pub records_skipped: u64,
    /// Bytes written, array tokens included
    pub bytes_written: u64,
    /// Whether the export ran to the end
    pub outcome: Outcome,
}

impl Default for ExportReport {
    fn default() -> Self {
        Self {
            records_total: 0,
            records_written: 0,
            records_skipped: 0,
            bytes_written: 0,
            outcome: Outcome::Completed,
        }
    }
}

/// Totals of an import run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportReport {
    /// Records removed from the destination before restoring
    pub records_cleared: u64,
    /// Records restored into the store
    pub records_restored: u64,
    /// Records the store refused
    pub records_rejected: u64,
    /// Objects that could not be decoded
    pub records_failed: u64,
    /// Child entries the store refused
    pub children_failed: u64,
    /// Bytes consumed from the backup
    pub bytes_read: u64,
    /// Whether the import ran to the end
    pub outcome: Outcome,
}

impl Default for ImportReport {
    fn default() -> Self {
        Self {
            records_cleared: 0,
            records_restored: 0,
            records_rejected: 0,
            records_failed: 0,
            children_failed: 0,
            bytes_read: 0,
            outcome: Outcome::Completed,
        }
    }
}

fn report_failure<T>(result: Result<T>, what: &str, progress: &ProgressSender) -> Result<T> {
    if let Err(err) = &result {
        error!(error = %err, "{what} failed");
        progress.error(format!("{what} failed: {err}"));
    }
    result
}

/// Writes every record of a store into one backup.
#[derive(Debug)]
pub struct ExportTask<S> {
    store: S,
    opts: ExportOptions,
}

impl<S: ContactStore> ExportTask<S> {
    /// Export from `store`.
    pub fn new(store: S, opts: ExportOptions) -> Self {
        Self { store, opts }
    }

    /// The source store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Give the store back.
    pub fn into_store(self) -> S {
        self.store
    }

    /// Write the backup to `sink` on the current thread.
    ///
    /// A record-progress event follows every record; an empty store yields a
    /// single `{0, 0}` event. Cancellation is checked before each record and
    /// still closes the array, so a cancelled export is a valid, shorter
    /// backup. Terminal failures are posted as error events and returned.
    pub fn run<W: Write>(
        &mut self,
        sink: W,
        progress: &ProgressSender,
        cancel: &CancellationToken,
    ) -> Result<ExportReport> {
        let result = self.export(sink, progress, cancel);
        report_failure(result, "export", progress)
    }

    fn export<W: Write>(
        &mut self,
        sink: W,
        progress: &ProgressSender,
        cancel: &CancellationToken,
    ) -> Result<ExportReport> {
        let total = self.store.count()?;
        info!(total, "export started");

        let mut writer = BackupWriter::new(sink, self.opts.writer.clone())?;
        let mut report = ExportReport {
            records_total: total,
            ..ExportReport::default()
        };

        let mut position = 0u64;
        for row in self.store.iterate_all()? {
            if cancel.is_cancelled() {
                info!(position, total, "export cancelled");
                report.outcome = Outcome::Cancelled;
                break;
            }
            if position >= total {
                warn!(total, "store grew during export; ignoring the extra rows");
                break;
            }

            let row = row?;
            match mapping::load_record(&self.store, &row) {
                Ok(record) => match writer.write_record(&record, position, total)? {
                    WriteOutcome::Written { .. } => report.records_written += 1,
                    WriteOutcome::Skipped { reason } => {
                        report.records_skipped += 1;
                        progress.error(format!("skipped {}: {reason}", record.label()));
                    }
                },
                Err(err) if err.is_record_local() => {
                    report.records_skipped += 1;
                    warn!(id = ?row.id(), error = %err, "skipping unreadable store row");
                    progress.error(format!("skipped store row {:?}: {err}", row.id()));
                }
                Err(err) => return Err(err),
            }

            position += 1;
            progress.post(ProgressEvent::RecordProgress { position, total });
        }

        let summary = writer.finish()?;
        report.bytes_written = summary.bytes_written;

        if report.outcome == Outcome::Completed && (position == 0 || position != total) {
            // Empty or shrunken store: close out the progress sequence.
            progress.post(ProgressEvent::RecordProgress {
                position,
                total: position,
            });
        }

        info!(
            written = report.records_written,
            skipped = report.records_skipped,
            bytes = report.bytes_written,
            outcome = ?report.outcome,
            "export finished"
        );
        Ok(report)
    }
}

/// Restores a backup into a store.
#[derive(Debug)]
pub struct ImportTask<S> {
    store: S,
    opts: ImportOptions,
}

impl<S: ContactStore> ImportTask<S> {
    /// Import into `store`.
    pub fn new(store: S, opts: ImportOptions) -> Self {
        Self { store, opts }
    }

    /// The destination store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Give the store back.
    pub fn into_store(self) -> S {
        self.store
    }

    /// Restore from `source` on the current thread.
    ///
    /// `total_hint` is the backup length when known. Each record is inserted
    /// with a store-assigned identifier, then its children and primary photo.
    /// A record the store refuses is reported and skipped. Cancellation
    /// leaves already restored records in place.
    pub fn run<R: Read>(
        &mut self,
        source: R,
        total_hint: Option<u64>,
        progress: &ProgressSender,
        cancel: &CancellationToken,
    ) -> Result<ImportReport> {
        let result = self.import(source, total_hint, progress, cancel);
        report_failure(result, "import", progress)
    }

    fn import<R: Read>(
        &mut self,
        source: R,
        total_hint: Option<u64>,
        progress: &ProgressSender,
        cancel: &CancellationToken,
    ) -> Result<ImportReport> {
        let reader = BackupReader::new(self.opts.reader.clone())?;
        let mut report = ImportReport::default();

        if cancel.is_cancelled() {
            report.outcome = Outcome::Cancelled;
            return Ok(report);
        }

        if self.opts.clear_existing {
            report.records_cleared = self.store.delete_all()?;
            info!(removed = report.records_cleared, "cleared destination store");
        }
        info!(total_hint, "import started");

        let store = &mut self.store;
        let children_failed = &mut report.children_failed;
        let mut restore = |record: Record| -> Result<Disposition> {
            Ok(restore_record(&mut *store, &record, progress, children_failed))
        };
        let scan = reader.read_all(source, total_hint, &mut restore, progress, cancel)?;

        report.records_restored = scan.records_accepted;
        report.records_rejected = scan.records_rejected;
        report.records_failed = scan.records_failed;
        report.bytes_read = scan.bytes_read;
        report.outcome = scan.outcome;

        info!(
            restored = report.records_restored,
            rejected = report.records_rejected,
            failed = report.records_failed,
            bytes = report.bytes_read,
            outcome = ?report.outcome,
            "import finished"
        );
        Ok(report)
    }
}

fn restore_record<S: ContactStore + ?Sized>(
    store: &mut S,
    record: &Record,
    progress: &ProgressSender,
    children_failed: &mut u64,
) -> Disposition {
    let label = record.label();
    match mapping::store_record(store, record) {
        Ok((id, refused)) => {
            for err in refused {
                *children_failed += 1;
                warn!(id, error = %err, "child entry refused");
                progress.error(format!("{label}: child entry not restored: {err}"));
            }
            debug!(id, backup_id = ?record.id, "record restored");
            Disposition::Accepted
        }
        Err(err) => {
            warn!(backup_id = ?record.id, error = %err, "store refused record");
            progress.error(format!("could not restore {label}: {err}"));
            Disposition::Rejected
        }
    }
}

/// Lifecycle of a background task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// The worker thread is still going.
    Running,
    /// The worker thread returned.
    Done,
}

const RUNNING: u8 = 0;
const DONE: u8 = 1;

/// Marks the task done when the worker exits, panics included.
struct DoneGuard(Arc<AtomicU8>);

impl Drop for DoneGuard {
    fn drop(&mut self) {
        self.0.store(DONE, Ordering::Release);
    }
}

/// What a finished background task hands back.
#[derive(Debug)]
pub struct Finished<R, T> {
    /// The task's report, or the failure that ended it.
    pub report: Result<R>,
    /// The task itself, so its store can be recovered.
    pub task: T,
}

/// Handle to a task running on its own thread.
#[derive(Debug)]
pub struct TaskHandle<R, T> {
    events: ProgressReceiver,
    cancel: CancellationToken,
    state: Arc<AtomicU8>,
    thread: JoinHandle<Finished<R, T>>,
}

impl<R, T> TaskHandle<R, T> {
    /// Progress events, in the order the task posted them.
    ///
    /// The channel disconnects once the task finishes, so iterating it
    /// drains every remaining event and then stops.
    pub fn events(&self) -> &ProgressReceiver {
        &self.events
    }

    /// Ask the task to stop at its next checkpoint.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A clone of the task's cancellation token.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TaskState {
        match self.state.load(Ordering::Acquire) {
            RUNNING => TaskState::Running,
            _ => TaskState::Done,
        }
    }

    /// Wait for the worker thread.
    pub fn join(self) -> Result<Finished<R, T>> {
        self.thread
            .join()
            .map_err(|_| CbakError::Internal("task thread panicked".to_string()))
    }
}

fn spawn<R, T, F>(name: &str, work: F) -> Result<TaskHandle<R, T>>
where
    R: Send + 'static,
    T: Send + 'static,
    F: FnOnce(&ProgressSender, &CancellationToken) -> Finished<R, T> + Send + 'static,
{
    let (progress, events) = progress_channel();
    let cancel = CancellationToken::new();
    let state = Arc::new(AtomicU8::new(RUNNING));

    let worker_cancel = cancel.clone();
    let guard = DoneGuard(Arc::clone(&state));
    let thread = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let _guard = guard;
            work(&progress, &worker_cancel)
        })?;

    Ok(TaskHandle {
        events,
        cancel,
        state,
        thread,
    })
}

/// Run `task` on a background thread, writing into `sink`.
pub fn spawn_export<S, W>(mut task: ExportTask<S>, sink: W) -> Result<TaskHandle<ExportReport, ExportTask<S>>>
where
    S: ContactStore + Send + 'static,
    W: Write + Send + 'static,
{
    spawn("cbak-export", move |progress, cancel| {
        let report = task.run(sink, progress, cancel);
        Finished { report, task }
    })
}

/// Run `task` on a background thread, reading from `source`.
pub fn spawn_import<S, R>(
    mut task: ImportTask<S>,
    source: R,
    total_hint: Option<u64>,
) -> Result<TaskHandle<ImportReport, ImportTask<S>>>
where
    S: ContactStore + Send + 'static,
    R: Read + Send + 'static,
{
    spawn("cbak-import", move |progress, cancel| {
        let report = task.run(source, total_hint, progress, cancel);
        Finished { report, task }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, RawRow};
    use cbak_format::constants as col;

    fn seeded(names: &[&str]) -> MemoryStore {
        let mut store = MemoryStore::new();
        for name in names {
            mapping::store_record(&mut store, &Record::named(*name)).unwrap();
        }
        store
    }

    #[test]
    fn empty_store_posts_zero_progress() {
        let (tx, rx) = progress_channel();
        let mut out = Vec::new();
        let report = ExportTask::new(MemoryStore::new(), ExportOptions::default())
            .run(&mut out, &tx, &CancellationToken::new())
            .unwrap();
        drop(tx);

        assert_eq!(out, b"[\n]\n");
        assert_eq!(report.records_written, 0);
        let events: Vec<_> = rx.iter().collect();
        assert_eq!(
            events,
            vec![ProgressEvent::RecordProgress {
                position: 0,
                total: 0
            }]
        );
    }

    #[test]
    fn export_posts_one_event_per_record() {
        let (tx, rx) = progress_channel();
        let mut out = Vec::new();
        let report = ExportTask::new(seeded(&["a", "b", "c"]), ExportOptions::default())
            .run(&mut out, &tx, &CancellationToken::new())
            .unwrap();
        drop(tx);

        assert_eq!(report.records_written, 3);
        let positions: Vec<u64> = rx.iter().filter_map(|e| e.position()).collect();
        assert_eq!(positions, vec![1, 2, 3]);
    }

    #[test]
    fn unreadable_row_is_skipped() {
        let mut store = seeded(&["a"]);
        store
            .insert_record(&RawRow::new().with(col::TIMES_CONTACTED, "many"))
            .unwrap();

        let (tx, rx) = progress_channel();
        let mut out = Vec::new();
        let report = ExportTask::new(store, ExportOptions::default())
            .run(&mut out, &tx, &CancellationToken::new())
            .unwrap();
        drop(tx);

        assert_eq!(report.records_written, 1);
        assert_eq!(report.records_skipped, 1);
        assert!(rx.iter().any(|e| matches!(e, ProgressEvent::Error { .. })));
        let parsed: Vec<serde_json::Value> = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn cancelled_export_still_closes_array() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut out = Vec::new();
        let report = ExportTask::new(seeded(&["a", "b"]), ExportOptions::default())
            .run(&mut out, &ProgressSender::disabled(), &cancel)
            .unwrap();
        assert_eq!(report.outcome, Outcome::Cancelled);
        assert_eq!(out, b"[\n]\n");
    }

    #[test]
    fn import_replaces_existing_records() {
        let mut out = Vec::new();
        ExportTask::new(seeded(&["a", "b"]), ExportOptions::default())
            .run(&mut out, &ProgressSender::disabled(), &CancellationToken::new())
            .unwrap();

        let mut task = ImportTask::new(seeded(&["old"]), ImportOptions::default());
        let report = task
            .run(out.as_slice(), Some(out.len() as u64), &ProgressSender::disabled(), &CancellationToken::new())
            .unwrap();

        assert_eq!(report.records_cleared, 1);
        assert_eq!(report.records_restored, 2);
        let store = task.into_store();
        assert!(store.find_by_name("old").is_none());
        assert_eq!(store.ids(), vec![2, 3]);
    }

    #[test]
    fn keep_existing_appends() {
        let text = br#"[
{"name": "new"}]
"#;
        let opts = ImportOptions {
            clear_existing: false,
            ..ImportOptions::default()
        };
        let mut task = ImportTask::new(seeded(&["old"]), opts);
        task.run(&text[..], None, &ProgressSender::disabled(), &CancellationToken::new())
            .unwrap();
        assert_eq!(task.store().len(), 2);
    }

    #[test]
    fn cancelled_before_start_leaves_store_alone() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut task = ImportTask::new(seeded(&["old"]), ImportOptions::default());
        let report = task
            .run(&b"[\n]\n"[..], None, &ProgressSender::disabled(), &cancel)
            .unwrap();
        assert_eq!(report.outcome, Outcome::Cancelled);
        assert_eq!(task.store().len(), 1);
    }

    #[test]
    fn spawned_task_reports_done() {
        let handle = spawn_export(
            ExportTask::new(seeded(&["a"]), ExportOptions::default()),
            Vec::new(),
        )
        .unwrap();
        let events: Vec<_> = handle.events().iter().collect();
        assert!(events.last().unwrap().is_complete());

        let finished = handle.join().unwrap();
        assert_eq!(finished.report.unwrap().records_written, 1);
        assert_eq!(finished.task.store().len(), 1);
    }
}
