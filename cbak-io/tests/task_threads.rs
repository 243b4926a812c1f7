//! Background tasks observed from another thread

use cbak_io::{
    mapping, spawn_export, spawn_import, ExportOptions, ExportTask, ImportOptions, ImportTask, MemoryStore, Outcome,
    ProgressEvent, TaskState,
};
use cbak_test_utils::{sample_records, ChunkedReader};
use std::io::Read;
use std::time::Duration;

fn seeded(count: usize) -> MemoryStore {
    let mut store = MemoryStore::new();
    for record in sample_records(count) {
        mapping::store_record(&mut store, &record).unwrap();
    }
    store
}

fn export_bytes(count: usize) -> Vec<u8> {
    let mut store = seeded(count);
    let mut out = Vec::new();
    cbak_io::export_contacts(&mut store, &mut out, ExportOptions::default()).unwrap();
    out
}

#[test]
fn export_progress_is_monotonic_and_completes() {
    let handle = spawn_export(ExportTask::new(seeded(40), ExportOptions::default()), Vec::new()).unwrap();

    let events: Vec<ProgressEvent> = handle.events().iter().collect();
    let positions: Vec<u64> = events.iter().filter_map(ProgressEvent::position).collect();
    assert_eq!(positions, (1..=40).collect::<Vec<_>>());
    assert!(events.last().unwrap().is_complete());
    assert_eq!(handle.state(), TaskState::Done);

    let finished = handle.join().unwrap();
    let report = finished.report.unwrap();
    assert_eq!(report.records_written, 40);
    assert_eq!(report.outcome, Outcome::Completed);
}

#[test]
fn import_reports_bytes_then_names() {
    let bytes = export_bytes(30);
    let len = bytes.len() as u64;
    let handle = spawn_import(
        ImportTask::new(MemoryStore::new(), ImportOptions::default()),
        ChunkedReader::new(std::io::Cursor::new(bytes), 37),
        Some(len),
    )
    .unwrap();

    let mut last_position = 0;
    let mut named = Vec::new();
    let mut completions = 0;
    for event in handle.events().iter() {
        match event {
            ProgressEvent::BytesProgress { position, total } => {
                assert!(position >= last_position);
                assert_eq!(total, len);
                last_position = position;
                if position == total {
                    completions += 1;
                }
            }
            ProgressEvent::RecordNamed { name } => named.push(name),
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_eq!(completions, 1);
    assert_eq!(last_position, len);
    assert_eq!(named.len(), 30);
    assert_eq!(named[0], "Contact 0");

    let finished = handle.join().unwrap();
    assert_eq!(finished.report.unwrap().records_restored, 30);
    assert_eq!(finished.task.store().len(), 30);
}

/// Source that blocks until told to continue, then serves `bytes`.
struct GatedReader {
    gate: std::sync::mpsc::Receiver<()>,
    inner: std::io::Cursor<Vec<u8>>,
    opened: bool,
}

impl Read for GatedReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if !self.opened {
            let _ = self.gate.recv();
            self.opened = true;
        }
        self.inner.read(buf)
    }
}

#[test]
fn cancel_through_handle_stops_import() {
    let (open, gate) = std::sync::mpsc::channel();
    let source = GatedReader {
        gate,
        inner: std::io::Cursor::new(export_bytes(10)),
        opened: false,
    };
    let handle = spawn_import(ImportTask::new(MemoryStore::new(), ImportOptions::default()), source, None).unwrap();

    std::thread::sleep(Duration::from_millis(10));
    assert_eq!(handle.state(), TaskState::Running);
    handle.cancel();
    open.send(()).unwrap();

    let events: Vec<_> = handle.events().iter().collect();
    assert!(events.is_empty());

    let finished = handle.join().unwrap();
    let report = finished.report.unwrap();
    assert_eq!(report.outcome, Outcome::Cancelled);
    assert_eq!(report.records_restored, 0);
    assert!(finished.task.store().is_empty());
}
