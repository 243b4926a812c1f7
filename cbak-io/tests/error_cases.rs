//! Failure handling across export and import

use cbak_io::store::RowIter;
use cbak_io::{
    mapping, progress_channel, CancellationToken, CbakError, ChildKind, ContactStore, ExportOptions, ExportTask,
    ImportOptions, ImportTask, Limits, MemoryStore, Outcome, ProgressEvent, RawRow, ReaderOptions, StoreError,
    StoreResult,
};
use cbak_test_utils::{alice, backup_text, bob, sample_records, FailingReader, FailingWriter, ObjectBuilder};
use serde_json::json;

/// Store that refuses records with a given name.
struct PickyStore {
    inner: MemoryStore,
    refuse: &'static str,
}

impl ContactStore for PickyStore {
    fn count(&self) -> StoreResult<u64> {
        self.inner.count()
    }

    fn iterate_all(&self) -> StoreResult<RowIter<'_>> {
        self.inner.iterate_all()
    }

    fn query_children(&self, parent_id: i64, kind: ChildKind) -> StoreResult<Vec<RawRow>> {
        self.inner.query_children(parent_id, kind)
    }

    fn insert_record(&mut self, fields: &RawRow) -> StoreResult<i64> {
        if fields.text("name").ok().flatten().as_deref() == Some(self.refuse) {
            return Err(StoreError::Rejected(format!("{} is not welcome", self.refuse)));
        }
        self.inner.insert_record(fields)
    }

    fn insert_child(&mut self, parent_id: i64, kind: ChildKind, fields: &RawRow) -> StoreResult<()> {
        if kind == ChildKind::Photo {
            return Err(StoreError::Rejected("photos disabled".into()));
        }
        self.inner.insert_child(parent_id, kind, fields)
    }

    fn delete_all(&mut self) -> StoreResult<u64> {
        self.inner.delete_all()
    }
}

fn run_import<S: ContactStore>(store: S, text: &str) -> (cbak_io::Result<cbak_io::ImportReport>, Vec<ProgressEvent>, S) {
    let (tx, rx) = progress_channel();
    let mut task = ImportTask::new(store, ImportOptions::default());
    let result = task.run(text.as_bytes(), Some(text.len() as u64), &tx, &CancellationToken::new());
    drop(tx);
    (result, rx.iter().collect(), task.into_store())
}

fn errors(events: &[ProgressEvent]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::Error { message } => Some(message.as_str()),
            _ => None,
        })
        .collect()
}

#[test]
fn malformed_object_is_skipped_and_reported() {
    let text = "[\n{\"name\": \"Alice\"},\n{\"name\": \"Broken\", \"starred\": },\n{\"name\": \"Bob\"}]\n";
    let (result, events, store) = run_import(MemoryStore::new(), text);

    let report = result.unwrap();
    assert_eq!(report.records_restored, 2);
    assert_eq!(report.records_failed, 1);
    assert!(store.find_by_name("Alice").is_some());
    assert!(store.find_by_name("Bob").is_some());
    assert_eq!(errors(&events).len(), 1);
    assert!(events.last().unwrap().is_complete());
}

#[test]
fn unterminated_string_between_records_is_skipped() {
    let text = "[\n{\"name\": \"Alice\"},\n{\"name\": \"Broken},\n{\"name\": \"Bob\"}\n]\n";
    let (result, events, store) = run_import(MemoryStore::new(), text);

    let report = result.unwrap();
    assert_eq!(report.outcome, Outcome::Completed);
    assert_eq!(report.records_restored, 2);
    assert_eq!(report.records_failed, 1);
    assert!(store.find_by_name("Alice").is_some());
    assert!(store.find_by_name("Bob").is_some());
    assert_eq!(errors(&events).len(), 1);
    assert!(events.last().unwrap().is_complete());
}

#[test]
fn undecodable_photo_fails_only_its_record() {
    let objects = vec![
        ObjectBuilder::new()
            .string("name", "Alice")
            .array("photos", vec![json!("not base64 at all!")])
            .build(),
        ObjectBuilder::new().string("name", "Bob").null("photos").build(),
    ];
    let (result, events, store) = run_import(MemoryStore::new(), &backup_text(&objects));

    let report = result.unwrap();
    assert_eq!(report.records_failed, 1);
    assert_eq!(report.records_restored, 1);
    assert!(store.find_by_name("Alice").is_none());
    assert!(store.find_by_name("Bob").is_some());
    assert_eq!(errors(&events).len(), 1);
}

#[test]
fn legacy_string_fields_are_accepted() {
    let objects = vec![ObjectBuilder::new()
        .string("name", "Carol")
        .string("starred", "1")
        .string("times_contacted", "3")
        .int("send_to_voicemail", 0)
        .bool("unknown_extra", true)
        .build()];
    let (result, _, store) = run_import(MemoryStore::new(), &backup_text(&objects));

    assert_eq!(result.unwrap().records_restored, 1);
    let id = store.find_by_name("Carol").unwrap();
    let record = mapping::load_record(&store, store.record(id).unwrap()).unwrap();
    assert_eq!(record.starred, Some(true));
    assert_eq!(record.times_contacted, Some(3));
    assert_eq!(record.send_to_voicemail, Some(false));
}

#[test]
fn unbalanced_input_is_terminal() {
    let text = "[\n{\"name\": \"Alice\"},\n{\"name\": \"Bob\", \"phone_numbers\": [{\"number\": \"1\"}]\n";
    let (result, events, store) = run_import(MemoryStore::new(), text);

    let err = result.unwrap_err();
    assert!(matches!(err, CbakError::UnbalancedInput { depth: 1, .. }));
    // Records completed before the truncation stay restored.
    assert!(store.find_by_name("Alice").is_some());

    let last = events.last().unwrap();
    assert!(matches!(last, ProgressEvent::Error { message } if message.contains("Unbalanced")));
    assert!(events.iter().any(ProgressEvent::is_complete));
}

#[test]
fn store_refusals_skip_the_record() {
    let mut seed = MemoryStore::new();
    for record in [alice(), bob()] {
        mapping::store_record(&mut seed, &record).unwrap();
    }
    let mut bytes = Vec::new();
    cbak_io::export_contacts(&mut seed, &mut bytes, ExportOptions::default()).unwrap();
    let text = String::from_utf8(bytes).unwrap();

    let picky = PickyStore {
        inner: MemoryStore::new(),
        refuse: "Bob",
    };
    let (result, events, store) = run_import(picky, &text);

    let report = result.unwrap();
    assert_eq!(report.records_restored, 1);
    assert_eq!(report.records_rejected, 1);
    // Alice's photo was refused but Alice herself was kept.
    assert_eq!(report.children_failed, 1);
    assert_eq!(store.inner.len(), 1);

    let messages = errors(&events);
    assert!(messages.iter().any(|m| m.contains("Bob is not welcome")));
    assert!(messages.iter().any(|m| m.contains("photos disabled")));
    assert!(!events.iter().any(|e| matches!(e, ProgressEvent::RecordNamed { name } if name == "Bob")));
}

#[test]
fn oversized_record_is_skipped() {
    let big = "x".repeat(4096);
    let objects = vec![
        ObjectBuilder::new().string("name", "Alice").build(),
        ObjectBuilder::new().string("name", "Huge").string("notes", &big).build(),
        ObjectBuilder::new().string("name", "Bob").build(),
    ];
    let text = backup_text(&objects);

    let opts = ImportOptions {
        reader: ReaderOptions {
            limits: Limits {
                max_record_bytes: 1024,
                ..Limits::default()
            },
            ..ReaderOptions::default()
        },
        ..ImportOptions::default()
    };
    let mut task = ImportTask::new(MemoryStore::new(), opts);
    let report = task
        .run(text.as_bytes(), None, &cbak_io::ProgressSender::disabled(), &CancellationToken::new())
        .unwrap();

    assert_eq!(report.records_restored, 2);
    assert_eq!(report.records_failed, 1);
    assert!(task.store().find_by_name("Huge").is_none());
}

#[test]
fn read_failure_is_terminal() {
    let (tx, rx) = progress_channel();
    let mut task = ImportTask::new(MemoryStore::new(), ImportOptions::default());
    let err = task
        .run(
            FailingReader::new("[\n{\"name\": \"Alice\"},\n{\"na"),
            None,
            &tx,
            &CancellationToken::new(),
        )
        .unwrap_err();
    drop(tx);

    assert!(matches!(err, CbakError::Io(_)));
    assert_eq!(task.store().len(), 1);
    let events: Vec<_> = rx.iter().collect();
    assert!(matches!(events.last(), Some(ProgressEvent::Error { .. })));
}

#[test]
fn write_failure_keeps_flushed_records() {
    let mut store = MemoryStore::new();
    for record in sample_records(10) {
        mapping::store_record(&mut store, &record).unwrap();
    }

    let (tx, rx) = progress_channel();
    let mut sink = FailingWriter::new(600);
    let err = ExportTask::new(&mut store, ExportOptions::default())
        .run(&mut sink, &tx, &CancellationToken::new())
        .unwrap_err();
    drop(tx);

    assert!(matches!(err, CbakError::Io(_)));
    let text = String::from_utf8(sink.written).unwrap();
    assert!(text.starts_with("[\n{"));
    assert!(text.contains("\"Contact 0\""));

    let events: Vec<_> = rx.iter().collect();
    assert!(matches!(events.last(), Some(ProgressEvent::Error { message }) if message.contains("export failed")));
    assert!(!events.iter().any(ProgressEvent::is_complete));
}

/// Store that trips a cancellation token on its nth insert.
struct CancellingStore {
    inner: MemoryStore,
    token: CancellationToken,
    after: usize,
}

impl ContactStore for CancellingStore {
    fn count(&self) -> StoreResult<u64> {
        self.inner.count()
    }

    fn iterate_all(&self) -> StoreResult<RowIter<'_>> {
        self.inner.iterate_all()
    }

    fn query_children(&self, parent_id: i64, kind: ChildKind) -> StoreResult<Vec<RawRow>> {
        self.inner.query_children(parent_id, kind)
    }

    fn insert_record(&mut self, fields: &RawRow) -> StoreResult<i64> {
        let id = self.inner.insert_record(fields)?;
        if self.inner.len() == self.after {
            self.token.cancel();
        }
        Ok(id)
    }

    fn insert_child(&mut self, parent_id: i64, kind: ChildKind, fields: &RawRow) -> StoreResult<()> {
        self.inner.insert_child(parent_id, kind, fields)
    }

    fn delete_all(&mut self) -> StoreResult<u64> {
        self.inner.delete_all()
    }
}

#[test]
fn cancelled_import_keeps_restored_records() {
    let mut seed = MemoryStore::new();
    for record in sample_records(50) {
        mapping::store_record(&mut seed, &record).unwrap();
    }
    let mut bytes = Vec::new();
    cbak_io::export_contacts(&mut seed, &mut bytes, ExportOptions::default()).unwrap();

    let cancel = CancellationToken::new();
    let store = CancellingStore {
        inner: MemoryStore::new(),
        token: cancel.clone(),
        after: 3,
    };
    let (tx, rx) = progress_channel();
    let mut task = ImportTask::new(store, ImportOptions::default());
    let report = task
        .run(bytes.as_slice(), Some(bytes.len() as u64), &tx, &cancel)
        .unwrap();
    drop(tx);

    assert_eq!(report.outcome, Outcome::Cancelled);
    assert_eq!(report.records_restored, 3);
    assert!(report.bytes_read < bytes.len() as u64);
    assert_eq!(task.store().inner.len(), 3);

    // No completion event after a cancel.
    let events: Vec<_> = rx.iter().collect();
    assert!(!events.iter().any(ProgressEvent::is_complete));
}

/// Store that trips a cancellation token while loading one record's children.
struct CancelOnLoad {
    inner: MemoryStore,
    token: CancellationToken,
    parent: i64,
}

impl ContactStore for CancelOnLoad {
    fn count(&self) -> StoreResult<u64> {
        self.inner.count()
    }

    fn iterate_all(&self) -> StoreResult<RowIter<'_>> {
        self.inner.iterate_all()
    }

    fn query_children(&self, parent_id: i64, kind: ChildKind) -> StoreResult<Vec<RawRow>> {
        if parent_id == self.parent {
            self.token.cancel();
        }
        self.inner.query_children(parent_id, kind)
    }

    fn insert_record(&mut self, fields: &RawRow) -> StoreResult<i64> {
        self.inner.insert_record(fields)
    }

    fn insert_child(&mut self, parent_id: i64, kind: ChildKind, fields: &RawRow) -> StoreResult<()> {
        self.inner.insert_child(parent_id, kind, fields)
    }

    fn delete_all(&mut self) -> StoreResult<u64> {
        self.inner.delete_all()
    }
}

#[test]
fn cancelled_export_writes_a_closed_prefix() {
    let mut inner = MemoryStore::new();
    for record in sample_records(10) {
        mapping::store_record(&mut inner, &record).unwrap();
    }

    // The record being loaded when the token trips is still written.
    let cancel = CancellationToken::new();
    let store = CancelOnLoad {
        inner,
        token: cancel.clone(),
        parent: 4,
    };
    let (tx, rx) = progress_channel();
    let mut out = Vec::new();
    let report = ExportTask::new(store, ExportOptions::default())
        .run(&mut out, &tx, &cancel)
        .unwrap();
    drop(tx);

    assert_eq!(report.outcome, Outcome::Cancelled);
    assert_eq!(report.records_written, 4);
    assert_eq!(report.records_total, 10);

    let parsed: Vec<serde_json::Value> = serde_json::from_slice(&out).unwrap();
    assert_eq!(parsed.len(), 4);
    let names: Vec<&str> = parsed.iter().filter_map(|v| v["name"].as_str()).collect();
    assert_eq!(names, vec!["Contact 0", "Contact 1", "Contact 2", "Contact 3"]);

    let events: Vec<_> = rx.iter().collect();
    assert!(!events.iter().any(ProgressEvent::is_complete));
}
