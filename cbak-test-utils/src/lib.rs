//! cbak Test Utilities
//!
//! Shared fixtures and I/O doubles for the cbak test suites.

use std::io::{self, Read, Write};

use cbak_format::{ContactMethod, Organization, PhoneNumber, Photo, Record};
use serde_json::{Map, Value};

/// Builder for raw JSON objects, for backups a writer would never produce
pub struct ObjectBuilder {
    fields: Map<String, Value>,
}

impl ObjectBuilder {
    /// Create an empty object builder
    pub fn new() -> Self {
        Self { fields: Map::new() }
    }

    /// Add a field with a string value
    pub fn string(mut self, key: &str, value: &str) -> Self {
        self.fields
            .insert(key.to_string(), Value::String(value.to_string()));
        self
    }

    /// Add a field with an integer value
    pub fn int(mut self, key: &str, value: i64) -> Self {
        self.fields.insert(key.to_string(), Value::Number(value.into()));
        self
    }

    /// Add a field with a boolean value
    pub fn bool(mut self, key: &str, value: bool) -> Self {
        self.fields.insert(key.to_string(), Value::Bool(value));
        self
    }

    /// Add a field with a null value
    pub fn null(mut self, key: &str) -> Self {
        self.fields.insert(key.to_string(), Value::Null);
        self
    }

    /// Add a field with an array value
    pub fn array(mut self, key: &str, value: Vec<Value>) -> Self {
        self.fields.insert(key.to_string(), Value::Array(value));
        self
    }

    /// Build the object
    pub fn build(self) -> Value {
        Value::Object(self.fields)
    }
}

impl Default for ObjectBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Alice: one primary phone, one email, a photo.
pub fn alice() -> Record {
    Record {
        id: Some(1),
        name: Some("Alice".into()),
        display_name: Some("Alice Liddell".into()),
        starred: Some(true),
        times_contacted: Some(12),
        last_time_contacted: Some(1_262_304_000_000),
        contact_methods: vec![ContactMethod {
            is_primary: true,
            kind: Some("1".into()),
            kind_type: Some("1".into()),
            data: Some("alice@example.org".into()),
            ..ContactMethod::default()
        }],
        phone_numbers: vec![PhoneNumber {
            is_primary: true,
            number: Some("123".into()),
            number_key: Some("321".into()),
            phone_type: Some("2".into()),
            ..PhoneNumber::default()
        }],
        photos: vec![Photo(vec![0x89, b'P', b'N', b'G', 0, 1, 2, 3])],
        ..Record::default()
    }
}

/// Bob: no children, notes with characters that need escaping.
pub fn bob() -> Record {
    Record {
        id: Some(2),
        name: Some("Bob".into()),
        notes: Some("likes {braces} and \"quotes\"\nacross lines".into()),
        send_to_voicemail: Some(false),
        organizations: vec![Organization {
            company: Some("Acme".into()),
            title: Some("Engineer".into()),
            ..Organization::default()
        }],
        ..Record::default()
    }
}

/// `count` distinct records with varied children.
pub fn sample_records(count: usize) -> Vec<Record> {
    (0..count)
        .map(|i| {
            let mut record = Record::named(format!("Contact {i}"));
            record.id = Some(i as i64 + 1);
            record.times_contacted = Some(i as u32);
            if i % 2 == 0 {
                record.phone_numbers.push(PhoneNumber {
                    number: Some(format!("555-{i:04}")),
                    ..PhoneNumber::default()
                });
            }
            if i % 3 == 0 {
                record.photos.push(Photo(vec![i as u8; 16]));
            }
            record
        })
        .collect()
}

/// Render `objects` as a backup document with the array grammar.
pub fn backup_text(objects: &[Value]) -> String {
    let mut text = String::from("[\n");
    for (idx, object) in objects.iter().enumerate() {
        if idx > 0 {
            text.push_str(",\n");
        }
        text.push_str(&serde_json::to_string_pretty(object).unwrap_or_default());
    }
    text.push_str("]\n");
    text
}

/// Reader that hands out at most `chunk` bytes per call.
pub struct ChunkedReader<R> {
    inner: R,
    chunk: usize,
}

impl<R: Read> ChunkedReader<R> {
    /// Wrap `inner`, limiting each read to `chunk` bytes (at least one).
    pub fn new(inner: R, chunk: usize) -> Self {
        Self {
            inner,
            chunk: chunk.max(1),
        }
    }
}

impl<R: Read> Read for ChunkedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let len = buf.len().min(self.chunk);
        self.inner.read(&mut buf[..len])
    }
}

/// Writer that fails once `limit` bytes have been accepted.
#[derive(Debug, Default)]
pub struct FailingWriter {
    /// Bytes accepted before the failure.
    pub written: Vec<u8>,
    limit: usize,
}

impl FailingWriter {
    /// Accept `limit` bytes, then fail every write.
    pub fn new(limit: usize) -> Self {
        Self {
            written: Vec::new(),
            limit,
        }
    }
}

impl Write for FailingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let room = self.limit.saturating_sub(self.written.len());
        if room == 0 {
            return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
        }
        let len = buf.len().min(room);
        self.written.extend_from_slice(&buf[..len]);
        Ok(len)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Reader that yields `prefix` and then fails.
pub struct FailingReader {
    prefix: io::Cursor<Vec<u8>>,
}

impl FailingReader {
    /// Serve `prefix`, then return an I/O error.
    pub fn new(prefix: impl Into<Vec<u8>>) -> Self {
        Self {
            prefix: io::Cursor::new(prefix.into()),
        }
    }
}

impl Read for FailingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.prefix.read(buf)? {
            0 => Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection reset")),
            n => Ok(n),
        }
    }
}
