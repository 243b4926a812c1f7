//! SQLite-backed contact store
//!
//! # Invariants
//! - Connections have `foreign_keys=ON`, so deleting a contact removes its
//!   children.
//! - Iteration is keyset paginated on `id`; at most one page of base rows is
//!   held in memory.
//! - Identifiers come from `AUTOINCREMENT` and are never reused.

use std::collections::VecDeque;
use std::path::Path;
use std::time::{Duration, Instant};

use cbak_format::constants as col;
use cbak_io::store::{ChildKind, ContactStore, FieldValue, RawRow, RowIter, StoreError, StoreResult, ID_COLUMN};
use rusqlite::types::{Value, ValueRef};
use rusqlite::{params, params_from_iter, Connection, Row};
use tracing::{debug, info};

use crate::error::{CliError, CliResult};

/// Base rows fetched per page.
const PAGE_SIZE: i64 = 64;

const CONTACTS_TABLE: &str = "contacts";

const CONTACT_COLUMNS: &[&str] = &[
    col::NAME,
    col::CUSTOM_RING_TONE,
    col::DISPLAY_NAME,
    col::LAST_TIME_CONTACTED,
    col::NOTES,
    col::PHONETIC_NAME,
    col::SEND_TO_VOICEMAIL,
    col::STARRED,
    col::TIMES_CONTACTED,
];

const SELECT_PAGE: &str = "SELECT id, name, custom_ring_tone, display_name, last_time_contacted, notes, \
     phonetic_name, send_to_voicemail, starred, times_contacted \
     FROM contacts WHERE id > ?1 ORDER BY id LIMIT ?2";

fn child_columns(kind: ChildKind) -> &'static [&'static str] {
    match kind {
        ChildKind::ContactMethod => &[col::IS_PRIMARY, col::LABEL, col::TYPE, col::AUX_DATA, col::DATA, col::KIND],
        ChildKind::Phone => &[col::IS_PRIMARY, col::LABEL, col::NUMBER, col::NUMBER_KEY, col::TYPE],
        ChildKind::Organization => &[col::IS_PRIMARY, col::LABEL, col::TITLE, col::COMPANY, col::TYPE],
        ChildKind::Photo => &[col::DATA],
    }
}

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    sql: include_str!("migrations/0001_init.sql"),
}];

/// Latest schema version this binary knows.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

fn apply_migrations(conn: &mut Connection) -> CliResult<()> {
    let current = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    let latest = latest_version();

    if current > latest {
        return Err(CliError::UnsupportedSchema {
            found: current,
            supported: latest,
        });
    }
    if current == latest {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        tx.execute_batch(migration.sql)?;
        tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))?;
        debug!(version = migration.version, "applied migration");
    }
    tx.commit()?;
    Ok(())
}

/// Contact store over a SQLite database.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and migrate it.
    pub fn open(path: impl AsRef<Path>) -> CliResult<Self> {
        let path = path.as_ref();
        let started_at = Instant::now();
        let conn = Connection::open(path)?;
        let store = Self::bootstrap(conn)?;
        info!(
            path = %path.display(),
            duration_ms = started_at.elapsed().as_millis() as u64,
            "database opened"
        );
        Ok(store)
    }

    /// Open a migrated in-memory database.
    pub fn open_in_memory() -> CliResult<Self> {
        Self::bootstrap(Connection::open_in_memory()?)
    }

    fn bootstrap(mut conn: Connection) -> CliResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        apply_migrations(&mut conn)?;
        Ok(Self { conn })
    }

    fn insert(&self, table: &str, allowed: &[&str], parent: Option<i64>, fields: &RawRow) -> StoreResult<i64> {
        let mut columns: Vec<&str> = Vec::with_capacity(fields.len() + 1);
        let mut values: Vec<Value> = Vec::with_capacity(fields.len() + 1);

        if let Some(parent_id) = parent {
            columns.push("contact_id");
            values.push(Value::Integer(parent_id));
        }
        for (name, value) in fields.iter() {
            if name == ID_COLUMN {
                continue;
            }
            let Some(column) = allowed.iter().find(|column| **column == name) else {
                return Err(StoreError::Rejected(format!("{table} has no column '{name}'")));
            };
            columns.push(*column);
            values.push(to_sql(value));
        }

        let sql = if columns.is_empty() {
            format!("INSERT INTO {table} DEFAULT VALUES")
        } else {
            let names = columns
                .iter()
                .map(|c| format!("\"{c}\""))
                .collect::<Vec<_>>()
                .join(", ");
            let placeholders = (1..=columns.len())
                .map(|i| format!("?{i}"))
                .collect::<Vec<_>>()
                .join(", ");
            format!("INSERT INTO {table} ({names}) VALUES ({placeholders})")
        };

        self.conn
            .execute(&sql, params_from_iter(values))
            .map_err(StoreError::backend)?;
        Ok(self.conn.last_insert_rowid())
    }
}

fn to_sql(value: &FieldValue) -> Value {
    match value {
        FieldValue::Null => Value::Null,
        FieldValue::Integer(i) => Value::Integer(*i),
        FieldValue::Real(f) => Value::Real(*f),
        FieldValue::Text(s) => Value::Text(s.clone()),
        FieldValue::Blob(b) => Value::Blob(b.clone()),
    }
}

fn read_row(row: &Row<'_>, names: &[String]) -> rusqlite::Result<RawRow> {
    let mut out = RawRow::new();
    for (idx, name) in names.iter().enumerate() {
        let value = match row.get_ref(idx)? {
            ValueRef::Null => FieldValue::Null,
            ValueRef::Integer(i) => FieldValue::Integer(i),
            ValueRef::Real(f) => FieldValue::Real(f),
            ValueRef::Text(t) => FieldValue::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => FieldValue::Blob(b.to_vec()),
        };
        out.set(name, value);
    }
    Ok(out)
}

/// Keyset-paginated walk over `contacts`.
struct PagedRows<'a> {
    conn: &'a Connection,
    after: i64,
    page: VecDeque<RawRow>,
    exhausted: bool,
}

impl PagedRows<'_> {
    fn fetch(&mut self) -> rusqlite::Result<()> {
        let conn = self.conn;
        let mut stmt = conn.prepare_cached(SELECT_PAGE)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let rows = stmt.query_map(params![self.after, PAGE_SIZE], |row| read_row(row, &names))?;

        let mut fetched = 0;
        for row in rows {
            let row = row?;
            if let Some(id) = row.id() {
                self.after = id;
            }
            self.page.push_back(row);
            fetched += 1;
        }
        if fetched < PAGE_SIZE {
            self.exhausted = true;
        }
        debug!(fetched, after = self.after, "fetched contact page");
        Ok(())
    }
}

impl Iterator for PagedRows<'_> {
    type Item = StoreResult<RawRow>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.page.is_empty() && !self.exhausted {
            if let Err(err) = self.fetch() {
                self.exhausted = true;
                return Some(Err(StoreError::backend(err)));
            }
        }
        self.page.pop_front().map(Ok)
    }
}

impl ContactStore for SqliteStore {
    fn count(&self) -> StoreResult<u64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM contacts", [], |row| row.get::<_, i64>(0))
            .map(|n| n as u64)
            .map_err(StoreError::backend)
    }

    fn iterate_all(&self) -> StoreResult<RowIter<'_>> {
        Ok(Box::new(PagedRows {
            conn: &self.conn,
            after: i64::MIN,
            page: VecDeque::new(),
            exhausted: false,
        }))
    }

    fn query_children(&self, parent_id: i64, kind: ChildKind) -> StoreResult<Vec<RawRow>> {
        let columns = child_columns(kind)
            .iter()
            .map(|c| format!("\"{c}\""))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("SELECT {columns} FROM {} WHERE contact_id = ?1 ORDER BY id", kind.name());

        let mut stmt = self.conn.prepare_cached(&sql).map_err(StoreError::backend)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let rows = stmt
            .query_map(params![parent_id], |row| read_row(row, &names))
            .map_err(StoreError::backend)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::backend)
    }

    fn insert_record(&mut self, fields: &RawRow) -> StoreResult<i64> {
        self.insert(CONTACTS_TABLE, CONTACT_COLUMNS, None, fields)
    }

    fn insert_child(&mut self, parent_id: i64, kind: ChildKind, fields: &RawRow) -> StoreResult<()> {
        self.insert(kind.name(), child_columns(kind), Some(parent_id), fields)
            .map(|_| ())
    }

    fn delete_all(&mut self) -> StoreResult<u64> {
        self.conn
            .execute("DELETE FROM contacts", [])
            .map(|n| n as u64)
            .map_err(StoreError::backend)
    }
}
