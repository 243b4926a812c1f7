//! Record store collaborator interface
//!
//! The engine never talks to a concrete database. Stores expose rows as
//! [`RawRow`]s (column name to [`FieldValue`]) and accept the same shape on
//! insert; [`crate::mapping`] translates between rows and [`Record`]s.
//!
//! [`Record`]: cbak_format::Record

use std::collections::BTreeMap;
use std::fmt;

use cbak_format::{lenient, CbakError};
use thiserror::Error;

/// Column holding the store-assigned identifier.
pub const ID_COLUMN: &str = "id";

/// A single column value as stored.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// SQL-style NULL
    Null,
    /// Signed integer
    Integer(i64),
    /// Floating point
    Real(f64),
    /// UTF-8 text
    Text(String),
    /// Raw bytes
    Blob(Vec<u8>),
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Integer(i64::from(value))
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(value: Vec<u8>) -> Self {
        FieldValue::Blob(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(FieldValue::Null, Into::into)
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        FieldValue::Integer(i64::from(value))
    }
}

/// One store row: an ordered list of named column values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    columns: Vec<(String, FieldValue)>,
}

impl RawRow {
    /// Empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`RawRow::set`].
    pub fn with(mut self, column: &str, value: impl Into<FieldValue>) -> Self {
        self.set(column, value);
        self
    }

    /// Set `column`, replacing any previous value.
    pub fn set(&mut self, column: &str, value: impl Into<FieldValue>) {
        let value = value.into();
        match self.columns.iter_mut().find(|(name, _)| name == column) {
            Some(slot) => slot.1 = value,
            None => self.columns.push((column.to_string(), value)),
        }
    }

    /// Value of `column`, if present.
    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Columns in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Store-assigned identifier, when the row carries one.
    pub fn id(&self) -> Option<i64> {
        match self.get(ID_COLUMN) {
            Some(FieldValue::Integer(id)) => Some(*id),
            _ => None,
        }
    }

    fn invalid(column: &str, reason: impl Into<String>) -> CbakError {
        CbakError::InvalidField {
            field: column.to_string(),
            reason: reason.into(),
        }
    }

    /// Column as text; numbers keep their textual form. Missing means `None`.
    pub fn text(&self, column: &str) -> cbak_format::Result<Option<String>> {
        match self.get(column) {
            None | Some(FieldValue::Null) => Ok(None),
            Some(FieldValue::Text(s)) => Ok(Some(s.clone())),
            Some(FieldValue::Integer(i)) => Ok(Some(i.to_string())),
            Some(FieldValue::Real(f)) => Ok(Some(f.to_string())),
            Some(FieldValue::Blob(_)) => Err(Self::invalid(column, "expected text, found blob")),
        }
    }

    /// Column as a signed integer.
    pub fn integer(&self, column: &str) -> cbak_format::Result<Option<i64>> {
        match self.get(column) {
            None | Some(FieldValue::Null) => Ok(None),
            Some(FieldValue::Integer(i)) => Ok(Some(*i)),
            Some(FieldValue::Real(f)) if f.fract() != 0.0 => {
                Err(Self::invalid(column, format!("{f} is not an integer")))
            }
            // i64::MAX as f64 rounds up to 2^63, hence the strict bound.
            Some(FieldValue::Real(f)) if *f >= i64::MIN as f64 && *f < i64::MAX as f64 => Ok(Some(*f as i64)),
            Some(FieldValue::Real(f)) => Err(Self::invalid(column, format!("{f} is out of integer range"))),
            Some(FieldValue::Text(s)) => {
                lenient::parse_integer(s).map_err(|reason| Self::invalid(column, reason))
            }
            Some(FieldValue::Blob(_)) => Err(Self::invalid(column, "expected integer, found blob")),
        }
    }

    /// Column as an unsigned counter.
    pub fn counter(&self, column: &str) -> cbak_format::Result<Option<u32>> {
        match self.integer(column)? {
            None => Ok(None),
            Some(n) => u32::try_from(n)
                .map(Some)
                .map_err(|_| Self::invalid(column, format!("counter {n} out of range"))),
        }
    }

    /// Column as a flag (non-zero integers are true).
    pub fn flag(&self, column: &str) -> cbak_format::Result<Option<bool>> {
        match self.get(column) {
            None | Some(FieldValue::Null) => Ok(None),
            Some(FieldValue::Integer(i)) => Ok(Some(*i != 0)),
            Some(FieldValue::Text(s)) => {
                lenient::parse_flag(s).map_err(|reason| Self::invalid(column, reason))
            }
            Some(other) => Err(Self::invalid(column, format!("expected flag, found {other:?}"))),
        }
    }

    /// Column as raw bytes; text is taken as its UTF-8 bytes.
    pub fn blob(&self, column: &str) -> cbak_format::Result<Option<Vec<u8>>> {
        match self.get(column) {
            None | Some(FieldValue::Null) => Ok(None),
            Some(FieldValue::Blob(bytes)) => Ok(Some(bytes.clone())),
            Some(FieldValue::Text(s)) => Ok(Some(s.clone().into_bytes())),
            Some(other) => Err(Self::invalid(column, format!("expected blob, found {other:?}"))),
        }
    }
}

/// Child collections hanging off a base record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChildKind {
    /// Email, postal, IM entries
    ContactMethod,
    /// Phone numbers
    Phone,
    /// Organization memberships
    Organization,
    /// Photo blobs
    Photo,
}

impl ChildKind {
    /// Every child kind, in record serialization order.
    pub const ALL: [ChildKind; 4] = [
        ChildKind::ContactMethod,
        ChildKind::Phone,
        ChildKind::Organization,
        ChildKind::Photo,
    ];

    /// Collection name, matching the backup field name.
    pub fn name(&self) -> &'static str {
        match self {
            ChildKind::ContactMethod => cbak_format::constants::CONTACT_METHODS,
            ChildKind::Phone => cbak_format::constants::PHONE_NUMBERS,
            ChildKind::Organization => cbak_format::constants::ORGANIZATIONS,
            ChildKind::Photo => cbak_format::constants::PHOTOS,
        }
    }
}

impl fmt::Display for ChildKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors reported by a store implementation
#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced parent record does not exist.
    #[error("record {0} not found")]
    NotFound(i64),
    /// The store refused the row.
    #[error("insert rejected: {0}")]
    Rejected(String),
    /// The underlying storage failed.
    #[error("storage failure: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    /// Wrap a backend error.
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StoreError::Backend(Box::new(err))
    }
}

impl From<StoreError> for CbakError {
    fn from(err: StoreError) -> Self {
        CbakError::Store(err.to_string())
    }
}

/// Store result alias
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Lazy iterator over base rows.
pub type RowIter<'a> = Box<dyn Iterator<Item = StoreResult<RawRow>> + 'a>;

/// The external record store.
pub trait ContactStore {
    /// Number of base records.
    fn count(&self) -> StoreResult<u64>;

    /// Every base record in ascending identifier order, fetched lazily.
    ///
    /// Rows carry the store identifier in [`ID_COLUMN`].
    fn iterate_all(&self) -> StoreResult<RowIter<'_>>;

    /// Child rows of `kind` belonging to `parent_id`, in store order.
    fn query_children(&self, parent_id: i64, kind: ChildKind) -> StoreResult<Vec<RawRow>>;

    /// Create a base record; returns the identifier the store assigned.
    fn insert_record(&mut self, fields: &RawRow) -> StoreResult<i64>;

    /// Attach a child row to `parent_id`.
    fn insert_child(&mut self, parent_id: i64, kind: ChildKind, fields: &RawRow) -> StoreResult<()>;

    /// Remove every base record and its children; returns how many base
    /// records were removed.
    fn delete_all(&mut self) -> StoreResult<u64>;
}

impl<S: ContactStore + ?Sized> ContactStore for &mut S {
    fn count(&self) -> StoreResult<u64> {
        (**self).count()
    }

    fn iterate_all(&self) -> StoreResult<RowIter<'_>> {
        (**self).iterate_all()
    }

    fn query_children(&self, parent_id: i64, kind: ChildKind) -> StoreResult<Vec<RawRow>> {
        (**self).query_children(parent_id, kind)
    }

    fn insert_record(&mut self, fields: &RawRow) -> StoreResult<i64> {
        (**self).insert_record(fields)
    }

    fn insert_child(&mut self, parent_id: i64, kind: ChildKind, fields: &RawRow) -> StoreResult<()> {
        (**self).insert_child(parent_id, kind, fields)
    }

    fn delete_all(&mut self) -> StoreResult<u64> {
        (**self).delete_all()
    }
}

/// In-process store, mostly for tests and dry runs.
///
/// Identifiers are assigned sequentially and never reused, so a re-imported
/// record gets a different identifier than it had in the backup.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    next_id: i64,
    records: BTreeMap<i64, RawRow>,
    children: BTreeMap<(i64, ChildKind), Vec<RawRow>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Empty store whose first identifier is 1.
    pub fn new() -> Self {
        Self::with_first_id(1)
    }

    /// Empty store whose first identifier is `first_id`.
    pub fn with_first_id(first_id: i64) -> Self {
        Self {
            next_id: first_id,
            records: BTreeMap::new(),
            children: BTreeMap::new(),
        }
    }

    /// Number of base records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Identifiers in ascending order.
    pub fn ids(&self) -> Vec<i64> {
        self.records.keys().copied().collect()
    }

    /// Base row for `id`.
    pub fn record(&self, id: i64) -> Option<&RawRow> {
        self.records.get(&id)
    }

    /// Child rows of `kind` for `id`.
    pub fn children(&self, id: i64, kind: ChildKind) -> &[RawRow] {
        self.children
            .get(&(id, kind))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Identifier of the first record whose `name` column equals `name`.
    pub fn find_by_name(&self, name: &str) -> Option<i64> {
        self.records.iter().find_map(|(id, row)| match row.get("name") {
            Some(FieldValue::Text(n)) if n == name => Some(*id),
            _ => None,
        })
    }
}

impl ContactStore for MemoryStore {
    fn count(&self) -> StoreResult<u64> {
        Ok(self.records.len() as u64)
    }

    fn iterate_all(&self) -> StoreResult<RowIter<'_>> {
        Ok(Box::new(self.records.values().cloned().map(Ok)))
    }

    fn query_children(&self, parent_id: i64, kind: ChildKind) -> StoreResult<Vec<RawRow>> {
        if !self.records.contains_key(&parent_id) {
            return Err(StoreError::NotFound(parent_id));
        }
        Ok(self.children(parent_id, kind).to_vec())
    }

    fn insert_record(&mut self, fields: &RawRow) -> StoreResult<i64> {
        let id = self.next_id;
        self.next_id += 1;

        let mut row = RawRow::new().with(ID_COLUMN, id);
        for (column, value) in fields.iter().filter(|(column, _)| *column != ID_COLUMN) {
            row.set(column, value.clone());
        }
        self.records.insert(id, row);
        Ok(id)
    }

    fn insert_child(&mut self, parent_id: i64, kind: ChildKind, fields: &RawRow) -> StoreResult<()> {
        if !self.records.contains_key(&parent_id) {
            return Err(StoreError::NotFound(parent_id));
        }
        self.children
            .entry((parent_id, kind))
            .or_default()
            .push(fields.clone());
        Ok(())
    }

    fn delete_all(&mut self) -> StoreResult<u64> {
        let removed = self.records.len() as u64;
        self.records.clear();
        self.children.clear();
        Ok(removed)
    }
}
