//! Error types for cbak

use thiserror::Error;

/// cbak error types
#[derive(Debug, Error)]
pub enum CbakError {
    /// I/O operation failed while reading or writing the backup stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON parsing or serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// An embedded blob was not valid base64 text.
    #[error("Blob decode error: {0}")]
    BlobDecode(#[from] base64::DecodeError),
    /// Input ended while a top-level object was still open.
    #[error("Unbalanced input: object starting at byte {offset} still open at depth {depth} when the stream ended")]
    UnbalancedInput {
        /// Byte offset of the opening brace of the unterminated object.
        offset: u64,
        /// Brace depth at end of stream.
        depth: usize,
    },
    /// A text field exceeds the configured length limit.
    #[error("Field '{field}' is {len} bytes long (max: {max})")]
    FieldTooLong {
        /// Name of the offending field.
        field: &'static str,
        /// Actual length in bytes.
        len: usize,
        /// Configured maximum.
        max: usize,
    },
    /// A store column could not be interpreted as the expected field type.
    #[error("Invalid value for field '{field}': {reason}")]
    InvalidField {
        /// Name of the offending field.
        field: String,
        /// What was wrong with it.
        reason: String,
    },
    /// A configured limit was exceeded.
    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),
    /// The caller passed a record position outside the announced total.
    #[error("Record position {index} is out of range for a total of {total}")]
    PositionOutOfRange {
        /// Zero-based position supplied by the caller.
        index: u64,
        /// Total record count supplied by the caller.
        total: u64,
    },
    /// The record store failed.
    #[error("Store error: {0}")]
    Store(String),
    /// Internal invariant was violated.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, CbakError>;

impl CbakError {
    /// Whether this error only affects the record that produced it.
    ///
    /// Record-local failures are logged and the record is skipped; everything
    /// else aborts the current task.
    pub fn is_record_local(&self) -> bool {
        matches!(
            self,
            CbakError::Json(_)
                | CbakError::BlobDecode(_)
                | CbakError::FieldTooLong { .. }
                | CbakError::InvalidField { .. }
                | CbakError::LimitExceeded(_)
        )
    }
}
