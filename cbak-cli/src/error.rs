//! CLI error type

use std::path::PathBuf;

use cbak_format::CbakError;
use thiserror::Error;

/// Failures surfaced by the `cbak` binary
#[derive(Debug, Error)]
pub enum CliError {
    /// Engine failure.
    #[error(transparent)]
    Engine(#[from] CbakError),
    /// SQLite failure outside the store interface (open, migrate).
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// The database schema is newer than this binary.
    #[error("database schema version {found} is newer than supported version {supported}")]
    UnsupportedSchema {
        /// Version recorded in the database.
        found: u32,
        /// Latest version this binary knows.
        supported: u32,
    },
    /// Local file access failed.
    #[error("{}: {source}", path.display())]
    File {
        /// File being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// Configuration file could not be parsed or is invalid.
    #[error("invalid configuration in {}: {reason}", path.display())]
    Config {
        /// Configuration file.
        path: PathBuf,
        /// What was wrong.
        reason: String,
    },
    /// Export target already exists and `--force` was not given.
    #[error("{} already exists; pass --force to overwrite it", .0.display())]
    BackupExists(PathBuf),
    /// Logging could not be installed.
    #[error("failed to initialize logging: {0}")]
    Logging(String),
}

impl CliError {
    /// Attach `path` to an I/O error.
    pub fn file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CliError::File {
            path: path.into(),
            source,
        }
    }
}

/// CLI result alias
pub type CliResult<T> = std::result::Result<T, CliError>;
