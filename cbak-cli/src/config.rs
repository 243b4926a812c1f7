//! TOML configuration for the `cbak` binary
//!
//! ```toml
//! database = "/var/lib/contacts.db"
//! backup_file = "/sdcard/contacts.json"
//! progress_interval_bytes = 4096
//! indent = 3
//!
//! [limits]
//! max_record_bytes = 33554432
//! ```
//!
//! Every key is optional. Command-line flags win over the file, the file wins
//! over built-in defaults.

use std::path::{Path, PathBuf};

use cbak_format::constants::{DEFAULT_BACKUP_FILE_NAME, DEFAULT_INDENT, DEFAULT_PROGRESS_INTERVAL_BYTES};
use cbak_format::Limits;
use cbak_io::{ReaderOptions, WriterOptions};
use serde::Deserialize;

use crate::error::{CliError, CliResult};

/// Default database file name.
pub const DEFAULT_DATABASE_FILE_NAME: &str = "contacts.db";

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "CBAK_CONFIG";

/// Contents of a config file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    database: Option<PathBuf>,
    backup_file: Option<PathBuf>,
    progress_interval_bytes: Option<u64>,
    indent: Option<usize>,
    limits: LimitsConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct LimitsConfig {
    max_record_bytes: Option<usize>,
    max_field_len: Option<usize>,
    max_photo_bytes: Option<usize>,
}

impl FileConfig {
    /// Read and parse `path`.
    pub fn load(path: &Path) -> CliResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| CliError::file(path, e))?;
        Self::parse(&text).map_err(|reason| CliError::Config {
            path: path.to_path_buf(),
            reason,
        })
    }

    fn parse(text: &str) -> Result<Self, String> {
        toml::from_str(text).map_err(|e| e.to_string())
    }
}

/// Fully resolved settings for one invocation.
#[derive(Debug, Clone)]
pub struct Settings {
    /// SQLite database path
    pub database: PathBuf,
    /// Backup file path
    pub backup_file: PathBuf,
    /// Writer options for export
    pub writer: WriterOptions,
    /// Reader options for import and ls
    pub reader: ReaderOptions,
}

impl Settings {
    /// Merge flags over `file` over defaults and validate the result.
    pub fn resolve(
        file: FileConfig,
        database: Option<PathBuf>,
        backup_file: Option<PathBuf>,
        origin: &Path,
    ) -> CliResult<Self> {
        let defaults = Limits::default();
        let limits = Limits {
            max_record_bytes: file.limits.max_record_bytes.unwrap_or(defaults.max_record_bytes),
            max_field_len: file.limits.max_field_len.unwrap_or(defaults.max_field_len),
            max_photo_bytes: file.limits.max_photo_bytes.unwrap_or(defaults.max_photo_bytes),
        };
        limits.validate().map_err(|e| CliError::Config {
            path: origin.to_path_buf(),
            reason: e.to_string(),
        })?;

        let interval = file
            .progress_interval_bytes
            .unwrap_or(DEFAULT_PROGRESS_INTERVAL_BYTES);
        if interval == 0 {
            return Err(CliError::Config {
                path: origin.to_path_buf(),
                reason: "progress_interval_bytes must be non-zero".to_string(),
            });
        }

        Ok(Self {
            database: database
                .or(file.database)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_FILE_NAME)),
            backup_file: backup_file
                .or(file.backup_file)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_BACKUP_FILE_NAME)),
            writer: WriterOptions {
                indent: file.indent.unwrap_or(DEFAULT_INDENT),
                limits: limits.clone(),
            },
            reader: ReaderOptions {
                progress_interval_bytes: interval,
                limits,
            },
        })
    }
}

/// Load the config file named by `path` (if any) and resolve settings.
pub fn settings(
    path: Option<&Path>,
    database: Option<PathBuf>,
    backup_file: Option<PathBuf>,
) -> CliResult<Settings> {
    match path {
        Some(path) => Settings::resolve(FileConfig::load(path)?, database, backup_file, path),
        None => Settings::resolve(FileConfig::default(), database, backup_file, Path::new("<defaults>")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_file() {
        let settings = settings(None, None, None).unwrap();
        assert_eq!(settings.database, PathBuf::from("contacts.db"));
        assert_eq!(settings.backup_file, PathBuf::from("contacts.json"));
        assert_eq!(settings.writer.indent, 3);
        assert_eq!(settings.reader.progress_interval_bytes, 100);
    }

    #[test]
    fn flags_override_file() {
        let file = FileConfig::parse(
            r#"
            database = "from-file.db"
            backup_file = "from-file.json"
            indent = 2

            [limits]
            max_field_len = 4096
            "#,
        )
        .unwrap();
        let settings = Settings::resolve(file, Some("flag.db".into()), None, Path::new("test.toml")).unwrap();
        assert_eq!(settings.database, PathBuf::from("flag.db"));
        assert_eq!(settings.backup_file, PathBuf::from("from-file.json"));
        assert_eq!(settings.writer.indent, 2);
        assert_eq!(settings.reader.limits.max_field_len, 4096);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(FileConfig::parse("databse = \"typo.db\"").is_err());
    }

    #[test]
    fn limits_are_validated() {
        let file = FileConfig::parse("[limits]\nmax_record_bytes = 0").unwrap();
        let err = Settings::resolve(file, None, None, Path::new("bad.toml")).unwrap_err();
        assert!(err.to_string().contains("bad.toml"));

        let file = FileConfig::parse("progress_interval_bytes = 0").unwrap();
        assert!(Settings::resolve(file, None, None, Path::new("bad.toml")).is_err());
    }

    #[test]
    fn missing_file_is_reported_with_path() {
        let err = FileConfig::load(Path::new("/nonexistent/cbak.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/cbak.toml"));
    }
}
