//! cbak CLI - Command-line tool for contact backups
//!
//! This binary provides command-line interfaces for:
//! - export: contacts database → backup file
//! - import: backup file → contacts database
//! - ls: list the records in a backup file

mod config;
mod error;
mod logging;
mod sqlite_store;

use cbak_format::{CbakError, Record};
use cbak_io::{
    spawn_export, spawn_import, BackupReader, CancellationToken, Disposition, ExportOptions, ExportReport,
    ExportTask, ImportOptions, ImportReport, ImportTask, ProgressEvent, ProgressSender, ReaderOptions,
    ScanSummary, TaskHandle,
};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tracing::info;

use crate::config::{Settings, CONFIG_ENV};
use crate::error::{CliError, CliResult};
use crate::sqlite_store::SqliteStore;

#[derive(Parser)]
#[command(name = "cbak")]
#[command(about = "Streaming contact backup and restore")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true, env = CONFIG_ENV)]
    config: Option<PathBuf>,
    /// More log output (-v info, -vv debug); CBAK_LOG overrides
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write every contact in the database to a backup file
    ///
    /// Examples:
    ///   cbak export --db contacts.db -o backup.json
    ///   cbak export --force --progress
    Export {
        /// Contacts database
        #[arg(long)]
        db: Option<PathBuf>,
        /// Backup file to create
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Overwrite an existing backup file
        #[arg(long)]
        force: bool,
        /// Show a progress bar while exporting
        #[arg(long)]
        progress: bool,
    },
    /// Restore contacts from a backup file, replacing the database contents
    Import {
        /// Contacts database
        #[arg(long)]
        db: Option<PathBuf>,
        /// Backup file to read
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Add to the existing contacts instead of replacing them
        #[arg(long)]
        keep_existing: bool,
        /// Show a progress bar while importing
        #[arg(long)]
        progress: bool,
    },
    /// List the records in a backup file without touching a database
    Ls {
        /// Backup file to read
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Output format (table, json)
        #[arg(long, value_enum, default_value_t = LsFormat::Table)]
        format: LsFormat,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum LsFormat {
    Table,
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = logging::init(cli.verbose) {
        eprintln!("warning: {err}");
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> CliResult<()> {
    let config = cli.config.as_deref();
    match cli.command {
        Commands::Export {
            db,
            output,
            force,
            progress,
        } => {
            let settings = config::settings(config, db, output)?;
            handle_export(&settings, force, progress)?;
        }
        Commands::Import {
            db,
            input,
            keep_existing,
            progress,
        } => {
            let settings = config::settings(config, db, input)?;
            handle_import(&settings, keep_existing, progress)?;
        }
        Commands::Ls { input, format } => {
            let settings = config::settings(config, None, input)?;
            let stdout = std::io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            let summary = handle_ls(&settings.backup_file, &settings.reader, format, &mut out)?;
            out.flush().map_err(CbakError::from)?;
            if summary.records_failed > 0 {
                eprintln!("{} unreadable record(s) skipped", summary.records_failed);
            }
        }
    }
    Ok(())
}

fn handle_export(settings: &Settings, force: bool, show_progress: bool) -> CliResult<ExportReport> {
    let start = Instant::now();
    let output = &settings.backup_file;
    if output.exists() && !force {
        return Err(CliError::BackupExists(output.clone()));
    }

    info!(database = %settings.database.display(), output = %output.display(), "starting export");
    let store = SqliteStore::open(&settings.database)?;
    let file = File::create(output).map_err(|e| CliError::file(output, e))?;
    let task = ExportTask::new(
        store,
        ExportOptions {
            writer: settings.writer.clone(),
        },
    );

    let handle = spawn_export(task, file)?;
    let progress_bar = show_progress.then(|| create_bar("Exporting contacts", "{pos}/{len} contacts"));
    let warnings = drain_events(&handle, progress_bar.as_ref());
    let report = handle.join()?.report?;

    let elapsed = start.elapsed();
    if let Some(pb) = progress_bar {
        pb.finish_with_message(format!("Exported {} contacts in {:.2?}", report.records_written, elapsed));
    }
    report_export_summary(&report, output, elapsed, warnings)?;
    Ok(report)
}

fn handle_import(settings: &Settings, keep_existing: bool, show_progress: bool) -> CliResult<ImportReport> {
    let start = Instant::now();
    let input = &settings.backup_file;
    let file = File::open(input).map_err(|e| CliError::file(input, e))?;
    let total = file.metadata().map(|m| m.len()).ok();

    info!(database = %settings.database.display(), input = %input.display(), total, "starting import");
    let store = SqliteStore::open(&settings.database)?;
    let task = ImportTask::new(
        store,
        ImportOptions {
            reader: settings.reader.clone(),
            clear_existing: !keep_existing,
        },
    );

    let handle = spawn_import(task, file, total)?;
    let progress_bar = show_progress.then(|| create_bar("Importing contacts", "{bytes}/{total_bytes}"));
    let warnings = drain_events(&handle, progress_bar.as_ref());
    let report = handle.join()?.report?;

    let elapsed = start.elapsed();
    if let Some(pb) = progress_bar {
        pb.finish_with_message(format!("Imported {} contacts in {:.2?}", report.records_restored, elapsed));
    }
    report_import_summary(&report, input, elapsed, warnings)?;
    Ok(report)
}

/// Forward task events to the progress bar until the task hangs up.
///
/// Returns the number of error events seen.
fn drain_events<R, T>(handle: &TaskHandle<R, T>, progress_bar: Option<&ProgressBar>) -> u64 {
    let mut warnings = 0;
    for event in handle.events().iter() {
        match (event, progress_bar) {
            (ProgressEvent::Error { message }, pb) => {
                warnings += 1;
                if let Some(pb) = pb {
                    pb.println(format!("warning: {message}"));
                }
            }
            (
                ProgressEvent::BytesProgress { position, total }
                | ProgressEvent::RecordProgress { position, total },
                Some(pb),
            ) => {
                pb.set_length(total);
                pb.set_position(position);
            }
            (ProgressEvent::RecordNamed { name }, Some(pb)) => pb.set_message(name),
            (_, None) => {}
        }
    }
    warnings
}

fn report_export_summary(
    report: &ExportReport,
    output: &Path,
    elapsed: Duration,
    warnings: u64,
) -> CliResult<()> {
    let mut stderr = std::io::stderr().lock();
    writeln!(
        &mut stderr,
        "Exported to {} (contacts: {}, skipped: {}, bytes written: {}, warnings: {}, elapsed: {:.2?}, outcome: {:?})",
        output.display(),
        report.records_written,
        report.records_skipped,
        report.bytes_written,
        warnings,
        elapsed,
        report.outcome
    )
    .map_err(CbakError::from)?;
    Ok(())
}

fn report_import_summary(
    report: &ImportReport,
    input: &Path,
    elapsed: Duration,
    warnings: u64,
) -> CliResult<()> {
    let mut stderr = std::io::stderr().lock();
    writeln!(
        &mut stderr,
        "Imported from {} (contacts: {}, replaced: {}, rejected: {}, unreadable: {}, bytes read: {}, warnings: {}, elapsed: {:.2?}, outcome: {:?})",
        input.display(),
        report.records_restored,
        report.records_cleared,
        report.records_rejected,
        report.records_failed,
        report.bytes_read,
        warnings,
        elapsed,
        report.outcome
    )
    .map_err(CbakError::from)?;
    Ok(())
}

#[derive(Debug, Clone, serde::Serialize)]
struct RecordSummary {
    position: u64,
    id: Option<i64>,
    label: String,
    contact_methods: usize,
    phone_numbers: usize,
    organizations: usize,
    photos: usize,
}

impl RecordSummary {
    fn new(position: u64, record: &Record) -> Self {
        Self {
            position,
            id: record.id,
            label: record.label(),
            contact_methods: record.contact_methods.len(),
            phone_numbers: record.phone_numbers.len(),
            organizations: record.organizations.len(),
            photos: record.photos.len(),
        }
    }
}

/// Stream `input` and describe each record. Table rows are written as
/// records arrive; JSON output is written once the scan completes.
fn handle_ls(
    input: &Path,
    reader_opts: &ReaderOptions,
    format: LsFormat,
    writer: &mut dyn Write,
) -> CliResult<ScanSummary> {
    let file = File::open(input).map_err(|e| CliError::file(input, e))?;
    let total = file.metadata().map(|m| m.len()).ok();
    let reader = BackupReader::new(reader_opts.clone())?;

    if format == LsFormat::Table {
        writeln!(writer, "#\tId\tName\tMethods\tPhones\tOrgs\tPhotos").map_err(CbakError::from)?;
    }

    let mut collected = Vec::new();
    let mut position = 0u64;
    let mut sink = |record: Record| -> cbak_format::Result<Disposition> {
        let summary = RecordSummary::new(position, &record);
        position += 1;
        match format {
            LsFormat::Table => print_ls_row(&mut *writer, &summary)?,
            LsFormat::Json => collected.push(summary),
        }
        Ok(Disposition::Accepted)
    };
    let summary = reader.read_all(
        file,
        total,
        &mut sink,
        &ProgressSender::disabled(),
        &CancellationToken::new(),
    )?;

    if format == LsFormat::Json {
        print_ls_json(writer, &collected, &summary)?;
    }
    Ok(summary)
}

fn print_ls_row(writer: &mut dyn Write, summary: &RecordSummary) -> std::io::Result<()> {
    writeln!(
        writer,
        "{}\t{}\t{}\t{}\t{}\t{}\t{}",
        summary.position,
        summary.id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string()),
        summary.label,
        summary.contact_methods,
        summary.phone_numbers,
        summary.organizations,
        summary.photos
    )
}

fn print_ls_json(writer: &mut dyn Write, records: &[RecordSummary], scan: &ScanSummary) -> CliResult<()> {
    let mut root = serde_json::Map::new();
    root.insert(
        "records".to_string(),
        serde_json::to_value(records).map_err(CbakError::from)?,
    );
    root.insert("bytes_read".to_string(), scan.bytes_read.into());
    root.insert("unreadable".to_string(), scan.records_failed.into());

    serde_json::to_writer_pretty(&mut *writer, &serde_json::Value::Object(root)).map_err(CbakError::from)?;
    writeln!(writer).map_err(CbakError::from)?;
    Ok(())
}

fn create_bar(message: &str, counter: &str) -> ProgressBar {
    let pb = ProgressBar::new(0);
    let template = format!("{{spinner:.green}} [{{elapsed_precise}}] {{bar:40.cyan/blue}} {counter} {{msg}}");
    pb.set_style(ProgressStyle::with_template(&template).unwrap_or_else(|_| ProgressStyle::default_bar()));
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
