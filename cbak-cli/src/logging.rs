//! Log subscriber for the `cbak` binary
//!
//! Logs go to stderr so progress bars and `ls` output on stdout stay clean.
//! `CBAK_LOG` takes any `EnvFilter` directive; without it the level follows
//! the `-v` count.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::error::{CliError, CliResult};

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "CBAK_LOG";

fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Build the filter from `CBAK_LOG`, falling back to the verbosity level.
pub fn filter(verbosity: u8) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)))
}

/// Install the global subscriber.
pub fn init(verbosity: u8) -> CliResult<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbosity > 1)
                .with_thread_names(verbosity > 1),
        )
        .with(filter(verbosity))
        .try_init()
        .map_err(|e| CliError::Logging(e.to_string()))
}
