//! Logging setup.

use clap::ValueEnum;
use tracing_subscriber::{fmt, EnvFilter};

/// Output format of the installed subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Default filter directive for a verbosity level.
///
/// `verbose` raises the level from `warn` (0) through `info`, `debug` and
/// `trace`; `quiet` lowers it to `error` and then `off`.
#[must_use]
pub fn level_directive(verbose: u8, quiet: u8) -> &'static str {
    match (verbose, quiet) {
        (0, 0) => "warn",
        (0, 1) => "error",
        (0, _) => "off",
        (1, _) => "info",
        (2, _) => "debug",
        _ => "trace",
    }
}

/// Installs a global `tracing` subscriber.
///
/// `RUST_LOG` overrides the verbosity-derived filter. Returns `false` when a
/// subscriber was already installed, which makes repeated calls harmless.
pub fn init_logging(verbose: u8, quiet: u8, format: LogFormat) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_directive(verbose, quiet)));

    let builder = fmt().with_env_filter(filter).with_target(verbose > 1);
    let installed = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.is_ok()
}
