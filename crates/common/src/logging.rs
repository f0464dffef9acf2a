//! Logging and tracing initialization.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// Crates a bare level in [`LoggingConfig::level`] applies to. Anything
/// else only logs warnings.
const SEQSYNTH_TARGETS: [&str; 4] = [
    "seqsynth",
    "seqsynth_common",
    "seqsynth_sequence_model",
    "seqsynth_render_engine",
];

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides `config.level` when set. Output goes to
/// `config.file` (appended, without ANSI colors) when one is configured
/// and can be opened, otherwise to stdout. Only the first call installs a
/// subscriber.
pub fn init_logging(config: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(&config.level)));

    let mut file_error = None;
    let (writer, ansi) = match config.file.as_deref().map(open_log_file) {
        Some(Ok(file)) => (BoxMakeWriter::new(Mutex::new(file)), false),
        Some(Err(e)) => {
            file_error = Some(e);
            (BoxMakeWriter::new(std::io::stdout), true)
        }
        None => (BoxMakeWriter::new(std::io::stdout), true),
    };

    let builder = fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(writer)
        .with_ansi(ansi);
    let installed = if config.json {
        tracing::subscriber::set_global_default(builder.json().finish()).is_ok()
    } else {
        tracing::subscriber::set_global_default(builder.with_target(true).finish()).is_ok()
    };

    if let (true, Some(e), Some(path)) = (installed, file_error, &config.file) {
        tracing::warn!(path = %path.display(), error = %e, "Could not open log file; logging to stdout");
    }
}

/// Initialize logging with defaults (useful for tests and quick scripts).
pub fn init_default_logging() {
    init_logging(&LoggingConfig::default());
}

/// `config` with its level raised to `debug` when `verbose` is set.
pub fn logging_for_verbosity(config: &LoggingConfig, verbose: bool) -> LoggingConfig {
    let mut config = config.clone();
    if verbose {
        config.level = "debug".to_string();
    }
    config
}

/// Expand a level into filter directives.
///
/// A bare level such as `debug` applies to the SeqSynth crates with
/// `warn` for dependencies; anything already containing directives is
/// used as is.
pub fn filter_directives(level: &str) -> String {
    let level = level.trim();
    if level.contains('=') || level.contains(',') {
        return level.to_string();
    }
    let level = if level.is_empty() { "info" } else { level };

    std::iter::once("warn".to_string())
        .chain(
            SEQSYNTH_TARGETS
                .iter()
                .map(|target| format!("{target}={level}")),
        )
        .collect::<Vec<_>>()
        .join(",")
}

fn open_log_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}
