//! Tracing setup for the `discrip` binary.
//!
//! Jobs write a session log file (one per invocation) so every tool command,
//! fallback decision, and failure is on disk regardless of what the terminal
//! shows. Console output through `tracing` is only enabled with `--verbose`
//! or when `RUST_LOG` is set; the CLI prints job lines itself otherwise.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

/// Crates whose events are logged.
const LOG_TARGETS: [&str; 3] = ["discrip", "dr_av", "dr_core"];

/// Keeps the session log writer alive; drop it last.
#[derive(Debug)]
pub struct SessionLog {
    pub path: PathBuf,
    _guard: WorkerGuard,
}

/// File name for a session log started now.
pub fn session_file_name() -> String {
    format!("discrip-{}.log", chrono::Local::now().format("%Y%m%d-%H%M%S"))
}

fn filter_spec(level: &str) -> String {
    LOG_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

fn console_filter(verbose: bool) -> Option<EnvFilter> {
    match std::env::var("RUST_LOG") {
        Ok(spec) => Some(EnvFilter::new(spec)),
        Err(_) if verbose => Some(EnvFilter::new(filter_spec("debug"))),
        Err(_) => None,
    }
}

/// Install console-only logging (commands that run no job).
pub fn init_console(verbose: bool) -> Result<()> {
    let console = console_filter(verbose)
        .map(|filter| tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_filter(filter));

    tracing_subscriber::registry()
        .with(console)
        .try_init()
        .context("Failed to install tracing subscriber")
}

/// Install console logging plus an append-only session log file under
/// `config.dir`.
pub fn init_session(config: &LoggingConfig, verbose: bool) -> Result<SessionLog> {
    std::fs::create_dir_all(&config.dir)
        .with_context(|| format!("Failed to create log directory: {:?}", config.dir))?;

    let file_name = session_file_name();
    let path = config.dir.join(&file_name);
    let appender = tracing_appender::rolling::never(&config.dir, &file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let level = if verbose {
        "debug".to_string()
    } else {
        config.level.to_ascii_lowercase()
    };
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_filter(EnvFilter::new(filter_spec(&level)));

    let console = console_filter(verbose)
        .map(|filter| tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_filter(filter));

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(SessionLog {
        path,
        _guard: guard,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_file_name_pattern() {
        let name = session_file_name();
        assert!(name.starts_with("discrip-"));
        assert!(name.ends_with(".log"));
        // discrip-YYYYmmdd-HHMMSS.log
        assert_eq!(name.len(), "discrip-".len() + 15 + ".log".len());
    }

    #[test]
    fn filter_covers_all_crates() {
        assert_eq!(filter_spec("info"), "discrip=info,dr_av=info,dr_core=info");
    }
}
