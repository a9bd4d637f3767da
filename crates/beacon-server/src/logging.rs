//! Tracing setup for beacon-server.
//!
//! On a gateway the server runs under systemd: records go to daily JSON
//! files and a plain stdout stream for the journal. At a desk they go to a
//! pretty stdout stream only.

use std::path::PathBuf;
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Prefix of the daily log files.
const LOG_FILE_PREFIX: &str = "beacon-presence";

/// Used when neither `RUST_LOG` nor `BEACON_LOG_LEVEL` is set. BlueZ
/// discovery chatter stays at warn.
const DEFAULT_DIRECTIVE: &str = "info,bluer=warn";

// Dropping a guard stops its writer.
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();
static STDOUT_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Where log records go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMode {
    /// Daily JSON files plus journal-friendly stdout.
    Gateway,
    /// Pretty stdout with span timings.
    Desk,
}

impl LogMode {
    /// Mode selected by `BEACON_ENV`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::parse(std::env::var("BEACON_ENV").ok().as_deref())
    }

    fn parse(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.eq_ignore_ascii_case("production") => Self::Gateway,
            _ => Self::Desk,
        }
    }
}

/// Install the global subscriber.
///
/// The filter is `RUST_LOG` if set, else `BEACON_LOG_LEVEL`, else
/// `info` with BlueZ at `warn`.
///
/// # Errors
///
/// Fails on an unparsable filter, or in gateway mode when the log
/// directory cannot be created.
pub fn init(mode: LogMode) -> anyhow::Result<()> {
    let directive =
        std::env::var("BEACON_LOG_LEVEL").unwrap_or_else(|_| DEFAULT_DIRECTIVE.to_string());
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&directive))?;

    match mode {
        LogMode::Gateway => init_gateway(filter),
        LogMode::Desk => {
            init_desk(filter);
            Ok(())
        }
    }
}

fn init_gateway(filter: EnvFilter) -> anyhow::Result<()> {
    let log_dir = log_directory();
    std::fs::create_dir_all(&log_dir)?;

    let files = RollingFileAppender::new(Rotation::DAILY, &log_dir, LOG_FILE_PREFIX);
    let (file_writer, file_guard) = tracing_appender::non_blocking(files);
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    // Device and card fields land as JSON keys.
    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(file_writer)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    // journald adds its own timestamps.
    let journal_layer = tracing_subscriber::fmt::layer()
        .compact()
        .without_time()
        .with_writer(stdout_writer)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(journal_layer)
        .init();

    let _ = FILE_GUARD.set(file_guard);
    let _ = STDOUT_GUARD.set(stdout_guard);
    Ok(())
}

fn init_desk(filter: EnvFilter) {
    // Span close events show how long each scan and fan-out took.
    let stdout_layer = tracing_subscriber::fmt::layer()
        .pretty()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE);

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .init();
}

fn log_directory() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/var/log/beacon-presence")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "beacon-presence")
            .map(|dirs| dirs.data_dir().join("logs"))
            .unwrap_or_else(|| PathBuf::from("./logs"))
    }
}
