//! Console and session logging.
//!
//! The console shows warnings by default. With `--log-file` every command sent to the monitor
//! and every answer is recorded as JSON, so a failed upload can be replayed line by line.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use indicatif::MultiProgress;
use parking_lot::Mutex;
use tracing::level_filters::LevelFilter as TracingLevel;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

/// Messages are printed above this while an upload is in progress.
static PROGRESS_BAR: LazyLock<Mutex<Option<MultiProgress>>> = LazyLock::new(|| Mutex::new(None));

/// Targets recorded in the session log. The monitor module traces the wire conversation.
const SESSION_DIRECTIVES: &str = "warn,hudsonbug=debug,hudsonbug::monitor=trace";

/// Console level when neither `--log-level` nor `RUST_LOG` is given.
const DEFAULT_CONSOLE_LEVEL: TracingLevel = TracingLevel::WARN;

/// Keeps the session log open. Pending lines are flushed when this is dropped.
pub struct SessionLog {
    _writer: WorkerGuard,
    path: PathBuf,
}

impl SessionLog {
    fn new(writer: WorkerGuard, path: &Path) -> Self {
        tracing::info!("Recording the monitor session to {}", path.display());

        Self {
            _writer: writer,
            path: path.to_owned(),
        }
    }
}

impl Drop for SessionLog {
    fn drop(&mut self) {
        tracing::info!("Monitor session recorded in {}", self.path.display());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[clap(rename_all = "UPPER")]
pub enum LevelFilter {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LevelFilter> for TracingLevel {
    fn from(level: LevelFilter) -> Self {
        match level {
            LevelFilter::Off => TracingLevel::OFF,
            LevelFilter::Error => TracingLevel::ERROR,
            LevelFilter::Warn => TracingLevel::WARN,
            LevelFilter::Info => TracingLevel::INFO,
            LevelFilter::Debug => TracingLevel::DEBUG,
            LevelFilter::Trace => TracingLevel::TRACE,
        }
    }
}

fn console_filter(level: Option<LevelFilter>) -> EnvFilter {
    let builder = EnvFilter::builder();
    match level {
        Some(level) => builder
            .with_default_directive(TracingLevel::from(level).into())
            .parse_lossy(""),
        None => builder
            .with_default_directive(DEFAULT_CONSOLE_LEVEL.into())
            .from_env_lossy(),
    }
}

fn session_filter() -> EnvFilter {
    EnvFilter::builder().parse_lossy(SESSION_DIRECTIVES)
}

/// Log lines go through the progress bar, which adds its own line ending.
struct ConsoleWriter;

impl std::io::Write for ConsoleWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let line = String::from_utf8_lossy(buf);
        eprintln(line.trim_end_matches(['\r', '\n']));
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Installs the console logger and, if `session_path` is given, the session log.
///
/// `level` overrides `RUST_LOG` for the console.
pub fn setup_logging(
    session_path: Option<&Path>,
    level: Option<LevelFilter>,
) -> anyhow::Result<Option<SessionLog>> {
    let console = tracing_subscriber::fmt::layer()
        .compact()
        .without_time()
        .with_writer(|| ConsoleWriter)
        .with_filter(console_filter(level));

    let Some(path) = session_path else {
        tracing_subscriber::registry().with(console).init();
        return Ok(None);
    };

    let file = File::create(path)?;

    // Lossless, a dropped line would leave a gap in the wire conversation.
    let (writer, guard) = tracing_appender::non_blocking::NonBlockingBuilder::default()
        .lossy(false)
        .buffered_lines_limit(128 * 1024)
        .finish(file);

    let session = tracing_subscriber::fmt::layer()
        .json()
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(writer)
        .with_filter(session_filter());

    tracing_subscriber::registry()
        .with(console)
        .with(session)
        .init();

    Ok(Some(SessionLog::new(guard, path)))
}

/// Shows `progress` until [`clear_progress_bar`] is called.
pub fn set_progress_bar(progress: MultiProgress) {
    *PROGRESS_BAR.lock() = Some(progress);
}

pub fn clear_progress_bar() {
    *PROGRESS_BAR.lock() = None;
}

fn print_above_progress(message: &str, to_stderr: bool) {
    let progress = PROGRESS_BAR.lock();
    match progress.as_ref() {
        Some(progress) => {
            let _ = progress.println(message);
        }
        None if to_stderr => eprintln!("{message}"),
        None => println!("{message}"),
    }
}

/// Prints a line to stdout, above the progress bar if one is shown.
pub fn println(message: impl AsRef<str>) {
    print_above_progress(message.as_ref(), false);
}

/// Prints a line to stderr, above the progress bar if one is shown.
pub fn eprintln(message: impl AsRef<str>) {
    print_above_progress(message.as_ref(), true);
}
