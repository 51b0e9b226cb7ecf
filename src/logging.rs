use std::io;
use std::path::PathBuf;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

const DEFAULT_MAX_LOG_FILES: usize = 5;
const DEFAULT_FILTER: &str = "info";
const LOG_FILE_PREFIX: &str = "webhook";

pub const ENV_LOG_DIR: &str = "LOG_DIR";
pub const ENV_LOG_FORMAT: &str = "LOG_FORMAT";

/// Where and how log lines are written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogSettings {
    /// Also write daily-rotated files here when set.
    pub directory: Option<PathBuf>,
    /// Emit JSON lines on the console instead of plain text.
    pub json: bool,
}

impl LogSettings {
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            directory: lookup(ENV_LOG_DIR)
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            json: lookup(ENV_LOG_FORMAT).is_some_and(|v| v.trim().eq_ignore_ascii_case("json")),
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

pub struct FileLogger {
    log_directory: PathBuf,
    max_files: usize,
    rotation: Rotation,
}

impl FileLogger {
    pub fn new(log_directory: PathBuf) -> Self {
        Self {
            log_directory,
            max_files: DEFAULT_MAX_LOG_FILES,
            rotation: Rotation::DAILY,
        }
    }

    pub fn with_max_files(mut self, max_files: usize) -> Self {
        self.max_files = max_files;
        self
    }

    /// Creates the log directory and a non-blocking writer into it. The guard
    /// must be held for as long as lines should be flushed.
    pub fn setup_file_logging(&self) -> io::Result<(NonBlocking, WorkerGuard)> {
        std::fs::create_dir_all(&self.log_directory)?;

        let file_appender = RollingFileAppender::builder()
            .rotation(self.rotation.clone())
            .filename_prefix(LOG_FILE_PREFIX)
            .filename_suffix("log")
            .max_log_files(self.max_files)
            .build(&self.log_directory)
            .map_err(io::Error::other)?;

        Ok(tracing_appender::non_blocking(file_appender))
    }
}

/// Installs the global subscriber. Returns the file writer's guard when file
/// logging is enabled; the caller keeps it alive.
pub fn setup_logging(settings: &LogSettings) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let console: Box<dyn Layer<Registry> + Send + Sync> = if settings.json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    let mut layers = vec![console];
    let mut guard = None;
    let mut file_error = None;

    if let Some(dir) = &settings.directory {
        match FileLogger::new(dir.clone()).setup_file_logging() {
            Ok((writer, file_guard)) => {
                layers.push(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false) // Disable ANSI colors for file logs
                        .boxed(),
                );
                guard = Some(file_guard);
            }
            Err(e) => file_error = Some(e),
        }
    }

    if tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .is_err()
    {
        eprintln!("A global tracing subscriber is already installed");
    }

    if let (Some(dir), Some(e)) = (&settings.directory, file_error) {
        tracing::warn!("File logging to {} disabled: {}", dir.display(), e);
    }

    guard
}
