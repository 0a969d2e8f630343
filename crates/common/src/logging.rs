//! Structured logging
//!
//! A single `tracing` subscriber is installed per process by [`init`]. It
//! writes to the console and to a size-bounded rotating log file. Code never
//! reaches for that subscriber directly: it receives a [`Logger`] handle from
//! its fixture and logs through it, so the handle can carry per-test context.

use file_rotate::compression::Compression;
use file_rotate::suffix::AppendCount;
use file_rotate::{ContentLimit, FileRotate};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::Result;

/// Tracing target used for every event emitted through [`Logger`]
pub const LOG_TARGET: &str = "surfcheck";

static INIT: OnceCell<()> = OnceCell::new();

// Dropping the guard flushes the background file writer
static FILE_GUARD: Mutex<Option<WorkerGuard>> = parking_lot::const_mutex(None);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Directory holding the log file and its rotated generations
    pub dir: PathBuf,

    /// Active log file name
    pub file_name: String,

    /// Minimum level written
    pub level: LogLevel,

    /// Size at which the active file is rotated
    pub max_bytes: u64,

    /// Number of rotated files kept next to the active one
    pub max_files: usize,

    /// Also log to stdout
    pub console: bool,

    /// Write the file sink as JSON lines
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
            file_name: "test-execution.log".to_string(),
            level: LogLevel::Info,
            max_bytes: 5 * 1024 * 1024,
            max_files: 5,
            console: true,
            json: false,
        }
    }
}

impl LogConfig {
    pub fn file_path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }
}

/// Install the process-wide subscriber. Only the first call does anything;
/// the subscriber is never replaced.
///
/// Logging never stops a run: when the log file cannot be opened the
/// console layer is still installed and a warning names the path.
pub fn init(config: &LogConfig) {
    INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

        let (file_layer, file_error) = match file_sink(config) {
            Ok(sink) => {
                let (writer, guard) = tracing_appender::non_blocking(sink);
                *FILE_GUARD.lock() = Some(guard);
                let layer = if config.json {
                    fmt::layer()
                        .json()
                        .with_writer(writer)
                        .with_ansi(false)
                        .boxed()
                } else {
                    fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_target(false)
                        .boxed()
                };
                (Some(layer), None)
            }
            Err(e) => (None, Some(e)),
        };

        let console_layer = config
            .console
            .then(|| fmt::layer().with_target(false).boxed());

        // Someone else may already own the global subscriber, e.g. a test binary.
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(console_layer)
            .try_init();

        if let Some(e) = file_error {
            tracing::warn!(
                target: LOG_TARGET,
                "Log file {} unavailable, logging to console only: {}",
                config.file_path().display(),
                e
            );
        }
    });
}

/// Flush and close the log file. Lines logged afterwards reach the console
/// only.
pub fn shutdown() {
    drop(FILE_GUARD.lock().take());
}

/// Size and count bounded log file: `file_name` is cut at `max_bytes` and
/// the last `max_files` generations are kept as `file_name.1`, `file_name.2`, ...
pub fn file_sink(config: &LogConfig) -> Result<FileRotate<AppendCount>> {
    std::fs::create_dir_all(&config.dir)?;
    let path = config.file_path();
    // Fail here rather than dropping every line later
    OpenOptions::new().create(true).append(true).open(&path)?;

    Ok(FileRotate::new(
        path,
        AppendCount::new(config.max_files),
        ContentLimit::Bytes(config.max_bytes.max(1) as usize),
        Compression::None,
        #[cfg(unix)]
        None,
    ))
}

/// Logging handle handed to fixtures, page objects and the reporter
#[derive(Debug, Clone)]
pub struct Logger {
    scope: Arc<str>,
    test: Option<Arc<str>>,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(LOG_TARGET)
    }
}

impl Logger {
    pub fn new(scope: &str) -> Self {
        Self {
            scope: Arc::from(scope),
            test: None,
        }
    }

    /// Derive a handle that tags every line with `test`
    pub fn for_test(&self, test: &str) -> Self {
        Self {
            scope: self.scope.clone(),
            test: Some(Arc::from(test)),
        }
    }

    /// Derive a handle for a sub-component, keeping the test tag
    pub fn scoped(&self, scope: &str) -> Self {
        Self {
            scope: Arc::from(scope),
            test: self.test.clone(),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn test(&self) -> Option<&str> {
        self.test.as_deref()
    }

    pub fn log(&self, level: LogLevel, message: &str, metadata: Option<&serde_json::Value>) {
        let scope = &*self.scope;
        let test = self.test.as_deref().unwrap_or("-");
        let metadata = metadata.map(|m| m.to_string()).unwrap_or_default();
        let metadata = metadata.as_str();

        match level {
            LogLevel::Trace => tracing::trace!(target: LOG_TARGET, scope, test, metadata, "{}", message),
            LogLevel::Debug => tracing::debug!(target: LOG_TARGET, scope, test, metadata, "{}", message),
            LogLevel::Info => tracing::info!(target: LOG_TARGET, scope, test, metadata, "{}", message),
            LogLevel::Warn => tracing::warn!(target: LOG_TARGET, scope, test, metadata, "{}", message),
            LogLevel::Error => tracing::error!(target: LOG_TARGET, scope, test, metadata, "{}", message),
        }
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Debug, message.as_ref(), None);
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Info, message.as_ref(), None);
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Warn, message.as_ref(), None);
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Error, message.as_ref(), None);
    }

    pub fn info_with(&self, message: impl AsRef<str>, metadata: &serde_json::Value) {
        self.log(LogLevel::Info, message.as_ref(), Some(metadata));
    }

    pub fn error_with(&self, message: impl AsRef<str>, metadata: &serde_json::Value) {
        self.log(LogLevel::Error, message.as_ref(), Some(metadata));
    }

    pub fn pass(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Info, &format!("PASS: {}", message.as_ref()), None);
    }

    pub fn fail(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Error, &format!("FAIL: {}", message.as_ref()), None);
    }

    pub fn step(&self, name: impl AsRef<str>) {
        self.log(LogLevel::Info, &format!("STEP: {}", name.as_ref()), None);
    }
}
