//! Structured logging.
//!
//! # Responsibilities
//! - Map level and sink names from the environment to typed settings
//! - Build the `tracing` dispatcher for the selected sink kind
//! - Scope composition logs to that dispatcher
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for the file sink, pretty format for the console
//! - Production defaults to INFO on console+file, everything else to
//!   DEBUG on the console

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;
use thiserror::Error;
use tracing::Dispatch;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::fmt as tracing_fmt;

use crate::config::env::Environment;

/// Directory under the project root holding file logs.
pub const LOG_DIR: &str = "logs";

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("cannot open log file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("file logging needs an existing project root, {0} is not a directory")]
    NoLogDir(PathBuf),

    #[error("a global logger is already installed")]
    AlreadyInstalled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Parse a level name (`DEBUG`, `info`, `WARNING`, `CRITICAL`, ...).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "TRACE" | "NOTSET" => Some(LogLevel::Trace),
            "DEBUG" => Some(LogLevel::Debug),
            "INFO" => Some(LogLevel::Info),
            "WARN" | "WARNING" => Some(LogLevel::Warn),
            "ERROR" | "CRITICAL" | "FATAL" => Some(LogLevel::Error),
            _ => None,
        }
    }

    pub fn as_filter(&self) -> LevelFilter {
        match self {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_filter())
    }
}

/// Where log lines go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoggerKind {
    Console,
    File,
    ConsoleFile,
}

impl LoggerKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "CONSOLE" => Some(LoggerKind::Console),
            "FILE" => Some(LoggerKind::File),
            "CONSOLE_FILE" => Some(LoggerKind::ConsoleFile),
            _ => None,
        }
    }

    fn console(&self) -> bool {
        matches!(self, LoggerKind::Console | LoggerKind::ConsoleFile)
    }

    fn file(&self) -> bool {
        matches!(self, LoggerKind::File | LoggerKind::ConsoleFile)
    }
}

/// Level and sink selection for one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogSettings {
    pub level: LogLevel,
    pub kind: LoggerKind,
    pub debug: bool,
}

impl LogSettings {
    /// Settings for `profile_name`, honoring `MIO_LOGGER_LEVEL` and
    /// `MIO_LOGGER_TYPE` when they name a known value.
    pub fn for_profile(profile_name: &str, env: &Environment) -> Self {
        let name = profile_name.replace('"', "").trim().to_lowercase();
        let production = name == "production";

        let level = env
            .get("MIO_LOGGER_LEVEL")
            .and_then(LogLevel::from_name)
            .unwrap_or(if production { LogLevel::Info } else { LogLevel::Debug });
        let kind = env
            .get("MIO_LOGGER_TYPE")
            .and_then(LoggerKind::from_name)
            .unwrap_or(if production {
                LoggerKind::ConsoleFile
            } else {
                LoggerKind::Console
            });

        Self {
            level,
            kind,
            debug: !production,
        }
    }
}

/// A log sink built for one composition.
pub struct Logger {
    name: String,
    level: LogLevel,
    kind: LoggerKind,
    file: Option<PathBuf>,
    dispatch: Dispatch,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.name)
            .field("level", &self.level)
            .field("kind", &self.kind)
            .field("file", &self.file)
            .finish()
    }
}

impl Logger {
    /// Build a sink. File kinds write `<root>/logs/<name>.log`.
    pub fn new(name: &str, level: LogLevel, kind: LoggerKind, root: &Path) -> Result<Self, LoggerError> {
        let filter = EnvFilter::default()
            .add_directive(level.as_filter().into())
            .add_directive(quiet("hyper"))
            .add_directive(quiet("h2"));

        let (file_path, file) = if kind.file() {
            let (path, file) = open_log_file(name, root)?;
            (Some(path), Some(file))
        } else {
            (None, None)
        };

        let console_layer = kind
            .console()
            .then(|| tracing_fmt::layer().with_target(true).with_writer(std::io::stderr));
        let file_layer = file.map(|file| {
            tracing_fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(Mutex::new(file))
        });

        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .with(file_layer);

        Ok(Self {
            name: name.to_string(),
            level,
            kind,
            file: file_path,
            dispatch: Dispatch::new(subscriber),
        })
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn kind(&self) -> LoggerKind {
        self.kind
    }

    /// Path of the JSON log file, for file kinds.
    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// Run `f` with this sink as the thread's default.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }

    /// Make this sink the process-wide default.
    pub fn install(&self) -> Result<(), LoggerError> {
        tracing::dispatcher::set_global_default(self.dispatch.clone())
            .map_err(|_| LoggerError::AlreadyInstalled)
    }
}

fn quiet(target: &str) -> tracing_subscriber::filter::Directive {
    format!("{target}=warn")
        .parse()
        .unwrap_or_else(|_| LevelFilter::WARN.into())
}

fn open_log_file(name: &str, root: &Path) -> Result<(PathBuf, File), LoggerError> {
    if !root.is_dir() {
        return Err(LoggerError::NoLogDir(root.to_path_buf()));
    }
    let dir = root.join(LOG_DIR);
    fs::create_dir_all(&dir).map_err(|source| LoggerError::Open {
        path: dir.clone(),
        source,
    })?;
    let path = dir.join(format!("{}.log", name.to_lowercase()));
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|source| LoggerError::Open {
            path: path.clone(),
            source,
        })?;
    Ok((path, file))
}
