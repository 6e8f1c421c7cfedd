/// In-memory session log behind the `log` facade
use chrono::{DateTime, Utc};
use log::{Level, LevelFilter, Log, Metadata, Record};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use thiserror::Error;

/// Entries kept in memory; older ones are dropped first.
pub const MAX_ENTRIES: usize = 1000;

const CRATE_PREFIX: &str = "bulk_replace";

#[derive(Debug, Error)]
pub enum SessionLogError {
    #[error("Failed to open log file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Logger already installed: {0}")]
    AlreadyInstalled(#[from] log::SetLoggerError),
    #[error("Failed to serialize log: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub target: String,
    pub message: String,
}

pub struct SessionLog {
    entries: Mutex<VecDeque<LogEntry>>,
    verbose: AtomicBool,
    log_file: Mutex<Option<BufWriter<File>>>,
}

impl SessionLog {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(64)),
            verbose: AtomicBool::new(false),
            log_file: Mutex::new(None),
        }
    }

    pub fn set_verbose(&self, verbose: bool) {
        self.verbose.store(verbose, Ordering::Relaxed);
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose.load(Ordering::Relaxed)
    }

    /// Appends every entry as one JSON line to `path`.
    pub fn init_file_logging<P: AsRef<Path>>(&self, path: P) -> Result<(), SessionLogError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        if let Ok(mut guard) = self.log_file.lock() {
            *guard = Some(BufWriter::new(file));
        }
        Ok(())
    }

    pub fn record(&self, level: Level, target: &str, message: String) {
        let entry = LogEntry {
            timestamp: Utc::now(),
            level: level.to_string(),
            target: target.to_string(),
            message,
        };

        if level <= Level::Warn || self.is_verbose() {
            eprintln!("[{}] {}", entry.level, entry.message);
        }

        if let Ok(mut guard) = self.log_file.lock() {
            if let Some(writer) = guard.as_mut() {
                if let Ok(line) = serde_json::to_string(&entry) {
                    let _ = writeln!(writer, "{}", line);
                    let _ = writer.flush();
                }
            }
        }

        if let Ok(mut entries) = self.entries.lock() {
            if entries.len() == MAX_ENTRIES {
                entries.pop_front();
            }
            entries.push_back(entry);
        }
    }

    /// Up to `count` most recent entries, oldest first.
    pub fn recent(&self, count: usize) -> Vec<LogEntry> {
        self.entries
            .lock()
            .map(|entries| {
                let skip = entries.len().saturating_sub(count);
                entries.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn export_json(&self) -> Result<String, SessionLogError> {
        let entries = self.recent(MAX_ENTRIES);
        Ok(serde_json::to_string_pretty(&entries)?)
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

impl Default for SessionLog {
    fn default() -> Self {
        Self::new()
    }
}

impl Log for SessionLog {
    fn enabled(&self, metadata: &Metadata) -> bool {
        if metadata.target().starts_with(CRATE_PREFIX) {
            metadata.level() <= Level::Debug
        } else {
            metadata.level() <= Level::Warn
        }
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            self.record(record.level(), record.target(), record.args().to_string());
        }
    }

    fn flush(&self) {
        if let Ok(mut guard) = self.log_file.lock() {
            if let Some(writer) = guard.as_mut() {
                let _ = writer.flush();
            }
        }
    }
}

static SESSION_LOG: Lazy<SessionLog> = Lazy::new(SessionLog::new);

pub fn session_log() -> &'static SessionLog {
    &SESSION_LOG
}

/// Installs the global session log as the `log` backend.
pub fn init(verbose: bool, log_file: Option<&Path>) -> Result<(), SessionLogError> {
    let logger = session_log();
    logger.set_verbose(verbose);
    if let Some(path) = log_file {
        logger.init_file_logging(path)?;
    }
    log::set_logger(logger)?;
    log::set_max_level(LevelFilter::Debug);
    Ok(())
}
