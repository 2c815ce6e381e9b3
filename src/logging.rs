/*!
 * Per-job logging handle.
 *
 * A `JobLog` is created at the start of a job, handed to every component that
 * needs to report progress or problems, and flushed to a file when the job
 * finishes. Nothing in the library logs through hidden process-wide state:
 * components only write to the handle they were given. When echo is enabled the
 * handle also forwards each entry to the `log` facade so the binary's console
 * logger can display it.
 */

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use log::Level;
use parking_lot::Mutex;
use serde::Serialize;

use crate::file_utils::FileManager;

/// A single captured log line
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LogEntry {
    pub level: String,
    pub message: String,
}

/// Cloneable handle collecting the log of one job
#[derive(Debug, Clone, Default)]
pub struct JobLog {
    entries: Arc<Mutex<Vec<LogEntry>>>,
    echo: bool,
}

impl JobLog {
    /// Create a log handle; with `echo` every entry is also sent to the `log` facade
    pub fn new(echo: bool) -> Self {
        Self {
            entries: Arc::new(Mutex::new(Vec::new())),
            echo,
        }
    }

    /// Create a silent handle that only captures entries
    pub fn capture_only() -> Self {
        Self::new(false)
    }

    fn push(&self, level: Level, message: String) {
        if self.echo {
            log::log!(level, "{}", message);
        }
        self.entries.lock().push(LogEntry {
            level: level.to_string(),
            message,
        });
    }

    pub fn error(&self, message: impl Into<String>) {
        self.push(Level::Error, message.into());
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.push(Level::Warn, message.into());
    }

    pub fn info(&self, message: impl Into<String>) {
        self.push(Level::Info, message.into());
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.push(Level::Debug, message.into());
    }

    /// Snapshot of all entries captured so far
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }

    /// Number of entries at the given level
    pub fn count(&self, level: Level) -> usize {
        let level = level.to_string();
        self.entries.lock().iter().filter(|e| e.level == level).count()
    }

    /// Write every captured entry to `path`, headed by a short context line
    pub fn write_to_file<P: AsRef<Path>>(&self, path: P, context: &str) -> Result<()> {
        let mut content = String::new();
        let _ = writeln!(
            content,
            "# {} ({})",
            context,
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        for entry in self.entries.lock().iter() {
            let _ = writeln!(content, "[{}] {}", entry.level, entry.message);
        }
        FileManager::write_to_file(path, &content)
    }
}
