//! Decoupled logging pipeline for builds.
//!
//! Every line is persisted to disk even if the console channel is congested or
//! closed.
//!
//! # Architecture
//!
//! ```text
//! log::info!() / build output
//!     |
//! [LogCollector] (non-blocking)
//!     | (crossbeam unbounded channel)
//!     v
//! [DiskPersister thread] ---try_send---> console channel (main prints it)
//!     |
//! logs/full/<ts>_full.log      every line
//! logs/parsed/<ts>_parsed.log  milestone lines (target "parsed")
//! ```

use chrono::Local;
use crossbeam_channel::{unbounded, Sender};
use log::{Level, Log, Metadata, Record};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::loader;

/// Internal log line or special marker
enum LogMessage {
    Line(LogLine),
    /// Flush marker with channel sender to signal completion
    Flush(std::sync::mpsc::Sender<()>),
}

/// Logs directory: `settings.log_dir` if set, otherwise `<data dir>/logs`.
pub fn get_global_logs_path(configured: Option<&Path>) -> Result<PathBuf, String> {
    if let Some(dir) = configured {
        return Ok(dir.to_path_buf());
    }
    let data_dir = loader::get_data_dir().map_err(|e| e.to_string())?;
    Ok(data_dir.join("logs"))
}

/// Ensure the global logs directory exists
pub fn ensure_logs_dir_exists(log_dir: &Path) -> Result<(), String> {
    std::fs::create_dir_all(log_dir)
        .map_err(|e| format!("Failed to create logs directory: {}", e))?;
    Ok(())
}

/// A log line with metadata
#[derive(Clone, Debug)]
pub struct LogLine {
    pub message: String,
    /// "full" or "parsed"
    pub log_type: String,
    pub timestamp: String,
    /// Set for lines that came through the `log` facade; raw build output has none
    pub level: Option<Level>,
}

impl LogLine {
    pub fn new(message: String) -> Self {
        LogLine {
            message,
            log_type: "full".to_string(),
            timestamp: Local::now().format("%H:%M:%S%.3f").to_string(),
            level: None,
        }
    }

    pub fn parsed(message: String) -> Self {
        LogLine {
            log_type: "parsed".to_string(),
            ..LogLine::new(message)
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = Some(level);
        self
    }

    pub fn is_parsed(&self) -> bool {
        self.log_type == "parsed"
    }
}

/// Unified logger that handles disk and console dispatch
#[derive(Clone)]
pub struct LogCollector {
    /// Crossbeam unbounded so senders on any thread or runtime never block
    tx: Sender<LogMessage>,
    full_log_path: PathBuf,
    parsed_log_path: PathBuf,
}

impl LogCollector {
    /// Create the run's log files and start the background persister.
    pub fn new(
        log_dir: PathBuf,
        console_tx: tokio::sync::mpsc::Sender<LogLine>,
    ) -> Result<Self, String> {
        let full_log_dir = log_dir.join("full");
        let parsed_log_dir = log_dir.join("parsed");
        std::fs::create_dir_all(&full_log_dir)
            .map_err(|e| format!("Failed to create full log dir: {}", e))?;
        std::fs::create_dir_all(&parsed_log_dir)
            .map_err(|e| format!("Failed to create parsed log dir: {}", e))?;

        let full_log_path = create_session_log(&full_log_dir, "full")?;
        let parsed_log_path = create_session_log(&parsed_log_dir, "parsed")?;

        let mut full_file = open_append(&full_log_path)?;
        let mut parsed_file = open_append(&parsed_log_path)?;

        let (tx, rx) = unbounded::<LogMessage>();

        // OS thread rather than a tokio task: it must keep draining even while
        // the runtime is shutting down.
        std::thread::spawn(move || {
            while let Ok(msg) = rx.recv() {
                match msg {
                    LogMessage::Line(log_line) => {
                        let formatted = format!("[{}] {}\n", log_line.timestamp, log_line.message);
                        let _ = full_file.write_all(formatted.as_bytes());

                        if log_line.is_parsed() {
                            let _ = parsed_file.write_all(formatted.as_bytes());
                        }

                        // Disk first; a full console channel only drops the echo
                        let _ = console_tx.try_send(log_line);
                    }
                    LogMessage::Flush(done) => {
                        let _ = full_file.flush();
                        let _ = parsed_file.flush();
                        let _ = full_file.sync_data();
                        let _ = parsed_file.sync_data();
                        let _ = done.send(());
                    }
                }
            }
        });

        Ok(LogCollector {
            tx,
            full_log_path,
            parsed_log_path,
        })
    }

    pub fn full_log_path(&self) -> &Path {
        &self.full_log_path
    }

    pub fn parsed_log_path(&self) -> &Path {
        &self.parsed_log_path
    }

    /// Send a log line (non-blocking, cannot fail)
    pub fn log(&self, line: LogLine) {
        let _ = self.tx.send(LogMessage::Line(line));
    }

    pub fn log_str(&self, message: impl Into<String>) {
        self.log(LogLine::new(message.into()));
    }

    /// Send a parsed (milestone) log
    pub fn log_parsed(&self, message: impl Into<String>) {
        self.log(LogLine::parsed(message.into()));
    }

    /// Wait until every line sent before this call is on disk.
    ///
    /// Call before exiting so the final status lines are not lost.
    pub async fn wait_for_empty(&self) -> Result<(), String> {
        let (tx, rx) = std::sync::mpsc::channel::<()>();

        self.tx
            .send(LogMessage::Flush(tx))
            .map_err(|e| format!("Failed to send flush marker: {}", e))?;

        tokio::task::spawn_blocking(move || rx.recv())
            .await
            .map_err(|e| format!("Flush task failed: {}", e))?
            .map_err(|e| format!("Flush signal interrupted: {}", e))
    }
}

/// Wires all `log::info!()`, `log::warn!()`... calls into the collector
impl Log for LogCollector {
    fn enabled(&self, metadata: &Metadata) -> bool {
        // Dependencies (git2 transports, tokio) stay out of the build log below info
        metadata.level() <= Level::Info || metadata.target().starts_with("appforge")
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let message = format!("[{}] {}", record.level(), record.args());

        // Target-aware routing: "parsed" marks high-level milestones
        let line = if record.target() == "parsed" {
            LogLine::parsed(message)
        } else {
            LogLine::new(message)
        };
        LogCollector::log(self, line.with_level(record.level()));
    }

    fn flush(&self) {}
}

fn create_session_log(dir: &Path, log_type: &str) -> Result<PathBuf, String> {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("{}_{}.log", timestamp, log_type));
    File::create(&path).map_err(|e| format!("Failed to create log file: {}", e))?;
    Ok(path)
}

fn open_append(path: &Path) -> Result<File, String> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| format!("Failed to open log file {}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_log_collector_creates_directories() {
        let dir = TempDir::new().unwrap();
        let (console_tx, _console_rx) = tokio::sync::mpsc::channel(100);
        let collector = LogCollector::new(dir.path().to_path_buf(), console_tx).unwrap();

        assert!(dir.path().join("full").is_dir());
        assert!(dir.path().join("parsed").is_dir());
        assert!(collector.full_log_path().exists());
        assert!(collector.parsed_log_path().exists());
    }

    #[tokio::test]
    async fn test_parsed_lines_land_in_both_files() {
        let dir = TempDir::new().unwrap();
        let (console_tx, _console_rx) = tokio::sync::mpsc::channel(100);
        let collector = LogCollector::new(dir.path().to_path_buf(), console_tx).unwrap();

        collector.log_str("   Compiling zed v0.1.0");
        collector.log_parsed("[Build] Finished release");
        collector.wait_for_empty().await.unwrap();

        let full = fs::read_to_string(collector.full_log_path()).unwrap();
        let parsed = fs::read_to_string(collector.parsed_log_path()).unwrap();
        assert!(full.contains("Compiling zed"));
        assert!(full.contains("Finished release"));
        assert!(!parsed.contains("Compiling zed"));
        assert!(parsed.contains("Finished release"));
    }

    #[tokio::test]
    async fn test_full_console_channel_does_not_lose_disk_lines() {
        let dir = TempDir::new().unwrap();
        let (console_tx, _console_rx) = tokio::sync::mpsc::channel(1);
        let collector = LogCollector::new(dir.path().to_path_buf(), console_tx).unwrap();

        for i in 0..1000 {
            collector.log_str(format!("Log message {}", i));
        }
        collector.wait_for_empty().await.unwrap();

        let full = fs::read_to_string(collector.full_log_path()).unwrap();
        assert_eq!(full.lines().count(), 1000);
        assert!(full.contains("Log message 999"));
    }

    #[tokio::test]
    async fn test_console_receives_level() {
        let dir = TempDir::new().unwrap();
        let (console_tx, mut console_rx) = tokio::sync::mpsc::channel(10);
        let collector = LogCollector::new(dir.path().to_path_buf(), console_tx).unwrap();

        Log::log(
            &collector,
            &Record::builder()
                .args(format_args!("disk almost full"))
                .level(Level::Warn)
                .target("appforge::install")
                .build(),
        );

        let line = console_rx.recv().await.unwrap();
        assert_eq!(line.level, Some(Level::Warn));
        assert_eq!(line.message, "[WARN] disk almost full");
        assert!(!line.is_parsed());
    }
}
