//! Per-run execution logs.
//!
//! # Separation of Concerns
//!
//! - **Execution logs (this module)**: product output. One ordered, append-only
//!   list of entries per run, readable through [`ExecutionLogger::get_logs`]
//!   and optionally persisted as `runs/<run-id>/log.jsonl`. Unaffected by
//!   `RUST_LOG`.
//! - **Tracing (`logging`)**: dev diagnostics. Every entry recorded here is
//!   also forwarded to `tracing`.
//!
//! Recording never fails and never panics, so logging cannot change how a run
//! proceeds.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::validate_run_id;
use crate::io::file_store::RunPaths;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub run_id: String,
    pub level: LogLevel,
    /// Component that produced the entry (e.g. `engine`, `provider`, `store`).
    pub domain: String,
    pub operation: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Append-only logger bound to one run id.
#[derive(Debug)]
pub struct ExecutionLogger {
    run_id: String,
    entries: Mutex<Vec<LogEntry>>,
}

impl ExecutionLogger {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn info(&self, domain: &str, operation: &str, message: impl Into<String>) {
        self.record(LogLevel::Info, domain, operation, message.into());
    }

    pub fn warn(&self, domain: &str, operation: &str, message: impl Into<String>) {
        self.record(LogLevel::Warn, domain, operation, message.into());
    }

    pub fn error(&self, domain: &str, operation: &str, message: impl Into<String>) {
        self.record(LogLevel::Error, domain, operation, message.into());
    }

    /// Copy of all entries recorded so far, in order.
    pub fn get_logs(&self) -> Vec<LogEntry> {
        self.lock().clone()
    }

    fn record(&self, level: LogLevel, domain: &str, operation: &str, message: String) {
        match level {
            LogLevel::Info => info!(run_id = %self.run_id, domain, operation, "{message}"),
            LogLevel::Warn => warn!(run_id = %self.run_id, domain, operation, "{message}"),
            LogLevel::Error => error!(run_id = %self.run_id, domain, operation, "{message}"),
        }
        let entry = LogEntry {
            run_id: self.run_id.clone(),
            level,
            domain: domain.to_string(),
            operation: operation.to_string(),
            message,
            timestamp: Utc::now(),
        };
        self.lock().push(entry);
    }

    // A panic elsewhere while holding the lock must not stop later runs from logging.
    fn lock(&self) -> MutexGuard<'_, Vec<LogEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Write `entries` as JSON lines to `runs/<run-id>/log.jsonl` under `base_path`.
pub fn write_run_log(base_path: &Path, run_id: &str, entries: &[LogEntry]) -> Result<()> {
    validate_run_id(run_id)?;
    let paths = RunPaths::new(base_path, run_id);
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("create run dir {}", paths.dir.display()))?;
    let mut buf = Vec::new();
    for entry in entries {
        serde_json::to_writer(&mut buf, entry).context("serialize log entry")?;
        buf.push(b'\n');
    }
    let mut file = fs::File::create(&paths.log_path)
        .with_context(|| format!("create {}", paths.log_path.display()))?;
    file.write_all(&buf)
        .with_context(|| format!("write {}", paths.log_path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InvalidRunIdError;

    #[test]
    fn entries_keep_order_and_run_id() {
        let logger = ExecutionLogger::new("run-1");
        logger.info("engine", "start", "starting");
        logger.warn("engine", "step", "step failed");
        logger.error("store", "save", "disk full");

        let logs = logger.get_logs();
        let levels: Vec<LogLevel> = logs.iter().map(|e| e.level).collect();
        assert_eq!(levels, vec![LogLevel::Info, LogLevel::Warn, LogLevel::Error]);
        assert!(logs.iter().all(|e| e.run_id == "run-1"));
        assert_eq!(logs[2].domain, "store");
        assert_eq!(logs[2].operation, "save");
        assert!(logs.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn get_logs_returns_a_copy() {
        let logger = ExecutionLogger::new("run-1");
        logger.info("engine", "start", "one");
        let snapshot = logger.get_logs();
        logger.info("engine", "step", "two");
        assert_eq!(snapshot.len(), 1);
        assert_eq!(logger.get_logs().len(), 2);
    }

    #[test]
    fn logging_survives_poisoned_lock() {
        let logger = std::sync::Arc::new(ExecutionLogger::new("run-1"));
        let poisoner = std::sync::Arc::clone(&logger);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.entries.lock().expect("lock");
            panic!("poison");
        })
        .join();

        logger.info("engine", "start", "still logging");
        assert_eq!(logger.get_logs().len(), 1);
    }

    #[test]
    fn writes_jsonl_log_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let logger = ExecutionLogger::new("run-7");
        logger.info("engine", "start", "a");
        logger.info("engine", "complete", "b");

        write_run_log(temp.path(), "run-7", &logger.get_logs()).expect("write");
        let raw = fs::read_to_string(temp.path().join("runs/run-7/log.jsonl")).expect("read");
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: LogEntry = serde_json::from_str(lines[0]).expect("parse");
        assert_eq!(first.operation, "start");
        assert!(lines[1].contains("\"runId\":\"run-7\""));
    }

    #[test]
    fn log_file_rejects_unsafe_run_ids() {
        let temp = tempfile::tempdir().expect("tempdir");
        let base = temp.path().join("store");
        let err = write_run_log(&base, "../escape", &[]).expect_err("unsafe id");
        assert!(err.downcast_ref::<InvalidRunIdError>().is_some());
        assert!(!temp.path().join("escape").exists());
        assert!(!base.exists());
    }
}
