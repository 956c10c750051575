//! Request journal: one JSON line per notable event.
//!
//! `tracing` covers operator-facing logs; the journal is the durable record of
//! what each `/chat` request did upstream, keyed by a per-request id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,
    pub level: LogLevel,
    pub component: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

impl JournalEntry {
    pub fn new(level: LogLevel, component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            request_id: None,
            level,
            component: component.into(),
            message: message.into(),
            context: None,
        }
    }

    pub fn for_request(mut self, id: Uuid) -> Self {
        self.request_id = Some(id);
        self
    }

    pub fn with_context(mut self, ctx: serde_json::Value) -> Self {
        self.context = Some(ctx);
        self
    }
}

/// Append-only JSONL file. Existing content is never read back.
pub struct RequestJournal {
    writer: BufWriter<File>,
}

impl RequestJournal {
    /// Open (or create) the journal file for appending.
    pub fn open(file_path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file_path = file_path.as_ref();

        if let Some(parent) = file_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(file_path)?;

        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    pub fn record(&mut self, entry: &JournalEntry) {
        if let Ok(json) = serde_json::to_string(entry) {
            let _ = writeln!(self.writer, "{}", json);
            let _ = self.writer.flush();
        }
    }
}

#[derive(Clone)]
pub struct SharedLogger(Arc<Mutex<RequestJournal>>);

impl SharedLogger {
    pub fn new(file_path: impl AsRef<Path>) -> std::io::Result<Self> {
        Ok(Self(Arc::new(Mutex::new(RequestJournal::open(file_path)?))))
    }

    pub fn log(&self, entry: JournalEntry) {
        if let Ok(mut journal) = self.0.lock() {
            journal.record(&entry);
        }
    }

    pub fn info(&self, component: impl Into<String>, message: impl Into<String>) {
        self.log(JournalEntry::new(LogLevel::Info, component, message));
    }

    pub fn warn(&self, component: impl Into<String>, message: impl Into<String>) {
        self.log(JournalEntry::new(LogLevel::Warn, component, message));
    }

    /// Record an event tied to one `/chat` request.
    pub fn request(
        &self,
        id: Uuid,
        level: LogLevel,
        component: impl Into<String>,
        message: impl Into<String>,
        context: serde_json::Value,
    ) {
        self.log(
            JournalEntry::new(level, component, message)
                .for_request(id)
                .with_context(context),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_entries_written_as_jsonl() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.log");
        let logger = SharedLogger::new(&path).unwrap();

        let id = Uuid::new_v4();
        logger.info("startup", "listening");
        logger.request(id, LogLevel::Warn, "proxy", "upstream 429", json!({"status": 429}));

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["level"], "warn");
        assert_eq!(second["component"], "proxy");
        assert_eq!(second["request_id"], id.to_string());
        assert_eq!(second["context"]["status"], 429);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert!(first.get("request_id").is_none());
    }

    #[test]
    fn test_reopen_appends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("j.log");
        {
            let logger = SharedLogger::new(&path).unwrap();
            logger.info("a", "first run");
        }
        std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .and_then(|mut f| writeln!(f, "not json"))
            .unwrap();

        let logger = SharedLogger::new(&path).unwrap();
        logger.warn("a", "second run");
        logger.log(JournalEntry::new(LogLevel::Error, "a", "failed"));

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("first run"));
        assert_eq!(lines[1], "not json");

        let last: serde_json::Value = serde_json::from_str(lines[3]).unwrap();
        assert_eq!(last["level"], "error");
        assert_eq!(last["message"], "failed");
    }
}
