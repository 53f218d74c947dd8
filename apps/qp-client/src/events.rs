//! User-facing diagnostic event log.
//!
//! Background workers report errors concurrently; appends are
//! serialized by this module's own mutex, independent of the store's
//! write lock, so interleaved writes can never corrupt an entry.
//! Entries go to a JSON-lines file (when configured) and to a bounded
//! in-memory ring the foreground reads from.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

const RING_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventSeverity {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEntry {
    pub timestamp: DateTime<Utc>,
    pub severity: EventSeverity,
    pub title: String,
    pub detail: String,
}

pub struct EventLog {
    inner: Mutex<Inner>,
}

struct Inner {
    file: Option<File>,
    recent: VecDeque<EventEntry>,
}

impl EventLog {
    /// In-memory only.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner { file: None, recent: VecDeque::new() }),
        }
    }

    /// Backed by an append-only JSONL file.
    pub fn with_file(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            inner: Mutex::new(Inner { file: Some(file), recent: VecDeque::new() }),
        })
    }

    pub fn record(&self, severity: EventSeverity, title: &str, detail: impl Into<String>) {
        let entry = EventEntry {
            timestamp: Utc::now(),
            severity,
            title: title.to_string(),
            detail: detail.into(),
        };
        let mut inner = self.inner.lock();
        if let Some(file) = inner.file.as_mut() {
            // A full disk must not take the sync loop down with it.
            if let Ok(line) = serde_json::to_string(&entry) {
                let _ = writeln!(file, "{line}");
                let _ = file.flush();
            }
        }
        if inner.recent.len() == RING_CAPACITY {
            inner.recent.pop_front();
        }
        inner.recent.push_back(entry);
    }

    pub fn info(&self, title: &str, detail: impl Into<String>) {
        self.record(EventSeverity::Info, title, detail);
    }

    pub fn warn(&self, title: &str, detail: impl Into<String>) {
        self.record(EventSeverity::Warn, title, detail);
    }

    pub fn error(&self, title: &str, detail: impl Into<String>) {
        self.record(EventSeverity::Error, title, detail);
    }

    /// The last `limit` entries, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<EventEntry> {
        let inner = self.inner.lock();
        inner.recent.iter().rev().take(limit).rev().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().recent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}
