//! Append-only replay log.

pub mod file;
pub mod replay;

pub use file::LocalFileLog;
pub use replay::{Activity, ActivityKind, FrontendLog, ReplaySession};

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

use crate::config::{LogType, ProjectConfig};
use crate::error::{ParleyError, Result};

/// Log collections used for replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Collection {
    /// One entry per dialog created in a session; value is the dialog id.
    Dialogs,
    /// Messages, under session `"{session}/{dialog_id}"`.
    Messages,
    /// Presentation events.
    Frontend,
}

/// One logged record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub value: String,
    #[serde(default)]
    pub metadata: Value,
}

impl LogEntry {
    pub fn new(value: impl Into<String>, metadata: Value) -> Self {
        Self {
            timestamp: Utc::now(),
            value: value.into(),
            metadata,
        }
    }
}

/// Key-value log backend. Entries read back in write order.
pub trait ReplayLog: Send + Sync {
    fn write(&self, collection: Collection, session: &str, entry: &LogEntry) -> Result<()>;

    fn read(&self, collection: Collection, session: &str) -> Result<Vec<LogEntry>>;

    fn delete_session(&self, collection: Collection, session: &str) -> Result<()>;

    fn delete_collection(&self, collection: Collection) -> Result<()>;
}

/// A log bound to one collection and session.
#[derive(Clone)]
pub struct LogSession {
    log: Arc<dyn ReplayLog>,
    collection: Collection,
    session: String,
}

impl LogSession {
    pub fn new(log: Arc<dyn ReplayLog>, collection: Collection, session: impl Into<String>) -> Self {
        Self {
            log,
            collection,
            session: session.into(),
        }
    }

    pub fn log(&self, value: impl Into<String>, metadata: Value) -> Result<()> {
        self.log
            .write(self.collection, &self.session, &LogEntry::new(value, metadata))
    }

    pub fn read(&self) -> Result<Vec<LogEntry>> {
        self.log.read(self.collection, &self.session)
    }

    pub fn session(&self) -> &str {
        &self.session
    }
}

impl std::fmt::Debug for LogSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogSession")
            .field("collection", &self.collection)
            .field("session", &self.session)
            .finish()
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLog;

impl ReplayLog for NoLog {
    fn write(&self, _collection: Collection, _session: &str, _entry: &LogEntry) -> Result<()> {
        Ok(())
    }

    fn read(&self, _collection: Collection, _session: &str) -> Result<Vec<LogEntry>> {
        Ok(Vec::new())
    }

    fn delete_session(&self, _collection: Collection, _session: &str) -> Result<()> {
        Ok(())
    }

    fn delete_collection(&self, _collection: Collection) -> Result<()> {
        Ok(())
    }
}

/// In-process log, mostly for tests.
#[derive(Debug, Default)]
pub struct MemoryLog {
    entries: RwLock<HashMap<(Collection, String), Vec<LogEntry>>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries across all sessions of `collection`.
    pub fn count(&self, collection: Collection) -> usize {
        self.entries
            .read()
            .map(|e| {
                e.iter()
                    .filter(|((c, _), _)| *c == collection)
                    .map(|(_, v)| v.len())
                    .sum()
            })
            .unwrap_or(0)
    }

    /// Sessions with at least one entry in `collection`, sorted.
    pub fn sessions(&self, collection: Collection) -> Vec<String> {
        let mut sessions: Vec<String> = self
            .entries
            .read()
            .map(|e| {
                e.keys()
                    .filter(|(c, _)| *c == collection)
                    .map(|(_, s)| s.clone())
                    .collect()
            })
            .unwrap_or_default();
        sessions.sort();
        sessions
    }
}

fn poisoned() -> ParleyError {
    ParleyError::InvalidState("memory log lock poisoned".into())
}

impl ReplayLog for MemoryLog {
    fn write(&self, collection: Collection, session: &str, entry: &LogEntry) -> Result<()> {
        self.entries
            .write()
            .map_err(|_| poisoned())?
            .entry((collection, session.to_string()))
            .or_default()
            .push(entry.clone());
        Ok(())
    }

    fn read(&self, collection: Collection, session: &str) -> Result<Vec<LogEntry>> {
        Ok(self
            .entries
            .read()
            .map_err(|_| poisoned())?
            .get(&(collection, session.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    fn delete_session(&self, collection: Collection, session: &str) -> Result<()> {
        self.entries
            .write()
            .map_err(|_| poisoned())?
            .remove(&(collection, session.to_string()));
        Ok(())
    }

    fn delete_collection(&self, collection: Collection) -> Result<()> {
        self.entries
            .write()
            .map_err(|_| poisoned())?
            .retain(|(c, _), _| *c != collection);
        Ok(())
    }
}

/// Build the log backend a project is configured for.
pub fn build_log(config: &ProjectConfig) -> Result<Arc<dyn ReplayLog>> {
    Ok(match config.log_type {
        LogType::LocalFile => {
            let base = config.log_dir()?.join(format!("{}_default", config.name));
            Arc::new(LocalFileLog::new(base)?)
        }
        LogType::Memory => Arc::new(MemoryLog::new()),
        LogType::None => Arc::new(NoLog),
    })
}
