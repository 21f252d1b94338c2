//! Reconstructing a logged session for replay.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::warn;

use super::{Collection, LogEntry, LogSession, ReplayLog};
use crate::error::Result;
use crate::types::Message;

/// Where an activity came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivityKind {
    Message { dialog_id: String },
    Frontend,
}

/// A logged event placed on the session timeline.
#[derive(Debug, Clone)]
pub struct Activity {
    pub timestamp: DateTime<Utc>,
    pub value: String,
    pub metadata: Value,
    pub kind: ActivityKind,
}

/// Everything logged for one session.
#[derive(Debug, Clone)]
pub struct ReplaySession {
    session: String,
    dialogs: Vec<LogEntry>,
    frontend: Vec<LogEntry>,
    messages: BTreeMap<String, Vec<LogEntry>>,
}

impl ReplaySession {
    pub fn load(log: &dyn ReplayLog, session: &str) -> Result<Self> {
        let dialogs = log.read(Collection::Dialogs, session)?;
        let frontend = log.read(Collection::Frontend, session)?;
        let mut messages = BTreeMap::new();
        for dialog in &dialogs {
            let entries = log.read(Collection::Messages, &format!("{session}/{}", dialog.value))?;
            messages.insert(dialog.value.clone(), entries);
        }
        Ok(Self {
            session: session.to_string(),
            dialogs,
            frontend,
            messages,
        })
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    /// Dialog ids in creation order.
    pub fn dialog_ids(&self) -> Vec<&str> {
        self.dialogs.iter().map(|d| d.value.as_str()).collect()
    }

    /// Parent of a dialog, if it was forked.
    pub fn parent_of(&self, dialog_id: &str) -> Option<&str> {
        self.dialogs
            .iter()
            .find(|d| d.value == dialog_id)
            .and_then(|d| d.metadata.get("parent"))
            .and_then(Value::as_str)
    }

    pub fn entries(&self, dialog_id: &str) -> &[LogEntry] {
        self.messages.get(dialog_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Messages of a dialog that were logged with full metadata.
    pub fn messages(&self, dialog_id: &str) -> Vec<Message> {
        self.entries(dialog_id)
            .iter()
            .filter_map(|e| match serde_json::from_value(e.metadata.clone()) {
                Ok(m) => Some(m),
                Err(err) => {
                    warn!(%dialog_id, error = %err, "Skipping message logged without metadata");
                    None
                }
            })
            .collect()
    }

    /// All messages and frontend events, oldest first.
    pub fn activities(&self) -> Vec<Activity> {
        let mut out: Vec<Activity> = Vec::new();
        for (dialog_id, entries) in &self.messages {
            out.extend(entries.iter().map(|e| Activity {
                timestamp: e.timestamp,
                value: e.value.clone(),
                metadata: e.metadata.clone(),
                kind: ActivityKind::Message {
                    dialog_id: dialog_id.clone(),
                },
            }));
        }
        out.extend(self.frontend.iter().map(|e| Activity {
            timestamp: e.timestamp,
            value: e.value.clone(),
            metadata: e.metadata.clone(),
            kind: ActivityKind::Frontend,
        }));
        out.sort_by_key(|a| a.timestamp);
        out
    }
}

/// Records presentation events next to a session's dialogs.
#[derive(Debug, Clone)]
pub struct FrontendLog {
    inner: LogSession,
}

impl FrontendLog {
    pub fn new(log: Arc<dyn ReplayLog>, session: impl Into<String>) -> Self {
        Self {
            inner: LogSession::new(log, Collection::Frontend, session),
        }
    }

    /// Log an event of type `kind`, e.g. `"markdown"` or `"status"`.
    pub fn record(&self, kind: &str, value: impl Into<String>) -> Result<()> {
        self.inner.log(value, json!({ "type": kind }))
    }

    pub fn record_with(&self, kind: &str, value: impl Into<String>, mut metadata: Value) -> Result<()> {
        if let Some(map) = metadata.as_object_mut() {
            map.insert("type".into(), json!(kind));
        } else {
            metadata = json!({ "type": kind, "data": metadata });
        }
        self.inner.log(value, metadata)
    }
}
