//! Serializable snapshot of a dialog.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::Dialog;
use crate::log::ReplayLog;
use crate::prompt::PromptRegistry;
use crate::types::Message;

/// Dialog state without the log backend; prompts are kept by path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DialogRecord {
    pub session_name: String,
    pub dialog_id: String,
    #[serde(default)]
    pub parent_dialog: Option<String>,
    #[serde(default)]
    pub top_prompt: Option<String>,
    pub messages: Vec<Arc<Message>>,
}

impl Dialog {
    pub fn to_record(&self) -> DialogRecord {
        DialogRecord {
            session_name: self.session_name.clone(),
            dialog_id: self.dialog_id.clone(),
            parent_dialog: self.parent_dialog.clone(),
            top_prompt: self.top_prompt.as_ref().map(|p| p.path().to_string()),
            messages: self.messages.clone(),
        }
    }

    /// Restore a dialog. The dialog keeps its id and is not logged again.
    ///
    /// A `top_prompt` path the registry cannot resolve is dropped with a
    /// warning.
    pub fn from_record(record: DialogRecord, log: Arc<dyn ReplayLog>, registry: &PromptRegistry) -> Dialog {
        let top_prompt = record.top_prompt.as_deref().and_then(|path| {
            registry
                .resolve(path)
                .map_err(|err| warn!(%path, error = %err, "Top prompt not restored"))
                .ok()
        });
        Dialog {
            messages: record.messages,
            session_name: record.session_name,
            dialog_id: record.dialog_id,
            parent_dialog: record.parent_dialog,
            top_prompt,
            log,
        }
    }
}
