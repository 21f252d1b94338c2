//! Dialogs: append-only, logged conversation state.

pub mod record;

pub use record::DialogRecord;

use std::sync::Arc;

use base64::Engine;
use bon::Builder;
use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::error::{ParleyError, Result};
use crate::log::{Collection, LogSession, ReplayLog};
use crate::prompt::{Prompt, PromptArgs};
use crate::provider::ModelBinding;
use crate::types::{CompletionCost, Message, Modality, Role, CAPTION_KEY, DIALOG_ID_KEY};

/// Six lowercase hex characters from a fresh uuid.
pub(crate) fn short_hex() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..6].to_string()
}

/// Session name of the form `YYYYmmdd_HHMMSS_<6 hex>`.
pub fn default_session_name() -> String {
    format!("{}_{}", Utc::now().format("%Y%m%d_%H%M%S"), short_hex())
}

/// What to send: a registered prompt or raw text.
#[derive(Debug, Clone)]
pub enum PromptSource {
    Prompt(Arc<Prompt>),
    Text(String),
}

impl From<Arc<Prompt>> for PromptSource {
    fn from(p: Arc<Prompt>) -> Self {
        PromptSource::Prompt(p)
    }
}

impl From<&Arc<Prompt>> for PromptSource {
    fn from(p: &Arc<Prompt>) -> Self {
        PromptSource::Prompt(p.clone())
    }
}

impl From<Prompt> for PromptSource {
    fn from(p: Prompt) -> Self {
        PromptSource::Prompt(Arc::new(p))
    }
}

impl From<&str> for PromptSource {
    fn from(s: &str) -> Self {
        PromptSource::Text(s.to_string())
    }
}

impl From<String> for PromptSource {
    fn from(s: String) -> Self {
        PromptSource::Text(s)
    }
}

/// Role, creator and extra metadata for a sent message.
#[derive(Debug, Clone, Builder)]
pub struct MessageOptions {
    #[builder(default = Role::User)]
    pub role: Role,
    #[builder(into, default = "user".to_string())]
    pub creator: String,
    #[builder(default)]
    pub metadata: Map<String, Value>,
}

impl Default for MessageOptions {
    fn default() -> Self {
        Self {
            role: Role::User,
            creator: "user".to_string(),
            metadata: Map::new(),
        }
    }
}

/// Ordered conversation for one session branch.
///
/// Messages are immutable once appended and shared between forks.
#[derive(Clone)]
pub struct Dialog {
    messages: Vec<Arc<Message>>,
    session_name: String,
    dialog_id: String,
    parent_dialog: Option<String>,
    top_prompt: Option<Arc<Prompt>>,
    log: Arc<dyn ReplayLog>,
}

impl Dialog {
    /// Empty dialog, registered in the session's dialog log.
    pub fn new(log: Arc<dyn ReplayLog>, session_name: impl Into<String>) -> Self {
        let dialog = Self {
            messages: Vec::new(),
            session_name: session_name.into(),
            dialog_id: uuid::Uuid::new_v4().to_string(),
            parent_dialog: None,
            top_prompt: None,
            log,
        };
        dialog.register();
        dialog
    }

    fn register(&self) {
        let session = LogSession::new(self.log.clone(), Collection::Dialogs, &self.session_name);
        if let Err(err) = session.log(&self.dialog_id, json!({ "parent": self.parent_dialog })) {
            warn!(dialog_id = %self.dialog_id, error = %err, "Failed to register dialog");
        }
    }

    fn message_log(&self) -> LogSession {
        LogSession::new(
            self.log.clone(),
            Collection::Messages,
            format!("{}/{}", self.session_name, self.dialog_id),
        )
    }

    /// Log with full metadata, then core fields only, then bare content.
    fn log_message(&self, message: &Message) {
        let session = self.message_log();
        let full = serde_json::to_value(message)
            .map_err(ParleyError::from)
            .and_then(|meta| session.log(&message.content, meta));
        let Err(err) = full else { return };
        debug!(dialog_id = %self.dialog_id, error = %err, "Retrying message log with core fields");

        let core = serde_json::to_value(message.core())
            .map_err(ParleyError::from)
            .and_then(|meta| session.log(&message.content, meta));
        let Err(err) = core else { return };
        debug!(dialog_id = %self.dialog_id, error = %err, "Retrying message log without metadata");

        if let Err(err) = session.log(&message.content, Value::Null) {
            warn!(
                dialog_id = %self.dialog_id,
                role = %message.role,
                error = %err,
                "Message appended without a log record"
            );
        }
    }

    /// Stamp, log and commit a message.
    pub fn append(&mut self, mut message: Message) -> Arc<Message> {
        message
            .metadata
            .insert(DIALOG_ID_KEY.into(), json!(self.dialog_id));
        self.log_message(&message);
        let message = Arc::new(message);
        self.messages.push(message.clone());
        message
    }

    /// Independent copy sharing the existing messages.
    pub fn fork(&self) -> Dialog {
        let forked = Dialog {
            messages: self.messages.clone(),
            session_name: self.session_name.clone(),
            dialog_id: uuid::Uuid::new_v4().to_string(),
            parent_dialog: Some(self.dialog_id.clone()),
            top_prompt: self.top_prompt.clone(),
            log: self.log.clone(),
        };
        forked.register();
        debug!(parent = %self.dialog_id, dialog_id = %forked.dialog_id, "Forked dialog");
        forked
    }

    /// Fork without the last `n` messages.
    pub fn context_copy(&self, n: usize) -> Dialog {
        let mut copy = self.fork();
        let keep = copy.messages.len().saturating_sub(n);
        copy.messages.truncate(keep);
        copy
    }

    /// Render and append a user message.
    pub fn send_message(
        &mut self,
        prompt: impl Into<PromptSource>,
        args: &PromptArgs,
    ) -> Result<Arc<Message>> {
        self.send_message_with(prompt, args, MessageOptions::default())
    }

    /// Render and append a message with explicit role, creator and metadata.
    pub fn send_message_with(
        &mut self,
        prompt: impl Into<PromptSource>,
        args: &PromptArgs,
        options: MessageOptions,
    ) -> Result<Arc<Message>> {
        let prompt = match prompt.into() {
            PromptSource::Prompt(p) => p,
            PromptSource::Text(text) => {
                if !args.is_empty() {
                    return Err(ParleyError::InvalidArgument(
                        "raw text messages take no template arguments".into(),
                    ));
                }
                Arc::new(Prompt::new(format!("__temp_prompt_{}", short_hex()), text))
            }
        };
        let content = prompt.render(args)?;
        let mut message = Message::new(options.role, content, options.creator);
        message.metadata = options.metadata;
        let message = self.append(message);
        self.top_prompt = Some(prompt);
        Ok(message)
    }

    /// Append a base64 image with an optional caption.
    pub fn send_image(
        &mut self,
        base64: impl Into<String>,
        caption: Option<&str>,
        options: MessageOptions,
    ) -> Arc<Message> {
        let mut message =
            Message::new(options.role, base64, options.creator).with_modality(Modality::Image);
        message.metadata = options.metadata;
        if let Some(caption) = caption {
            message.metadata.insert(CAPTION_KEY.into(), json!(caption));
        }
        self.append(message)
    }

    /// Encode raw image bytes and append them.
    pub fn send_image_bytes(
        &mut self,
        bytes: &[u8],
        caption: Option<&str>,
        options: MessageOptions,
    ) -> Arc<Message> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        self.send_image(encoded, caption, options)
    }

    /// Messages in the binding's wire format.
    pub fn render_for_provider(&self, binding: &dyn ModelBinding) -> Result<Vec<Value>> {
        binding.render_messages(&self.messages)
    }

    /// Total priced usage, including failed attempts carried by messages.
    pub fn cost(&self) -> CompletionCost {
        self.messages
            .iter()
            .flat_map(|m| std::iter::once(m).chain(m.attempts.iter()))
            .filter_map(|m| m.cost)
            .sum()
    }

    pub fn messages(&self) -> &[Arc<Message>] {
        &self.messages
    }

    pub fn tail(&self) -> Option<&Arc<Message>> {
        self.messages.last()
    }

    pub fn system(&self) -> Option<&Arc<Message>> {
        self.messages.first().filter(|m| m.role == Role::System)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn session_name(&self) -> &str {
        &self.session_name
    }

    pub fn dialog_id(&self) -> &str {
        &self.dialog_id
    }

    pub fn parent_dialog(&self) -> Option<&str> {
        self.parent_dialog.as_deref()
    }

    /// Prompt most recently used to add a message.
    pub fn top_prompt(&self) -> Option<&Arc<Prompt>> {
        self.top_prompt.as_ref()
    }

    pub fn set_top_prompt(&mut self, prompt: Arc<Prompt>) {
        self.top_prompt = Some(prompt);
    }

    pub fn log(&self) -> &Arc<dyn ReplayLog> {
        &self.log
    }

    /// One line per message.
    pub fn overview(&self, max_len: usize) -> String {
        self.messages
            .iter()
            .enumerate()
            .map(|(idx, m)| format!("{idx:>3} {}", m.summary_line(max_len)))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl std::fmt::Debug for Dialog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dialog")
            .field("session_name", &self.session_name)
            .field("dialog_id", &self.dialog_id)
            .field("parent_dialog", &self.parent_dialog)
            .field("messages", &self.messages.len())
            .field("top_prompt", &self.top_prompt.as_ref().map(|p| p.path()))
            .finish()
    }
}
