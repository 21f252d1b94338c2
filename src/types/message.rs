//! Message types for dialogs.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumString};

use super::usage::{CompletionCost, Usage};

/// Metadata key carrying the id of the dialog a message was appended to.
pub const DIALOG_ID_KEY: &str = "dialog_id";
/// Metadata key linking a tool-result message to the call it answers.
pub const TOOL_CALL_ID_KEY: &str = "tool_call_id";
/// Metadata key holding the caption of an image message.
pub const CAPTION_KEY: &str = "caption";

/// Conversation role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
    /// A model turn that requested one or more function calls.
    ToolCall,
}

impl Role {
    /// Role name on the OpenAI wire.
    pub fn openai(&self) -> &'static str {
        match self {
            Role::System => "developer",
            Role::User => "user",
            Role::Assistant | Role::ToolCall => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// What the content of a message holds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString, Default)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Modality {
    #[default]
    Text,
    /// Base64-encoded image payload.
    Image,
    Audio,
    FunctionCall,
}

/// Provider call shape a message was produced through.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString, Default)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ApiType {
    /// Chat Completions.
    #[default]
    Completion,
    /// Responses API.
    Response,
}

/// One tool invocation requested by the model, and its resolved result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    pub id: String,
    pub name: String,
    pub arguments: Map<String, Value>,
    #[serde(default)]
    pub result: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_str: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl FunctionCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
            result: Value::Null,
            result_str: None,
            error_message: None,
        }
    }

    /// Whether `other` asks for the same function with the same arguments.
    /// Call ids are ignored.
    pub fn is_repeat_of(&self, other: &FunctionCall) -> bool {
        self.name == other.name && self.arguments == other.arguments
    }

    /// Whether this call repeats any of `earlier`.
    pub fn is_repeated(&self, earlier: &[FunctionCall]) -> bool {
        earlier.iter().any(|c| self.is_repeat_of(c))
    }

    /// Arguments as a compact JSON string.
    pub fn arguments_json(&self) -> String {
        Value::Object(self.arguments.clone()).to_string()
    }
}

/// Log-probability of one alternative token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopLogprob {
    pub token: String,
    pub logprob: f64,
}

/// Log-probability of one generated token with its top alternatives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenLogprob {
    pub token: String,
    pub logprob: f64,
    #[serde(default)]
    pub top_logprobs: Vec<TopLogprob>,
}

/// One turn of a dialog.
///
/// Built once, then frozen behind an `Arc` when appended to a dialog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub modality: Modality,
    pub creator: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub function_calls: Vec<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<CompletionCost>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<Vec<TokenLogprob>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_args: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_type: Option<ApiType>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<Arc<Message>>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>, creator: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            modality: Modality::Text,
            creator: creator.into(),
            function_calls: Vec::new(),
            raw_response: None,
            parsed: None,
            errors: Vec::new(),
            usage: None,
            cost: None,
            logprobs: None,
            model: None,
            model_args: None,
            api_type: None,
            metadata: Map::new(),
            attempts: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Create a system message.
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text, "system")
    }

    /// Create a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text, "user")
    }

    /// Create an assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text, "assistant")
    }

    pub fn with_modality(mut self, modality: Modality) -> Self {
        self.modality = modality;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn is_function_call(&self) -> bool {
        self.role == Role::ToolCall
    }

    /// Whether the parser or schema rejected this message.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn dialog_id(&self) -> Option<&str> {
        self.metadata.get(DIALOG_ID_KEY).and_then(Value::as_str)
    }

    pub fn tool_call_id(&self) -> Option<&str> {
        self.metadata.get(TOOL_CALL_ID_KEY).and_then(Value::as_str)
    }

    pub fn caption(&self) -> Option<&str> {
        self.metadata.get(CAPTION_KEY).and_then(Value::as_str)
    }

    /// Copy with only the fields needed to replay the conversation.
    ///
    /// Metadata is reduced to the dialog and tool-call ids.
    pub fn core(&self) -> Message {
        let metadata = self
            .metadata
            .iter()
            .filter(|(key, _)| key.as_str() == DIALOG_ID_KEY || key.as_str() == TOOL_CALL_ID_KEY)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Message {
            metadata,
            model_args: None,
            attempts: Vec::new(),
            raw_response: None,
            ..self.clone()
        }
    }

    /// One-line rendering used in overviews and diagnostics.
    pub fn summary_line(&self, max_len: usize) -> String {
        let body = match self.modality {
            Modality::Image => format!("<image {} bytes>", self.content.len()),
            _ => self.content.replace('\n', " "),
        };
        let body = if body.chars().count() > max_len {
            let cut: String = body.chars().take(max_len).collect();
            format!("{cut}...")
        } else {
            body
        };
        format!("[{}:{}] {}", self.role, self.creator, body)
    }
}

/// Content of the summary message for a tool-call turn.
pub fn tool_calls_summary(calls: &[FunctionCall]) -> String {
    let lines: Vec<String> = calls
        .iter()
        .enumerate()
        .map(|(idx, c)| format!("{idx}. {}: {}", c.name, c.arguments_json()))
        .collect();
    format!("Tool calls:\n\n{}", lines.join("\n"))
}
