//! Model binding trait and the OpenAI implementations.

pub mod format;
pub mod http;

#[cfg(feature = "openai")]
pub mod openai;
#[cfg(feature = "openai")]
pub mod openai_responses;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::ParleyConfig;
use crate::dialog::Dialog;
use crate::error::{ParleyError, Result};
use crate::models::{ModelCard, ModelCatalog};
use crate::prompt::{ParseError, Prompt};
use crate::types::{
    tool_calls_summary, ApiType, CallOptions, FunctionCall, Message, Modality, Role, Usage,
};

/// Turns a dialog into one model response.
///
/// Implementations perform the HTTP call and nothing else: no logging to the
/// replay log and no mutation of the dialog.
#[async_trait]
pub trait ModelBinding: Send + Sync {
    /// Provider name (e.g., "openai").
    fn provider_name(&self) -> &str;

    /// Which call shape this binding speaks.
    fn api_type(&self) -> ApiType;

    /// Render dialog messages into the provider's wire format.
    fn render_messages(&self, messages: &[Arc<Message>]) -> Result<Vec<Value>>;

    /// Invoke `model` on `dialog`, using `prompt` for tools and output
    /// handling.
    ///
    /// Parse failures are reported on the returned message, never as `Err`.
    async fn invoke(
        &self,
        dialog: &Dialog,
        prompt: &Prompt,
        model: &str,
        options: &CallOptions,
    ) -> Result<Message>;
}

/// A validated call: resolved card and effective options.
#[derive(Debug, Clone)]
pub struct PreparedCall {
    pub card: ModelCard,
    pub model: String,
    pub options: CallOptions,
}

impl PreparedCall {
    /// Reasoning models take no sampling temperature on the wire.
    pub fn sends_temperature(&self) -> bool {
        !self.card.is_reasoning
    }
}

/// Resolve the card and reject unsupported options before any request.
pub fn prepare_call(
    catalog: &dyn ModelCatalog,
    prompt: &Prompt,
    model: &str,
    options: &CallOptions,
) -> Result<PreparedCall> {
    let card = catalog.find(model)?;
    let structured = prompt.format().is_some();
    let tools = prompt.has_functions();
    if structured && tools {
        return Err(ParleyError::InvalidArgument(format!(
            "prompt {} combines structured output with function calling",
            prompt.path()
        )));
    }
    let mut options = options.clone();
    if card.is_reasoning && options.temperature.is_none() {
        options.temperature = Some(1.0);
    }
    card.check_options(&options, structured, tools)?;
    Ok(PreparedCall {
        card,
        model: model.to_string(),
        options,
    })
}

/// Build the message for a plain-content response, running the prompt's
/// output handling.
pub fn text_message(prompt: &Prompt, content: String) -> Message {
    let parsed = match prompt.format() {
        Some(schema) => serde_json::from_str::<Value>(&content).map_err(|e| {
            ParseError::new(format!("response is not valid JSON for {}: {e}", schema.name))
        }),
        None => prompt.parse(&content),
    };
    let mut message = Message::new(Role::Assistant, content, "assistant");
    match parsed {
        Ok(value) => message.parsed = Some(value),
        Err(err) => {
            message.errors.push(err.to_string());
            message.parsed = Some(json!({ "raw": message.content }));
        }
    }
    message
}

/// Build the message for a response that requested function calls.
pub fn tool_call_message(calls: Vec<FunctionCall>) -> Message {
    let mut message = Message::new(Role::ToolCall, tool_calls_summary(&calls), "assistant")
        .with_modality(Modality::FunctionCall);
    message.function_calls = calls;
    message
}

/// Stamp call bookkeeping onto a decoded response.
pub(crate) fn annotate(
    mut message: Message,
    call: &PreparedCall,
    api_type: ApiType,
    usage: Usage,
    raw: Value,
) -> Message {
    message.cost = Some(call.card.cost(&usage));
    message.usage = Some(usage);
    message.model = Some(call.model.clone());
    message.model_args = serde_json::to_value(&call.options).ok();
    message.api_type = Some(api_type);
    message.raw_response = Some(raw);
    message
}

/// Decode provider argument text into a JSON object.
pub(crate) fn decode_arguments(
    provider: &str,
    name: &str,
    arguments: &str,
) -> Result<serde_json::Map<String, Value>> {
    if arguments.trim().is_empty() {
        return Ok(serde_json::Map::new());
    }
    match serde_json::from_str::<Value>(arguments) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ParleyError::Provider {
            provider: provider.to_string(),
            message: format!("arguments for {name} are not an object: {other}"),
        }),
        Err(e) => Err(ParleyError::Provider {
            provider: provider.to_string(),
            message: format!("arguments for {name} are not valid JSON: {e}"),
        }),
    }
}

/// Create the binding for the configured call shape.
#[cfg(feature = "openai")]
pub fn create_binding(
    api_type: ApiType,
    config: &ParleyConfig,
    catalog: Arc<dyn ModelCatalog>,
) -> Result<Arc<dyn ModelBinding>> {
    let api_key = config
        .get_api_key("openai")
        .ok_or_else(|| ParleyError::Authentication("Missing OPENAI_API_KEY".into()))?;
    let base_url = config.get_base_url("openai");
    Ok(match api_type {
        ApiType::Completion => Arc::new(openai::OpenAiChatBinding::new(api_key, base_url, catalog)),
        ApiType::Response => {
            Arc::new(openai_responses::OpenAiResponsesBinding::new(api_key, base_url, catalog))
        }
    })
}

#[cfg(not(feature = "openai"))]
pub fn create_binding(
    _api_type: ApiType,
    _config: &ParleyConfig,
    _catalog: Arc<dyn ModelCatalog>,
) -> Result<Arc<dyn ModelBinding>> {
    Err(ParleyError::Configuration(
        "no model binding enabled via feature flags".into(),
    ))
}
