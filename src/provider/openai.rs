//! OpenAI Chat Completions API binding.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::dialog::Dialog;
use crate::error::{ParleyError, Result};
use crate::models::ModelCatalog;
use crate::prompt::Prompt;
use crate::types::*;

use super::format::{chat_response_format, chat_tool, image_data_url};
use super::http::{bearer_headers, shared_client, status_to_error};
use super::{annotate, decode_arguments, prepare_call, text_message, tool_call_message};
use super::{ModelBinding, PreparedCall};

pub(crate) const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiChatBinding {
    api_key: String,
    base_url: String,
    catalog: Arc<dyn ModelCatalog>,
}

impl OpenAiChatBinding {
    pub fn new(api_key: String, base_url: Option<String>, catalog: Arc<dyn ModelCatalog>) -> Self {
        Self {
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            catalog,
        }
    }

    fn build_request_body(&self, call: &PreparedCall, messages: Vec<Value>, prompt: &Prompt) -> Value {
        let mut obj = Map::new();
        obj.insert("model".into(), call.model.clone().into());
        obj.insert("messages".into(), messages.into());

        let options = &call.options;
        if let Some(max) = options.max_tokens {
            let key = if call.card.is_reasoning { "max_completion_tokens" } else { "max_tokens" };
            obj.insert(key.into(), max.into());
        }
        if call.sends_temperature() {
            if let Some(temp) = options.temperature {
                obj.insert("temperature".into(), temp.into());
            }
        }
        if let Some(top_p) = options.top_p {
            obj.insert("top_p".into(), top_p.into());
        }
        if let Some(ref stops) = options.stop_sequences {
            obj.insert("stop".into(), json!(stops));
        }
        if let Some(pp) = options.presence_penalty {
            obj.insert("presence_penalty".into(), pp.into());
        }
        if let Some(fp) = options.frequency_penalty {
            obj.insert("frequency_penalty".into(), fp.into());
        }
        if let Some(seed) = options.seed {
            obj.insert("seed".into(), seed.into());
        }
        if let Some(ref user) = options.user {
            obj.insert("user".into(), user.clone().into());
        }
        if call.card.is_reasoning {
            if let Some(effort) = options.reasoning_effort {
                obj.insert("reasoning_effort".into(), effort.to_string().into());
            }
        }
        if let Some(ref bias) = options.logit_bias {
            obj.insert("logit_bias".into(), json!(bias));
        }
        if let Some(logprobs) = options.logprobs {
            obj.insert("logprobs".into(), logprobs.into());
        }
        if let Some(top) = options.top_logprobs {
            obj.insert("top_logprobs".into(), top.into());
        }

        if prompt.has_functions() {
            let tools: Vec<Value> = prompt.functions().iter().map(chat_tool).collect();
            obj.insert("tools".into(), tools.into());
        }
        if let Some(schema) = prompt.format() {
            obj.insert("response_format".into(), chat_response_format(schema));
        }

        Value::Object(obj)
    }
}

#[async_trait]
impl ModelBinding for OpenAiChatBinding {
    fn provider_name(&self) -> &str {
        "openai"
    }

    fn api_type(&self) -> ApiType {
        ApiType::Completion
    }

    fn render_messages(&self, messages: &[Arc<Message>]) -> Result<Vec<Value>> {
        messages.iter().map(|m| message_to_openai(m)).collect()
    }

    async fn invoke(
        &self,
        dialog: &Dialog,
        prompt: &Prompt,
        model: &str,
        options: &CallOptions,
    ) -> Result<Message> {
        let call = prepare_call(self.catalog.as_ref(), prompt, model, options)?;
        let messages = self.render_messages(dialog.messages())?;
        let body = self.build_request_body(&call, messages, prompt);
        let base_url = call.card.base_url.as_deref().unwrap_or(&self.base_url);
        let url = format!("{base_url}/chat/completions");

        debug!(model = %call.model, prompt = prompt.path(), "OpenAI chat completion");

        let resp = shared_client()
            .post(&url)
            .headers(bearer_headers(&self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status != 200 {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(status_to_error(status, &body_text));
        }

        let raw: Value = resp.json().await?;
        let data: OpenAiChatResponse = serde_json::from_value(raw.clone())?;
        let choice = data
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ParleyError::api(200, "No choices in OpenAI response"))?;

        if let Some(refusal) = choice.message.refusal {
            return Err(ParleyError::Provider {
                provider: "openai".into(),
                message: format!("model refused the request: {refusal}"),
            });
        }

        let tool_calls = choice.message.tool_calls.unwrap_or_default();
        let mut message = if tool_calls.is_empty() {
            text_message(prompt, choice.message.content.unwrap_or_default())
        } else {
            let calls = tool_calls
                .into_iter()
                .map(|tc| {
                    let args = decode_arguments("openai", &tc.function.name, &tc.function.arguments)?;
                    Ok(FunctionCall::new(tc.id, tc.function.name, args))
                })
                .collect::<Result<Vec<_>>>()?;
            tool_call_message(calls)
        };
        message.logprobs = choice.logprobs.and_then(|l| l.content);
        if let Some(reason) = choice.finish_reason.as_deref().and_then(FinishReason::from_provider) {
            message.metadata.insert("finish_reason".into(), json!(reason));
        }

        let usage = data.usage.map(Usage::from).unwrap_or_default();
        debug!(
            model = %call.model,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            tool_calls = message.function_calls.len(),
            "OpenAI chat completion done"
        );
        Ok(annotate(message, &call, ApiType::Completion, usage, raw))
    }
}

/// Render one dialog message as a Chat Completions message.
fn message_to_openai(msg: &Message) -> Result<Value> {
    match msg.role {
        Role::Tool => {
            let id = msg.tool_call_id().ok_or_else(|| {
                ParleyError::InvalidArgument(format!(
                    "tool message from {} has no {TOOL_CALL_ID_KEY}",
                    msg.creator
                ))
            })?;
            Ok(json!({ "role": "tool", "content": msg.content, "tool_call_id": id }))
        }
        Role::ToolCall => {
            let tool_calls = replayed_tool_calls(msg).unwrap_or_else(|| {
                msg.function_calls
                    .iter()
                    .map(|fc| {
                        json!({
                            "id": fc.id,
                            "type": "function",
                            "function": { "name": fc.name, "arguments": fc.arguments_json() },
                        })
                    })
                    .collect()
            });
            Ok(json!({ "role": "assistant", "content": Value::Null, "tool_calls": tool_calls }))
        }
        _ if msg.modality == Modality::Image => {
            let mut parts = Vec::new();
            if let Some(caption) = msg.caption() {
                parts.push(json!({ "type": "text", "text": caption }));
            }
            parts.push(json!({
                "type": "image_url",
                "image_url": { "url": image_data_url(&msg.content) },
            }));
            Ok(json!({ "role": msg.role.openai(), "content": parts }))
        }
        _ => Ok(json!({ "role": msg.role.openai(), "content": msg.content })),
    }
}

/// The exact `tool_calls` the model sent, when this message came from Chat
/// Completions.
fn replayed_tool_calls(msg: &Message) -> Option<Vec<Value>> {
    if msg.api_type != Some(ApiType::Completion) {
        return None;
    }
    msg.raw_response
        .as_ref()?
        .pointer("/choices/0/message/tool_calls")?
        .as_array()
        .cloned()
}

// OpenAI API response types (internal)

#[derive(Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
    finish_reason: Option<String>,
    logprobs: Option<OpenAiLogprobs>,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
    refusal: Option<String>,
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Deserialize)]
struct OpenAiToolCall {
    id: String,
    function: OpenAiFunction,
}

#[derive(Deserialize)]
struct OpenAiFunction {
    name: String,
    arguments: String,
}

#[derive(Deserialize)]
struct OpenAiLogprobs {
    content: Option<Vec<TokenLogprob>>,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
    prompt_tokens_details: Option<OpenAiPromptDetails>,
    completion_tokens_details: Option<OpenAiCompletionDetails>,
}

#[derive(Deserialize)]
struct OpenAiPromptDetails {
    cached_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct OpenAiCompletionDetails {
    reasoning_tokens: Option<u32>,
}

impl From<OpenAiUsage> for Usage {
    fn from(u: OpenAiUsage) -> Self {
        Usage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
            cached_tokens: u.prompt_tokens_details.and_then(|d| d.cached_tokens),
            reasoning_tokens: u.completion_tokens_details.and_then(|d| d.reasoning_tokens),
        }
    }
}
