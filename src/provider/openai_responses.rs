//! OpenAI Responses API binding.

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

use super::format::{image_data_url, response_text_format, response_tool};
use super::http::{bearer_headers, shared_client, status_to_error};
use super::openai::DEFAULT_BASE_URL;
use super::{annotate, decode_arguments, prepare_call, text_message, tool_call_message};
use super::{ModelBinding, PreparedCall};

const LOGPROBS_INCLUDE: &str = "message.output_text.logprobs";

pub struct OpenAiResponsesBinding {
    api_key: String,
    base_url: String,
    catalog: Arc<dyn ModelCatalog>,
}

impl OpenAiResponsesBinding {
    pub fn new(api_key: String, base_url: Option<String>, catalog: Arc<dyn ModelCatalog>) -> Self {
        Self {
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            catalog,
        }
    }

    fn validate_options(call: &PreparedCall) -> Result<()> {
        if call.options.logit_bias.is_some() {
            return Err(ParleyError::UnsupportedOperation(
                "logit_bias is not available on the Responses API".into(),
            ));
        }
        Ok(())
    }

    fn build_request_body(&self, call: &PreparedCall, input: Vec<Value>, prompt: &Prompt) -> Value {
        let mut obj = Map::new();
        obj.insert("model".into(), call.model.clone().into());
        obj.insert("input".into(), input.into());

        let options = &call.options;
        if let Some(max) = options.max_tokens {
            obj.insert("max_output_tokens".into(), max.into());
        }
        if call.sends_temperature() {
            if let Some(temp) = options.temperature {
                obj.insert("temperature".into(), temp.into());
            }
        }
        if let Some(top_p) = options.top_p {
            obj.insert("top_p".into(), top_p.into());
        }
        if let Some(ref user) = options.user {
            obj.insert("user".into(), user.clone().into());
        }
        if call.card.is_reasoning {
            if let Some(effort) = options.reasoning_effort {
                obj.insert("reasoning".into(), json!({ "effort": effort.to_string() }));
            }
        }
        if options.logprobs == Some(true) {
            obj.insert("include".into(), json!([LOGPROBS_INCLUDE]));
            if let Some(top) = options.top_logprobs {
                obj.insert("top_logprobs".into(), top.into());
            }
        }

        if prompt.has_functions() {
            let tools: Vec<Value> = prompt.functions().iter().map(response_tool).collect();
            obj.insert("tools".into(), tools.into());
        }
        if let Some(schema) = prompt.format() {
            obj.insert("text".into(), response_text_format(schema));
        }

        Value::Object(obj)
    }

    fn build_input_items(messages: &[Arc<Message>]) -> Result<Vec<Value>> {
        let mut input = Vec::new();
        for msg in messages {
            if let Some(call_id) = msg.tool_call_id() {
                input.push(json!({
                    "type": "function_call_output",
                    "call_id": call_id,
                    "output": msg.content,
                }));
                continue;
            }
            match msg.role {
                Role::ToolCall => match replayed_output_items(msg) {
                    Some(items) => input.extend(items),
                    None => input.extend(msg.function_calls.iter().map(|fc| {
                        json!({
                            "type": "function_call",
                            "call_id": fc.id,
                            "name": fc.name,
                            "arguments": fc.arguments_json(),
                        })
                    })),
                },
                Role::Tool => {
                    return Err(ParleyError::InvalidArgument(format!(
                        "tool message from {} has no {TOOL_CALL_ID_KEY}",
                        msg.creator
                    )))
                }
                _ if msg.modality == Modality::Image => {
                    let mut parts = Vec::new();
                    if let Some(caption) = msg.caption() {
                        parts.push(json!({ "type": "input_text", "text": caption }));
                    }
                    parts.push(json!({
                        "type": "input_image",
                        "image_url": image_data_url(&msg.content),
                    }));
                    input.push(json!({ "role": msg.role.openai(), "content": parts }));
                }
                _ => input.push(json!({ "role": msg.role.openai(), "content": msg.content })),
            }
        }
        Ok(input)
    }

    fn parse_response(prompt: &Prompt, data: ResponsesApiResponse) -> Result<Message> {
        let mut text = String::new();
        let mut logprobs: Vec<TokenLogprob> = Vec::new();
        let mut calls = Vec::new();

        for output in data.output {
            match output.r#type.as_str() {
                "message" => {
                    for chunk in output.content.unwrap_or_default() {
                        match chunk.r#type.as_str() {
                            "output_text" => {
                                text.push_str(chunk.text.as_deref().unwrap_or_default());
                                logprobs.extend(chunk.logprobs.unwrap_or_default());
                            }
                            "refusal" => {
                                return Err(ParleyError::Provider {
                                    provider: "openai".into(),
                                    message: format!(
                                        "model refused the request: {}",
                                        chunk.refusal.unwrap_or_default()
                                    ),
                                })
                            }
                            _ => {}
                        }
                    }
                }
                "function_call" => {
                    if let (Some(id), Some(name)) = (output.call_id, output.name) {
                        let args = decode_arguments(
                            "openai",
                            &name,
                            output.arguments.as_deref().unwrap_or_default(),
                        )?;
                        calls.push(FunctionCall::new(id, name, args));
                    }
                }
                _ => {}
            }
        }

        let mut message = if calls.is_empty() {
            text_message(prompt, text)
        } else {
            tool_call_message(calls)
        };
        if !logprobs.is_empty() {
            message.logprobs = Some(logprobs);
        }
        let finish = if message.is_function_call() {
            Some(FinishReason::ToolCalls)
        } else {
            data.status.as_deref().and_then(FinishReason::from_provider)
        };
        if let Some(reason) = finish {
            message.metadata.insert("finish_reason".into(), json!(reason));
        }
        Ok(message)
    }

    fn map_usage(usage: Option<ResponsesUsage>) -> Usage {
        usage
            .map(|u| Usage {
                input_tokens: u.input_tokens,
                output_tokens: u.output_tokens,
                total_tokens: u.total_tokens.unwrap_or(u.input_tokens + u.output_tokens),
                cached_tokens: u.input_tokens_details.and_then(|d| d.cached_tokens),
                reasoning_tokens: u.output_tokens_details.and_then(|d| d.reasoning_tokens),
            })
            .unwrap_or_default()
    }
}

/// Output items of a Responses tool-call turn, replayed as input so that
/// reasoning items stay paired with their function calls.
fn replayed_output_items(msg: &Message) -> Option<Vec<Value>> {
    if msg.api_type != Some(ApiType::Response) {
        return None;
    }
    let items = msg.raw_response.as_ref()?.get("output")?.as_array()?;
    Some(
        items
            .iter()
            .filter(|item| {
                matches!(
                    item.get("type").and_then(Value::as_str),
                    Some("function_call") | Some("reasoning")
                )
            })
            .cloned()
            .collect(),
    )
}

#[async_trait]
impl ModelBinding for OpenAiResponsesBinding {
    fn provider_name(&self) -> &str {
        "openai"
    }

    fn api_type(&self) -> ApiType {
        ApiType::Response
    }

    fn render_messages(&self, messages: &[Arc<Message>]) -> Result<Vec<Value>> {
        Self::build_input_items(messages)
    }

    async fn invoke(
        &self,
        dialog: &Dialog,
        prompt: &Prompt,
        model: &str,
        options: &CallOptions,
    ) -> Result<Message> {
        let call = prepare_call(self.catalog.as_ref(), prompt, model, options)?;
        Self::validate_options(&call)?;
        let input = self.render_messages(dialog.messages())?;
        let body = self.build_request_body(&call, input, prompt);
        let base_url = call.card.base_url.as_deref().unwrap_or(&self.base_url);
        let url = format!("{base_url}/responses");

        debug!(model = %call.model, prompt = prompt.path(), "OpenAI responses call");

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
        let data: ResponsesApiResponse = serde_json::from_value(raw.clone())?;
        let usage = Self::map_usage(data.usage.clone());
        let message = Self::parse_response(prompt, data)?;
        debug!(
            model = %call.model,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            tool_calls = message.function_calls.len(),
            "OpenAI responses call done"
        );
        Ok(annotate(message, &call, ApiType::Response, usage, raw))
    }
}

#[derive(Deserialize)]
struct ResponsesApiResponse {
    #[serde(default)]
    output: Vec<ResponsesOutputItem>,
    status: Option<String>,
    usage: Option<ResponsesUsage>,
}

#[derive(Deserialize)]
struct ResponsesOutputItem {
    r#type: String,
    content: Option<Vec<ResponsesOutputContent>>,
    #[serde(default)]
    call_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Deserialize)]
struct ResponsesOutputContent {
    r#type: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
    #[serde(default)]
    logprobs: Option<Vec<TokenLogprob>>,
}

#[derive(Deserialize, Clone)]
struct ResponsesUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
    #[serde(default)]
    total_tokens: Option<u32>,
    #[serde(default)]
    input_tokens_details: Option<ResponsesInputDetails>,
    #[serde(default)]
    output_tokens_details: Option<ResponsesOutputDetails>,
}

#[derive(Deserialize, Clone)]
struct ResponsesInputDetails {
    cached_tokens: Option<u32>,
}

#[derive(Deserialize, Clone)]
struct ResponsesOutputDetails {
    reasoning_tokens: Option<u32>,
}
