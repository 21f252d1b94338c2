#![cfg(feature = "openai")]

use std::sync::Arc;

use serde_json::{json, Map};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use parley::dialog::{Dialog, MessageOptions};
use parley::error::ParleyError;
use parley::log::NoLog;
use parley::models::StaticCatalog;
use parley::prompt::{Prompt, PromptArgs};
use parley::provider::openai_responses::OpenAiResponsesBinding;
use parley::provider::{self, ModelBinding};
use parley::tools::{Function, FunctionParameters};
use parley::types::{ApiType, CallOptions, FunctionCall, Role, TOOL_CALL_ID_KEY};

fn binding(server: &MockServer) -> OpenAiResponsesBinding {
    OpenAiResponsesBinding::new("test-key".into(), Some(server.uri()), Arc::new(StaticCatalog::builtin()))
}

fn lookup_prompt() -> Arc<Prompt> {
    Arc::new(
        Prompt::builder("t/lookup", "Find {q}")
            .function(Function::new(
                "lookup",
                "Look up a term",
                FunctionParameters::object().string("q", "query", true).build(),
            ))
            .build()
            .unwrap(),
    )
}

#[tokio::test]
async fn function_call_items_become_tool_calls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/responses"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "tools": [{"type": "function", "name": "lookup"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "completed",
            "output": [{
                "type": "function_call",
                "call_id": "fc_1",
                "name": "lookup",
                "arguments": "{\"q\":\"tokio\"}"
            }],
            "usage": {"input_tokens": 30, "output_tokens": 9}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let prompt = lookup_prompt();
    let mut dialog = Dialog::new(Arc::new(NoLog), "wire");
    let mut args = PromptArgs::new();
    args.insert("q".into(), json!("tokio"));
    dialog.send_message(prompt.clone(), &args).unwrap();

    let message = binding(&server)
        .invoke(&dialog, &prompt, "gpt-4o-mini", &CallOptions::default())
        .await
        .unwrap();

    assert_eq!(message.role, Role::ToolCall);
    assert_eq!(message.api_type, Some(ApiType::Response));
    assert_eq!(message.function_calls[0].id, "fc_1");
    assert_eq!(message.function_calls[0].arguments["q"], json!("tokio"));
    assert_eq!(message.usage.as_ref().map(|u| u.total_tokens), Some(39));
}

#[tokio::test]
async fn tool_results_are_sent_as_function_call_outputs() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/responses"))
        .and(body_partial_json(json!({
            "input": [
                {"role": "user"},
                {"type": "function_call", "call_id": "fc_1", "name": "lookup"},
                {"type": "function_call_output", "call_id": "fc_1", "output": "tokio is a runtime"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "completed",
            "output": [{
                "type": "message",
                "content": [{"type": "output_text", "text": "It is an async runtime."}]
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let prompt = lookup_prompt();
    let mut dialog = Dialog::new(Arc::new(NoLog), "wire");
    let mut args = PromptArgs::new();
    args.insert("q".into(), json!("tokio"));
    dialog.send_message(prompt.clone(), &args).unwrap();
    let mut call_args = Map::new();
    call_args.insert("q".into(), json!("tokio"));
    dialog.append(provider::tool_call_message(vec![FunctionCall::new("fc_1", "lookup", call_args)]));
    let mut metadata = Map::new();
    metadata.insert(TOOL_CALL_ID_KEY.into(), json!("fc_1"));
    dialog
        .send_message_with(
            "tokio is a runtime",
            &PromptArgs::new(),
            MessageOptions::builder().role(Role::User).creator("function").metadata(metadata).build(),
        )
        .unwrap();

    let message = binding(&server)
        .invoke(&dialog, &prompt, "gpt-4o-mini", &CallOptions::default())
        .await
        .unwrap();
    assert_eq!(message.content, "It is an async runtime.");
    assert_eq!(message.role, Role::Assistant);
}

#[tokio::test]
async fn refusals_are_provider_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/responses"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "completed",
            "output": [{
                "type": "message",
                "content": [{"type": "refusal", "refusal": "I can't help with that."}]
            }]
        })))
        .mount(&server)
        .await;

    let prompt = Arc::new(Prompt::new("t/ask", "Something"));
    let mut dialog = Dialog::new(Arc::new(NoLog), "wire");
    dialog.send_message(prompt.clone(), &PromptArgs::new()).unwrap();

    let err = binding(&server)
        .invoke(&dialog, &prompt, "gpt-4o-mini", &CallOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ParleyError::Provider { .. }));
}

#[tokio::test]
async fn logit_bias_is_rejected_before_any_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let prompt = Arc::new(Prompt::new("t/ask", "Yes or no?"));
    let mut dialog = Dialog::new(Arc::new(NoLog), "wire");
    dialog.send_message(prompt.clone(), &PromptArgs::new()).unwrap();

    let mut bias = std::collections::BTreeMap::new();
    bias.insert(9891u32, 10);
    let options = CallOptions::builder().logit_bias(bias).build();
    let err = binding(&server)
        .invoke(&dialog, &prompt, "gpt-4o-mini", &options)
        .await
        .unwrap_err();
    assert!(matches!(err, ParleyError::UnsupportedOperation(_)));
}

#[tokio::test]
async fn throttling_maps_to_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/responses"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let prompt = Arc::new(Prompt::new("t/ask", "hi"));
    let mut dialog = Dialog::new(Arc::new(NoLog), "wire");
    dialog.send_message(prompt.clone(), &PromptArgs::new()).unwrap();

    let err = binding(&server)
        .invoke(&dialog, &prompt, "gpt-4o-mini", &CallOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ParleyError::RateLimited { retry_after_ms: None }));
}
