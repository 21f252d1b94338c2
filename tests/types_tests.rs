//! Tests for core types.

use std::str::FromStr;

use pretty_assertions::assert_eq;
use serde_json::{json, Map, Value};

use parley::types::*;

fn args(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

#[test]
fn message_constructors_set_role_and_creator() {
    let system = Message::system("You are helpful.");
    assert_eq!(system.role, Role::System);
    assert_eq!(system.creator, "system");

    let user = Message::user("Hello");
    assert_eq!(user.role, Role::User);
    assert_eq!(user.modality, Modality::Text);

    let reply = Message::assistant("Hi").with_metadata(TOOL_CALL_ID_KEY, json!("call_7"));
    assert_eq!(reply.tool_call_id(), Some("call_7"));
    assert!(!reply.is_function_call());
    assert!(!reply.has_errors());
}

#[test]
fn roles_map_onto_openai_names() {
    assert_eq!(Role::System.openai(), "developer");
    assert_eq!(Role::ToolCall.openai(), "assistant");
    assert_eq!(Role::Tool.openai(), "tool");
    assert_eq!(Role::ToolCall.to_string(), "tool_call");
    assert_eq!(Role::from_str("assistant").unwrap(), Role::Assistant);
    assert_eq!(ApiType::from_str("response").unwrap(), ApiType::Response);
}

#[test]
fn repeated_calls_ignore_ids() {
    let first = FunctionCall::new("c1", "lookup", args(json!({"q": "rust"})));
    let same = FunctionCall::new("c9", "lookup", args(json!({"q": "rust"})));
    let other = FunctionCall::new("c2", "lookup", args(json!({"q": "go"})));

    assert!(same.is_repeat_of(&first));
    assert!(same.is_repeated(&[other.clone(), first.clone()]));
    assert!(!other.is_repeated(&[first]));
    assert!(!other.is_repeated(&[]));
}

#[test]
fn tool_calls_summary_lists_each_call() {
    let calls = vec![
        FunctionCall::new("c1", "lookup", args(json!({"q": "rust"}))),
        FunctionCall::new("c2", "now", Map::new()),
    ];
    assert_eq!(
        tool_calls_summary(&calls),
        "Tool calls:\n\n0. lookup: {\"q\":\"rust\"}\n1. now: {}"
    );
}

#[test]
fn summary_line_truncates_and_flattens() {
    let m = Message::user("line one\nline two");
    assert_eq!(m.summary_line(100), "[user:user] line one line two");
    assert_eq!(m.summary_line(4), "[user:user] line...");

    let image = Message::user("AAAA").with_modality(Modality::Image);
    assert_eq!(image.summary_line(100), "[user:user] <image 4 bytes>");
}

#[test]
fn core_copy_drops_bookkeeping() {
    let mut m = Message::new(Role::Tool, "42", "function")
        .with_metadata("finish_reason", json!("stop"))
        .with_metadata(TOOL_CALL_ID_KEY, json!("call_9"))
        .with_metadata(DIALOG_ID_KEY, json!("dialog-1"));
    m.raw_response = Some(json!({"id": "x"}));
    m.attempts.push(std::sync::Arc::new(Message::assistant("draft")));

    let core = m.core();
    assert_eq!(core.content, "42");
    assert!(core.metadata.get("finish_reason").is_none());
    assert_eq!(core.tool_call_id(), Some("call_9"));
    assert_eq!(core.dialog_id(), Some("dialog-1"));
    assert!(core.attempts.is_empty());
    assert!(core.raw_response.is_none());
}

#[test]
fn message_serde_skips_empty_fields() {
    let m = Message::user("hi");
    let value = serde_json::to_value(&m).unwrap();
    assert_eq!(value["role"], json!("user"));
    assert!(value.get("function_calls").is_none());
    assert!(value.get("usage").is_none());

    let back: Message = serde_json::from_value(value).unwrap();
    assert_eq!(back, m);
}

#[test]
fn call_options_merge_prefers_overrides() {
    let base = CallOptions::builder()
        .temperature(0.3)
        .max_tokens(100)
        .user("alice".to_string())
        .build();
    let over = CallOptions::builder().temperature(0.9).seed(7).build();
    let merged = base.merge(&over);

    assert_eq!(merged.temperature, Some(0.9));
    assert_eq!(merged.max_tokens, Some(100));
    assert_eq!(merged.seed, Some(7));
    assert_eq!(merged.user.as_deref(), Some("alice"));
    assert!(!merged.wants_logprobs());
    assert!(CallOptions::builder().top_logprobs(2).build().wants_logprobs());
}

#[test]
fn finish_reasons_cover_both_apis() {
    assert_eq!(FinishReason::from_provider("stop"), Some(FinishReason::Stop));
    assert_eq!(FinishReason::from_provider("completed"), Some(FinishReason::Stop));
    assert_eq!(FinishReason::from_provider("max_output_tokens"), Some(FinishReason::Length));
    assert_eq!(FinishReason::from_provider("tool_calls"), Some(FinishReason::ToolCalls));
    assert_eq!(FinishReason::from_provider("weird"), None);
}

#[test]
fn usage_merge_accumulates_optional_counts() {
    let mut total = Usage {
        input_tokens: 10,
        output_tokens: 5,
        total_tokens: 15,
        cached_tokens: None,
        reasoning_tokens: Some(2),
    };
    total.merge(&Usage {
        input_tokens: 1,
        output_tokens: 1,
        total_tokens: 2,
        cached_tokens: Some(4),
        reasoning_tokens: Some(3),
    });
    assert_eq!(total.input_tokens, 11);
    assert_eq!(total.total_tokens, 17);
    assert_eq!(total.cached_tokens, Some(4));
    assert_eq!(total.reasoning_tokens, Some(5));
}
