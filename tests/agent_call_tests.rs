//! Agent call loop: interrupts, retries and budgets.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;

use common::{agent, memory_log, ScriptedBinding, Step};
use parley::agent::{Agent, AgentLimits, CallArgs, DiagnosticSink};
use parley::config::ProjectConfig;
use parley::error::ParleyError;
use parley::log::Collection;
use parley::models::StaticCatalog;
use parley::prompt::{Prompt, PromptArgs};
use parley::tools::{Function, FunctionParameters};
use parley::types::{ApiType, CallOptions, Role, TOOL_CALL_ID_KEY};
use parley::util::retry::BackoffPolicy;

fn echo_prompt(counter: Arc<AtomicUsize>) -> Prompt {
    let echo = Function::new(
        "echo",
        "Echo x back",
        FunctionParameters::object().integer("x", "value to echo", true).build(),
    )
    .with_handler(move |args| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ParleyError>(json!(args.get_i64("x")?))
        }
    });
    Prompt::builder("task/echo", "Echo {value}")
        .function(echo)
        .build()
        .unwrap()
}

fn system() -> Prompt {
    Prompt::new("test/system", "You are a test agent.")
}

fn limits(max_exception_retry: usize, max_interrupt_times: usize, max_llm_recall: usize) -> AgentLimits {
    AgentLimits {
        max_exception_retry,
        max_interrupt_times,
        max_llm_recall,
    }
}

#[tokio::test]
async fn repeated_call_is_answered_without_running_the_handler() {
    let runs = Arc::new(AtomicUsize::new(0));
    let binding = Arc::new(ScriptedBinding::new(vec![
        Step::call("c1", "echo", json!({"x": 1})),
        Step::call("c2", "echo", json!({"x": 1})),
        Step::text("done"),
    ]));
    let agent = agent("echoer", system(), binding.clone(), memory_log()).with_limits(limits(3, 2, 0));

    let mut dialog = agent.init_dialog(&PromptArgs::new(), Some("s".into())).unwrap();
    let mut args = PromptArgs::new();
    args.insert("value".into(), json!(1));
    dialog
        .send_message(Arc::new(echo_prompt(runs.clone())), &args)
        .unwrap();

    let response = agent.call(&mut dialog).await.unwrap();

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(response.interrupts.len(), 1);
    assert_eq!(response.interrupts[0].result_str.as_deref().map(|s| s.contains("1")), Some(true));
    assert_eq!(response.message.content, "done");
    assert_eq!(response.message.role, Role::Assistant);
    assert_eq!(response.message.creator, "echoer");
    assert_eq!(binding.calls(), 3);

    // system, user, then per round: response + one result, plus the final
    // handler on the last permitted round.
    assert_eq!(dialog.len(), 8);
    let roles: Vec<Role> = dialog.messages().iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![
            Role::System,
            Role::User,
            Role::ToolCall,
            Role::Tool,
            Role::ToolCall,
            Role::Tool,
            Role::User,
            Role::Assistant,
        ]
    );
    let repeat = &dialog.messages()[5];
    assert!(repeat.content.contains("has been called earlier"));
    assert_eq!(repeat.tool_call_id(), Some("c2"));
    assert_eq!(repeat.creator, "function");
    assert_eq!(dialog.messages()[6].content, "Please provide your final response.");
    assert_eq!(binding.seen_lengths(), vec![2, 4, 7]);
}

#[tokio::test]
async fn tool_results_use_user_role_on_the_responses_api() {
    let runs = Arc::new(AtomicUsize::new(0));
    let binding = Arc::new(ScriptedBinding::with_api_type(
        ApiType::Response,
        vec![Step::call("call_9", "echo", json!({"x": 4})), Step::text("four")],
    ));
    let agent = agent("echoer", system(), binding, memory_log());
    let mut dialog = agent.init_dialog(&PromptArgs::new(), None).unwrap();
    let mut args = PromptArgs::new();
    args.insert("value".into(), json!(4));
    dialog.send_message(Arc::new(echo_prompt(runs)), &args).unwrap();

    agent.call(&mut dialog).await.unwrap();

    let result = &dialog.messages()[3];
    assert_eq!(result.role, Role::User);
    assert_eq!(result.metadata[TOOL_CALL_ID_KEY], json!("call_9"));
    assert_eq!(dialog.top_prompt().map(|p| p.path()), Some("__task/echo_interrupt_handler"));
}

#[tokio::test]
async fn each_round_grows_the_dialog_by_response_plus_results() {
    let runs = Arc::new(AtomicUsize::new(0));
    let binding = Arc::new(ScriptedBinding::new(vec![
        Step::Calls(vec![
            ("a".into(), "echo".into(), json!({"x": 1})),
            ("b".into(), "echo".into(), json!({"x": 2})),
        ]),
        Step::call("c", "echo", json!({"x": 3})),
        Step::text("all done"),
    ]));
    let agent = agent("echoer", system(), binding, memory_log());
    let mut dialog = agent.init_dialog(&PromptArgs::new(), None).unwrap();
    let mut args = PromptArgs::new();
    args.insert("value".into(), json!(0));
    dialog.send_message(Arc::new(echo_prompt(runs.clone())), &args).unwrap();
    let before: Vec<_> = dialog.messages().to_vec();

    let response = agent.call(&mut dialog).await.unwrap();

    assert_eq!(runs.load(Ordering::SeqCst), 3);
    assert_eq!(response.interrupts.len(), 3);
    assert_eq!(dialog.len(), before.len() + (1 + 2) + (1 + 1) + 1);
    for (kept, original) in dialog.messages().iter().zip(&before) {
        assert!(Arc::ptr_eq(kept, original));
    }
}

#[tokio::test]
async fn unparseable_responses_exhaust_the_exception_budget() {
    let binding = Arc::new(ScriptedBinding::new(vec![
        Step::text("no tags"),
        Step::text("still none"),
        Step::text("nope"),
    ]));
    let agent = agent("tagger", system(), binding.clone(), memory_log()).with_limits(limits(2, 5, 0));
    let prompt = Prompt::builder("task/tagged", "Answer inside <answer> tags.")
        .xml_tags(["answer"])
        .build()
        .unwrap();
    let mut dialog = agent.init_dialog(&PromptArgs::new(), None).unwrap();
    dialog.send_message(Arc::new(prompt), &PromptArgs::new()).unwrap();

    let err = agent.call(&mut dialog).await.unwrap_err();

    match err {
        ParleyError::OutputParse { message, attempts } => {
            assert!(message.contains("answer"));
            assert_eq!(attempts.len(), 3);
            assert!(attempts.iter().all(|a| a.has_errors()));
        }
        other => panic!("expected OutputParse, got {other:?}"),
    }
    assert_eq!(binding.calls(), 3);
    assert_eq!(dialog.len(), 2);
    // Each retry sees its failed reply and the exception handler.
    assert_eq!(binding.seen_lengths(), vec![2, 4, 6]);
}

#[tokio::test]
async fn recovered_parse_failure_is_kept_as_an_attempt() {
    let binding = Arc::new(ScriptedBinding::new(vec![
        Step::text("forgot"),
        Step::text("<answer>42</answer>"),
    ]));
    let agent = agent("tagger", system(), binding, memory_log());
    let prompt = Prompt::builder("task/tagged", "Answer inside <answer> tags.")
        .xml_tags(["answer"])
        .build()
        .unwrap();
    let mut dialog = agent.init_dialog(&PromptArgs::new(), None).unwrap();
    dialog.send_message(Arc::new(prompt), &PromptArgs::new()).unwrap();

    let response = agent.call(&mut dialog).await.unwrap();

    assert_eq!(dialog.len(), 3);
    assert_eq!(response.message.attempts.len(), 1);
    assert_eq!(response.message.attempts[0].content, "forgot");
    assert!(!response.message.has_errors());
}

#[tokio::test(start_paused = true)]
async fn rate_limits_are_retried_without_spending_budget() {
    let binding = Arc::new(ScriptedBinding::new(vec![
        Step::Error(ParleyError::RateLimited { retry_after_ms: Some(2_000) }),
        Step::Error(ParleyError::api(400, "Rate limit is exceeded. Try again later.")),
        Step::Error(ParleyError::RateLimited { retry_after_ms: None }),
        Step::text("finally"),
    ]));
    let agent = agent("patient", system(), binding.clone(), memory_log())
        .with_limits(limits(0, 5, 0))
        .with_backoff(BackoffPolicy::default());
    let mut dialog = agent.init_dialog(&PromptArgs::new(), None).unwrap();
    dialog.send_message("hi", &PromptArgs::new()).unwrap();

    let start = tokio::time::Instant::now();
    let response = agent.call(&mut dialog).await.unwrap();

    assert_eq!(response.message.content, "finally");
    assert_eq!(binding.calls(), 4);
    assert!(start.elapsed() >= std::time::Duration::from_secs(3));
}

#[tokio::test]
async fn transport_failures_spend_the_recall_budget_then_write_a_diagnostic() {
    let dir = tempfile::tempdir().unwrap();
    let binding = Arc::new(ScriptedBinding::new(vec![
        Step::Error(ParleyError::api(502, "bad gateway")),
        Step::Error(ParleyError::api(503, "unavailable")),
        Step::text("never reached"),
    ]));
    let agent = agent("flaky", system(), binding.clone(), memory_log())
        .with_limits(limits(3, 5, 1))
        .with_diagnostics(DiagnosticSink::new(dir.path()));
    let mut dialog = agent.init_dialog(&PromptArgs::new(), None).unwrap();
    dialog.send_message("hi", &PromptArgs::new()).unwrap();

    let err = agent.call(&mut dialog).await.unwrap_err();

    assert!(matches!(err, ParleyError::Api { status: 503, .. }));
    assert_eq!(binding.calls(), 2);
    let files: Vec<_> = std::fs::read_dir(dir.path().join("flaky")).unwrap().collect();
    assert_eq!(files.len(), 1);
    assert_eq!(dialog.len(), 2);
}

#[tokio::test]
async fn transport_recall_recovers_within_budget() {
    let binding = Arc::new(ScriptedBinding::new(vec![
        Step::Error(ParleyError::Timeout(30_000)),
        Step::text("ok"),
    ]));
    let agent = agent("flaky", system(), binding.clone(), memory_log()).with_limits(limits(3, 5, 2));
    let mut dialog = agent.init_dialog(&PromptArgs::new(), None).unwrap();
    dialog.send_message("hi", &PromptArgs::new()).unwrap();

    let response = agent.call(&mut dialog).await.unwrap();
    assert_eq!(response.message.content, "ok");
    assert_eq!(binding.calls(), 2);
}

#[tokio::test]
async fn registry_errors_are_not_retried() {
    let binding = Arc::new(ScriptedBinding::new(vec![
        Step::Error(ParleyError::PromptNotFound("missing".into())),
        Step::text("unused"),
    ]));
    let agent = agent("strict", system(), binding.clone(), memory_log()).with_limits(limits(3, 5, 3));
    let mut dialog = agent.init_dialog(&PromptArgs::new(), None).unwrap();
    dialog.send_message("hi", &PromptArgs::new()).unwrap();

    let err = agent.call(&mut dialog).await.unwrap_err();
    assert!(matches!(err, ParleyError::PromptNotFound(_)));
    assert_eq!(binding.calls(), 1);
}

#[tokio::test]
async fn unlinked_function_is_fatal() {
    let unlinked = Function::new("lookup", "Look up", FunctionParameters::empty());
    let prompt = Prompt::builder("task/lookup", "Find it").function(unlinked).build().unwrap();
    let binding = Arc::new(ScriptedBinding::new(vec![Step::call("c1", "lookup", json!({}))]));
    let agent = agent("looker", system(), binding, memory_log());
    let mut dialog = agent.init_dialog(&PromptArgs::new(), None).unwrap();
    dialog.send_message(Arc::new(prompt), &PromptArgs::new()).unwrap();

    let err = agent.call(&mut dialog).await.unwrap_err();
    assert!(matches!(err, ParleyError::FunctionNotLinked(name) if name == "lookup"));
}

#[tokio::test]
async fn call_without_a_prompt_is_invalid_state() {
    let binding = Arc::new(ScriptedBinding::new(vec![]));
    let agent = agent("idle", system(), binding.clone(), memory_log());
    let mut dialog = parley::dialog::Dialog::new(memory_log(), "empty");

    let err = agent.call(&mut dialog).await.unwrap_err();
    assert!(matches!(err, ParleyError::InvalidState(_)));
    assert_eq!(binding.calls(), 0);
}

#[tokio::test]
async fn call_args_override_options_and_tag_the_response() {
    let binding = Arc::new(ScriptedBinding::new(vec![Step::text("tuned")]));
    let agent = agent("tuner", system(), binding.clone(), memory_log())
        .with_options(CallOptions::builder().temperature(0.2).max_tokens(100).build());
    let mut dialog = agent.init_dialog(&PromptArgs::new(), None).unwrap();
    dialog.send_message("hi", &PromptArgs::new()).unwrap();

    let mut metadata = serde_json::Map::new();
    metadata.insert("trace".into(), json!("t-1"));
    let args = CallArgs::builder()
        .options(CallOptions::builder().temperature(0.9).build())
        .metadata(metadata)
        .build();
    let response = agent.call_with(&mut dialog, args).await.unwrap();

    let seen = binding.seen_options();
    assert_eq!(seen[0].temperature, Some(0.9));
    assert_eq!(seen[0].max_tokens, Some(100));
    assert_eq!(response.message.metadata["trace"], json!("t-1"));
}

#[tokio::test]
async fn every_appended_message_is_logged() {
    let log = memory_log();
    let binding = Arc::new(ScriptedBinding::new(vec![Step::text("logged")]));
    let agent = agent("logger", system(), binding, log.clone());
    let mut dialog = agent.init_dialog(&PromptArgs::new(), Some("logged-session".into())).unwrap();
    dialog.send_message("hi", &PromptArgs::new()).unwrap();
    agent.call(&mut dialog).await.unwrap();

    assert_eq!(log.count(Collection::Messages), 3);
    assert_eq!(log.sessions(Collection::Dialogs), vec!["logged-session".to_string()]);
}

#[tokio::test]
async fn tool_calls_after_the_final_round_exhaust_the_interrupt_budget() {
    let runs = Arc::new(AtomicUsize::new(0));
    let binding = Arc::new(ScriptedBinding::new(vec![
        Step::call("c1", "echo", json!({"x": 1})),
        Step::call("c2", "echo", json!({"x": 2})),
        Step::call("c3", "echo", json!({"x": 3})),
    ]));
    let agent = agent("eager", system(), binding.clone(), memory_log()).with_limits(limits(3, 1, 0));
    let mut dialog = agent.init_dialog(&PromptArgs::new(), None).unwrap();
    let mut args = PromptArgs::new();
    args.insert("value".into(), json!(1));
    dialog.send_message(Arc::new(echo_prompt(runs.clone())), &args).unwrap();

    let err = agent.call(&mut dialog).await.unwrap_err();

    assert!(matches!(
        err,
        ParleyError::InterruptBudgetExhausted { max_interrupt_times: 1 }
    ));
    assert_eq!(binding.calls(), 2);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    let roles: Vec<Role> = dialog.messages().iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![
            Role::System,
            Role::User,
            Role::ToolCall,
            Role::Tool,
            Role::User,
            Role::ToolCall,
        ]
    );
}

#[test]
fn new_agents_record_diagnostics_under_the_default_log_dir() {
    let binding = Arc::new(ScriptedBinding::new(vec![]));
    let agent = Agent::new(
        "plain",
        Arc::new(system()),
        "gpt-4o-mini",
        binding,
        &StaticCatalog::builtin(),
        memory_log(),
    )
    .unwrap();

    let expected = ProjectConfig::default().diagnostics_dir().ok();
    assert_eq!(agent.diagnostics().map(|sink| sink.dir().to_path_buf()), expected);
    if let Some(sink) = agent.diagnostics() {
        assert!(sink.dir().ends_with("logs/diagnostics"));
    }
}
