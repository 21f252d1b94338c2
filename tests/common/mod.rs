//! Shared test helpers and a scripted model binding.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use parley::agent::{Agent, DiagnosticSink};
use parley::dialog::Dialog;
use parley::error::{ParleyError, Result};
use parley::log::{MemoryLog, ReplayLog};
use parley::models::StaticCatalog;
use parley::prompt::Prompt;
use parley::provider::{self, ModelBinding};
use parley::types::{ApiType, CallOptions, FunctionCall, Message, TokenLogprob, TopLogprob, Usage};
use parley::util::retry::BackoffPolicy;

/// One scripted model reply.
pub enum Step {
    /// Plain text run through the prompt's output handling.
    Text(String),
    /// Tool calls as `(id, name, arguments)`.
    Calls(Vec<(String, String, Value)>),
    /// One-token answer with top logprobs given as probabilities.
    Token(String, Vec<(String, f64)>),
    /// Fail the invocation.
    Error(ParleyError),
}

impl Step {
    pub fn text(s: &str) -> Self {
        Step::Text(s.to_string())
    }

    pub fn call(id: &str, name: &str, args: Value) -> Self {
        Step::Calls(vec![(id.to_string(), name.to_string(), args)])
    }

    pub fn token(token: &str, tops: &[(&str, f64)]) -> Self {
        Step::Token(
            token.to_string(),
            tops.iter().map(|(t, p)| (t.to_string(), *p)).collect(),
        )
    }
}

/// A binding that replays queued steps and records what it was shown.
pub struct ScriptedBinding {
    api_type: ApiType,
    steps: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
    seen_lengths: Mutex<Vec<usize>>,
    seen_options: Mutex<Vec<CallOptions>>,
}

impl ScriptedBinding {
    pub fn new(steps: Vec<Step>) -> Self {
        Self::with_api_type(ApiType::Completion, steps)
    }

    pub fn with_api_type(api_type: ApiType, steps: Vec<Step>) -> Self {
        Self {
            api_type,
            steps: Mutex::new(steps.into()),
            calls: AtomicUsize::new(0),
            seen_lengths: Mutex::new(Vec::new()),
            seen_options: Mutex::new(Vec::new()),
        }
    }

    /// Number of invocations so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Dialog length at each invocation.
    pub fn seen_lengths(&self) -> Vec<usize> {
        self.seen_lengths.lock().unwrap().clone()
    }

    pub fn seen_options(&self) -> Vec<CallOptions> {
        self.seen_options.lock().unwrap().clone()
    }
}

fn usage() -> Usage {
    Usage {
        input_tokens: 10,
        output_tokens: 5,
        total_tokens: 15,
        ..Default::default()
    }
}

#[async_trait]
impl ModelBinding for ScriptedBinding {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn api_type(&self) -> ApiType {
        self.api_type
    }

    fn render_messages(&self, messages: &[Arc<Message>]) -> Result<Vec<Value>> {
        Ok(messages
            .iter()
            .map(|m| json!({ "role": m.role.openai(), "content": m.content }))
            .collect())
    }

    async fn invoke(
        &self,
        dialog: &Dialog,
        prompt: &Prompt,
        model: &str,
        options: &CallOptions,
    ) -> Result<Message> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_lengths.lock().unwrap().push(dialog.len());
        self.seen_options.lock().unwrap().push(options.clone());
        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Step::text("script exhausted"));

        let mut message = match step {
            Step::Text(content) => provider::text_message(prompt, content),
            Step::Calls(calls) => provider::tool_call_message(
                calls
                    .into_iter()
                    .map(|(id, name, args)| {
                        let args: Map<String, Value> = args.as_object().cloned().unwrap_or_default();
                        FunctionCall::new(id, name, args)
                    })
                    .collect(),
            ),
            Step::Token(token, tops) => {
                let mut m = provider::text_message(prompt, token.clone());
                let chosen = tops
                    .iter()
                    .find(|(t, _)| *t == token)
                    .map_or(0.0, |(_, p)| p.ln());
                m.logprobs = Some(vec![TokenLogprob {
                    token,
                    logprob: chosen,
                    top_logprobs: tops
                        .into_iter()
                        .map(|(token, p)| TopLogprob { token, logprob: p.ln() })
                        .collect(),
                }]);
                m
            }
            Step::Error(err) => return Err(err),
        };
        message.model = Some(model.to_string());
        message.api_type = Some(self.api_type);
        message.usage = Some(usage());
        Ok(message)
    }
}

pub fn memory_log() -> Arc<MemoryLog> {
    Arc::new(MemoryLog::new())
}

/// Agent over `binding` with no backoff delays, recording incidents under
/// the system temp dir.
pub fn agent(name: &str, system: Prompt, binding: Arc<ScriptedBinding>, log: Arc<dyn ReplayLog>) -> Agent {
    let catalog = StaticCatalog::builtin();
    Agent::new(name, Arc::new(system), "gpt-4o-mini", binding, &catalog, log)
        .expect("agent")
        .with_backoff(BackoffPolicy::immediate())
        .with_diagnostics(DiagnosticSink::new(std::env::temp_dir().join("parley-test-diagnostics")))
}
