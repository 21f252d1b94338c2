//! Agent: one model, one system prompt, and the call/interrupt/retry loop.

use std::sync::Arc;

use bon::Builder;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::config::{AgentConfig, ParleyConfig, ProjectConfig};
use crate::dialog::{default_session_name, Dialog, MessageOptions};
use crate::error::{ParleyError, Result};
use crate::log::ReplayLog;
use crate::models::{ModelCard, ModelCatalog};
use crate::prompt::{Prompt, PromptArgs, PromptRegistry};
use crate::provider::{self, ModelBinding};
use crate::types::{ApiType, CallOptions, FunctionCall, Message, Role, TOOL_CALL_ID_KEY};
use crate::util::retry::BackoffPolicy;

use super::attempt::Attempt;
use super::diagnostics::DiagnosticSink;

/// Retry and interrupt budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentLimits {
    /// Re-asks after an unparseable response, per interrupt round.
    pub max_exception_retry: usize,
    /// Tool-call rounds before the final response is forced; `0` is unbounded.
    pub max_interrupt_times: usize,
    /// Re-invocations after a transport failure, per interrupt round.
    pub max_llm_recall: usize,
}

impl Default for AgentLimits {
    fn default() -> Self {
        Self {
            max_exception_retry: 3,
            max_interrupt_times: 5,
            max_llm_recall: 0,
        }
    }
}

impl AgentLimits {
    /// Project-wide limits with the agent's own overrides applied.
    pub fn from_config(project: &ProjectConfig, agent: &AgentConfig) -> Self {
        Self {
            max_exception_retry: agent.max_exception_retry.unwrap_or(project.max_exception_retry),
            max_interrupt_times: agent.max_interrupt_times.unwrap_or(project.max_interrupt_times),
            max_llm_recall: agent.max_llm_recall.unwrap_or(project.max_llm_recall),
        }
    }

    /// Number of rounds allowed, `None` when unbounded.
    fn rounds(&self) -> Option<usize> {
        (self.max_interrupt_times > 0).then_some(self.max_interrupt_times + 1)
    }
}

/// Per-call overrides.
#[derive(Debug, Clone, Default, Builder)]
pub struct CallArgs {
    /// Merged over the agent's default options.
    #[builder(default)]
    pub options: CallOptions,
    /// Added to the response message's metadata.
    #[builder(default)]
    pub metadata: Map<String, Value>,
}

/// Final message of an agent call and every function call it dispatched.
#[derive(Debug, Clone)]
pub struct AgentResponse {
    pub message: Arc<Message>,
    pub interrupts: Vec<FunctionCall>,
}

/// Text returned for a call that repeats an earlier one.
pub fn repeated_call_notice(call: &FunctionCall) -> String {
    format!(
        "The function {} with identical arguments {} has been called earlier, please check the previous results and do not call it again. If you do not need to call more functions, just stop calling and provide the final response.",
        call.name,
        call.arguments_json()
    )
}

pub struct Agent {
    name: String,
    system_prompt: Arc<Prompt>,
    model: String,
    card: ModelCard,
    binding: Arc<dyn ModelBinding>,
    log: Arc<dyn ReplayLog>,
    options: CallOptions,
    limits: AgentLimits,
    backoff: BackoffPolicy,
    diagnostics: Option<DiagnosticSink>,
}

impl Agent {
    /// Create an agent. `model` may be a card or snapshot name; calls go to
    /// the card's latest snapshot.
    pub fn new(
        name: impl Into<String>,
        system_prompt: Arc<Prompt>,
        model: &str,
        binding: Arc<dyn ModelBinding>,
        catalog: &dyn ModelCatalog,
        log: Arc<dyn ReplayLog>,
    ) -> Result<Self> {
        let card = catalog.find(model)?;
        Ok(Self {
            name: name.into(),
            system_prompt,
            model: card.latest_snapshot().to_string(),
            card,
            binding,
            log,
            options: CallOptions::default(),
            limits: AgentLimits::default(),
            backoff: BackoffPolicy::default(),
            diagnostics: ProjectConfig::default().diagnostics_dir().ok().map(DiagnosticSink::new),
        })
    }

    /// Build the `[agents.<name>]` agent of a project around `binding`.
    pub fn from_config(
        name: &str,
        project: &ProjectConfig,
        registry: &PromptRegistry,
        binding: Arc<dyn ModelBinding>,
        catalog: &dyn ModelCatalog,
        log: Arc<dyn ReplayLog>,
    ) -> Result<Self> {
        let config = project.agent(name)?;
        let system_prompt = registry.resolve(&config.system_prompt_path)?;
        let mut agent = Self::new(name, system_prompt, &config.model_name, binding, catalog, log)?
            .with_options(config.call_options())
            .with_limits(AgentLimits::from_config(project, config));
        if let Ok(dir) = project.diagnostics_dir() {
            agent = agent.with_diagnostics(DiagnosticSink::new(dir));
        }
        Ok(agent)
    }

    /// Like [`from_config`](Self::from_config), creating the binding for the
    /// agent's API type from provider credentials.
    pub fn from_project(
        name: &str,
        project: &ProjectConfig,
        registry: &PromptRegistry,
        credentials: &ParleyConfig,
        catalog: Arc<dyn ModelCatalog>,
        log: Arc<dyn ReplayLog>,
    ) -> Result<Self> {
        let api_type = project.agent(name)?.api_type.unwrap_or(project.api_type);
        let binding = provider::create_binding(api_type, credentials, catalog.clone())?;
        Self::from_config(name, project, registry, binding, catalog.as_ref(), log)
    }

    pub fn with_options(mut self, options: CallOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_limits(mut self, limits: AgentLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_diagnostics(mut self, sink: DiagnosticSink) -> Self {
        self.diagnostics = Some(sink);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Model id sent to the provider.
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn card(&self) -> &ModelCard {
        &self.card
    }

    pub fn options(&self) -> &CallOptions {
        &self.options
    }

    pub fn limits(&self) -> AgentLimits {
        self.limits
    }

    /// Where unrecoverable call failures are recorded.
    pub fn diagnostics(&self) -> Option<&DiagnosticSink> {
        self.diagnostics.as_ref()
    }

    pub fn backoff(&self) -> &BackoffPolicy {
        &self.backoff
    }

    pub fn system_prompt(&self) -> &Arc<Prompt> {
        &self.system_prompt
    }

    /// Swap the system prompt used by future dialogs.
    pub fn reload_system(&mut self, prompt: Arc<Prompt>) {
        self.system_prompt = prompt;
    }

    /// Start a dialog whose first message is the rendered system prompt.
    pub fn init_dialog(&self, args: &PromptArgs, session_name: Option<String>) -> Result<Dialog> {
        let session_name = session_name.unwrap_or_else(default_session_name);
        let mut dialog = Dialog::new(self.log.clone(), session_name);
        dialog.send_message_with(
            self.system_prompt.clone(),
            args,
            MessageOptions::builder().role(Role::System).creator("system").build(),
        )?;
        debug!(agent = %self.name, session = dialog.session_name(), "Initialized dialog");
        Ok(dialog)
    }

    /// Run the agent on `dialog` until it gives a final response.
    pub async fn call(&self, dialog: &mut Dialog) -> Result<AgentResponse> {
        self.call_with(dialog, CallArgs::default()).await
    }

    /// Like [`call`](Self::call), with per-call options and metadata.
    ///
    /// Each interrupt round resolves one model response in a forked sandbox;
    /// only the final response of the round reaches `dialog`, followed by
    /// one result message per requested function call.
    pub async fn call_with(&self, dialog: &mut Dialog, args: CallArgs) -> Result<AgentResponse> {
        let mut current_prompt = dialog.top_prompt().cloned().ok_or_else(|| {
            ParleyError::InvalidState("dialog has no prompt; send a message first".into())
        })?;
        let options = self.options.merge(&args.options);
        let mut interrupts: Vec<FunctionCall> = Vec::new();
        let mut round = 0usize;

        while self.limits.rounds().map_or(true, |max| round < max) {
            let (mut response, attempts) = self.resolve_round(dialog, &current_prompt, &options).await?;
            response.creator = self.name.clone();
            response.attempts = attempts;
            response.metadata.extend(args.metadata.clone());
            let response = dialog.append(response);

            if !response.is_function_call() {
                info!(agent = %self.name, rounds = round, interrupts = interrupts.len(), "Agent call finished");
                return Ok(AgentResponse {
                    message: response,
                    interrupts,
                });
            }

            if self.limits.rounds() == Some(round + 1) {
                debug!(agent = %self.name, "Function calls requested after the final round");
                break;
            }

            let names: Vec<&str> = response.function_calls.iter().map(|c| c.name.as_str()).collect();
            info!(agent = %self.name, round = round + 1, functions = ?names, "Dispatching function calls");

            let role = match response.api_type.unwrap_or_else(|| self.binding.api_type()) {
                ApiType::Completion => Role::Tool,
                ApiType::Response => Role::User,
            };
            let interrupt_prompt = Arc::new(current_prompt.interrupt_handler());
            for call in &response.function_calls {
                let result_str = if call.is_repeated(&interrupts) {
                    debug!(agent = %self.name, function = %call.name, "Skipping repeated function call");
                    repeated_call_notice(call)
                } else {
                    let function = current_prompt.function(&call.name)?;
                    let done = function.call(call.clone()).await?;
                    let result_str = done.result_str.clone().unwrap_or_default();
                    interrupts.push(done);
                    result_str
                };
                let mut handler_args = PromptArgs::new();
                handler_args.insert("call_results".into(), json!(result_str));
                let mut metadata = Map::new();
                metadata.insert(TOOL_CALL_ID_KEY.into(), json!(call.id));
                dialog.send_message_with(
                    interrupt_prompt.clone(),
                    &handler_args,
                    MessageOptions::builder()
                        .role(role)
                        .creator("function")
                        .metadata(metadata)
                        .build(),
                )?;
            }

            if round + 1 == self.limits.max_interrupt_times {
                debug!(agent = %self.name, "Interrupt budget reached, asking for a final response");
                dialog.send_message_with(
                    Arc::new(current_prompt.interrupt_handler_final()),
                    &PromptArgs::new(),
                    MessageOptions::builder().role(Role::User).creator("function").build(),
                )?;
            }

            current_prompt = dialog.top_prompt().cloned().unwrap_or(current_prompt);
            round += 1;
        }

        warn!(agent = %self.name, max = self.limits.max_interrupt_times, "Agent ran out of interrupt rounds");
        Err(ParleyError::InterruptBudgetExhausted {
            max_interrupt_times: self.limits.max_interrupt_times,
        })
    }

    /// Get one usable response for the current round, retrying in a sandbox.
    ///
    /// Returns the response and the failed attempts that preceded it.
    async fn resolve_round(
        &self,
        dialog: &Dialog,
        prompt: &Arc<Prompt>,
        options: &CallOptions,
    ) -> Result<(Message, Vec<Arc<Message>>)> {
        let mut working = dialog.fork();
        let mut exception_budget = self.limits.max_exception_retry;
        let mut recall_budget = self.limits.max_llm_recall;
        let mut attempts: Vec<Arc<Message>> = Vec::new();

        loop {
            let result = self.binding.invoke(&working, prompt, &self.model, options).await;
            match Attempt::classify(result) {
                Attempt::Completed(message) => return Ok((message, attempts)),
                Attempt::ParseFailure(mut message) => {
                    let error_message = message.errors.join("\n");
                    message.creator = self.name.clone();
                    attempts.push(working.append(message));
                    if exception_budget == 0 {
                        warn!(agent = %self.name, attempts = attempts.len(), "Giving up on unparseable responses");
                        return Err(ParleyError::OutputParse {
                            message: error_message,
                            attempts,
                        });
                    }
                    exception_budget -= 1;
                    warn!(
                        agent = %self.name,
                        retry = self.limits.max_exception_retry - exception_budget,
                        max = self.limits.max_exception_retry,
                        error = %error_message,
                        "Handling unparseable response"
                    );
                    let mut handler_args = PromptArgs::new();
                    handler_args.insert("error_message".into(), json!(error_message));
                    working.send_message_with(
                        Arc::new(prompt.exception_handler()),
                        &handler_args,
                        MessageOptions::builder().role(Role::User).creator("exception").build(),
                    )?;
                }
                Attempt::RateLimited(err) => {
                    let delay = self.backoff.rate_limit_delay(&err);
                    warn!(agent = %self.name, delay_ms = delay.as_millis() as u64, error = %err, "Rate limited");
                    tokio::time::sleep(delay).await;
                }
                Attempt::TransportFailure(err) => {
                    if recall_budget == 0 {
                        self.record_incident(&err);
                        return Err(err);
                    }
                    recall_budget -= 1;
                    warn!(
                        agent = %self.name,
                        remaining = recall_budget,
                        error = %err,
                        "Recalling model after transport failure"
                    );
                    tokio::time::sleep(self.backoff.recall_pause()).await;
                }
                Attempt::Fatal(err) => {
                    debug!(agent = %self.name, error = %err, "Fatal call error");
                    return Err(err);
                }
            }
        }
    }

    fn record_incident(&self, err: &ParleyError) {
        let Some(sink) = &self.diagnostics else {
            warn!(agent = %self.name, error = %err, "Model call failed");
            return;
        };
        match sink.record(&self.name, err) {
            Ok(path) => warn!(agent = %self.name, error = %err, path = %path.display(), "Model call failed"),
            Err(write_err) => warn!(
                agent = %self.name,
                error = %err,
                write_error = %write_err,
                "Model call failed and the diagnostic could not be written"
            ),
        }
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("system_prompt", &self.system_prompt.path())
            .field("provider", &self.binding.provider_name())
            .field("limits", &self.limits)
            .finish()
    }
}
