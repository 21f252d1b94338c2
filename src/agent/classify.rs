//! One-token classification on top of an agent call.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use super::agent::{Agent, CallArgs};
use crate::dialog::Dialog;
use crate::error::{ParleyError, Result};
use crate::models::Tokenizer;
use crate::prompt::PromptArgs;
use crate::types::Message;

/// Probability per class and the message that carried them.
#[derive(Debug, Clone)]
pub struct ClassifierOutput {
    pub probabilities: HashMap<String, f64>,
    pub message: Arc<Message>,
}

/// Forces the agent's model to answer with a single class token and reads
/// the class probabilities from its logprobs.
pub struct Classifier<'a> {
    agent: &'a Agent,
    tokenizer: Arc<dyn Tokenizer>,
}

/// Default instruction: `Please respond with one and only one word from "a" or "b".`
pub fn default_instruction(classes: &[String]) -> String {
    let quoted: Vec<String> = classes.iter().map(|c| format!("\"{c}\"")).collect();
    format!("Please respond with one and only one word from {}.", quoted.join(" or "))
}

/// Read the class probabilities from a one-token response.
pub fn top_probabilities(message: &Message, classes: &[String]) -> Result<HashMap<String, f64>> {
    let tokens = message.logprobs.as_deref().unwrap_or_default();
    let [token] = tokens else {
        return Err(ParleyError::Classification {
            message: format!("expected exactly one token, got {}", tokens.len()),
            top_probs: HashMap::new(),
        });
    };
    let probabilities: HashMap<String, f64> = token
        .top_logprobs
        .iter()
        .map(|top| (top.token.clone(), top.logprob.exp()))
        .collect();
    let missing: Vec<String> = classes
        .iter()
        .filter(|class| !probabilities.contains_key(*class))
        .map(|class| format!("Token {class} not found in the top logprobs"))
        .collect();
    if !missing.is_empty() {
        return Err(ParleyError::Classification {
            message: missing.join("\n"),
            top_probs: probabilities,
        });
    }
    Ok(probabilities)
}

impl<'a> Classifier<'a> {
    pub fn new(agent: &'a Agent, tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self { agent, tokenizer }
    }

    /// Classify the current state of `dialog` into one of `classes`.
    ///
    /// The instruction and the successful response are appended to `dialog`;
    /// corrective turns stay in a sandbox.
    pub async fn classify(
        &self,
        dialog: &mut Dialog,
        classes: &[String],
        instruction: Option<&str>,
        strength: i32,
    ) -> Result<ClassifierOutput> {
        let options = self
            .agent
            .card()
            .make_classifier(classes, strength, self.tokenizer.as_ref())?;
        let instruction = instruction.map_or_else(|| default_instruction(classes), str::to_string);
        dialog.send_message(instruction, &PromptArgs::new())?;

        let limits = self.agent.limits();
        let mut exception_budget = limits.max_exception_retry;
        let mut recall_budget = limits.max_llm_recall;
        let mut sandbox = dialog.fork();

        loop {
            let snapshot = sandbox.clone();
            let args = CallArgs::builder().options(options.clone()).build();
            let outcome = self
                .agent
                .call_with(&mut sandbox, args)
                .await
                .and_then(|response| {
                    top_probabilities(&response.message, classes).map(|p| (p, response.message))
                });

            match outcome {
                Ok((probabilities, message)) => {
                    debug!(agent = %self.agent.name(), ?probabilities, "Classified");
                    let message = dialog.append(Message::clone(&message));
                    return Ok(ClassifierOutput {
                        probabilities,
                        message,
                    });
                }
                Err(err @ ParleyError::Classification { .. }) => {
                    if exception_budget == 0 {
                        return Err(err);
                    }
                    exception_budget -= 1;
                    warn!(
                        agent = %self.agent.name(),
                        retry = limits.max_exception_retry - exception_budget,
                        max = limits.max_exception_retry,
                        error = %err,
                        "Retrying classification"
                    );
                    sandbox.send_message(
                        format!("Please respond with one and only one word from {classes:?}"),
                        &PromptArgs::new(),
                    )?;
                }
                Err(err) if err.is_transport() => {
                    if recall_budget == 0 {
                        return Err(err);
                    }
                    recall_budget -= 1;
                    warn!(agent = %self.agent.name(), remaining = recall_budget, error = %err, "Recalling classifier");
                    // Abandoned turns keep their own log stream.
                    sandbox = snapshot.fork();
                    tokio::time::sleep(self.agent.backoff().recall_pause()).await;
                }
                Err(err) => {
                    debug!(agent = %self.agent.name(), error = %err, "Fatal classifier error");
                    return Err(err);
                }
            }
        }
    }

    /// Probability of `true_class` against `false_class`, normalized over the pair.
    pub async fn binary_classify(
        &self,
        dialog: &mut Dialog,
        true_class: &str,
        false_class: &str,
        instruction: Option<&str>,
    ) -> Result<f64> {
        let classes = [true_class.to_string(), false_class.to_string()];
        let output = self.classify(dialog, &classes, instruction, 10).await?;
        let p_true = output.probabilities.get(true_class).copied().unwrap_or_default();
        let p_false = output.probabilities.get(false_class).copied().unwrap_or_default();
        Ok(normalize_pair(p_true, p_false))
    }
}

fn normalize_pair(p_true: f64, p_false: f64) -> f64 {
    let total = p_true + p_false;
    if total > 0.0 {
        p_true / total
    } else {
        0.0
    }
}
