mod common;

use std::sync::Arc;

use common::{agent, memory_log, ScriptedBinding, Step};
use parley::agent::{AgentLimits, Classifier};
use parley::dialog::Dialog;
use parley::error::ParleyError;
use parley::log::ReplaySession;
use parley::models::VocabularyTokenizer;
use parley::prompt::{Prompt, PromptArgs};
use parley::types::Role;

fn tokenizer() -> Arc<VocabularyTokenizer> {
    Arc::new(VocabularyTokenizer::new([("yes", 9891), ("no", 1750)]))
}

fn limits(max_exception_retry: usize, max_llm_recall: usize) -> AgentLimits {
    AgentLimits {
        max_exception_retry,
        max_interrupt_times: 5,
        max_llm_recall,
    }
}

fn start(agent: &parley::agent::Agent) -> Dialog {
    let mut dialog = agent.init_dialog(&PromptArgs::new(), None).unwrap();
    dialog
        .send_message("Is the sky blue on a clear day?", &PromptArgs::new())
        .unwrap();
    dialog
}

fn system() -> Prompt {
    Prompt::new("test/judge", "You judge propositions.")
}

#[tokio::test]
async fn binary_classify_normalizes_over_the_pair() {
    let binding = Arc::new(ScriptedBinding::new(vec![Step::token("yes", &[("yes", 0.8), ("no", 0.2)])]));
    let agent = agent("judge", system(), binding.clone(), memory_log());
    let mut dialog = start(&agent);

    let p = Classifier::new(&agent, tokenizer())
        .binary_classify(&mut dialog, "yes", "no", None)
        .await
        .unwrap();

    assert!((p - 0.8).abs() < 1e-6);
    assert_eq!(dialog.len(), 4);
    assert_eq!(
        dialog.messages()[2].content,
        "Please respond with one and only one word from \"yes\" or \"no\"."
    );
    assert_eq!(dialog.messages()[3].role, Role::Assistant);

    let options = &binding.seen_options()[0];
    assert_eq!(options.logprobs, Some(true));
    assert_eq!(options.top_logprobs, Some(2));
    assert_eq!(options.temperature, Some(0.0));
    let bias = options.logit_bias.as_ref().unwrap();
    assert_eq!(bias.get(&9891), Some(&10));
    assert_eq!(bias.get(&1750), Some(&10));
}

#[tokio::test]
async fn binary_classify_renormalizes_partial_mass() {
    let binding = Arc::new(ScriptedBinding::new(vec![Step::token("yes", &[("yes", 0.6), ("no", 0.3)])]));
    let agent = agent("judge", system(), binding, memory_log());
    let mut dialog = start(&agent);

    let p = Classifier::new(&agent, tokenizer())
        .binary_classify(&mut dialog, "yes", "no", Some("Answer yes or no."))
        .await
        .unwrap();

    assert!((p - 0.666_666_7).abs() < 1e-6);
    assert_eq!(dialog.messages()[2].content, "Answer yes or no.");
}

#[tokio::test]
async fn missing_class_is_corrected_in_the_sandbox() {
    let binding = Arc::new(ScriptedBinding::new(vec![
        Step::token("maybe", &[("maybe", 0.7), ("yes", 0.2)]),
        Step::token("no", &[("no", 0.9), ("yes", 0.1)]),
    ]));
    let agent = agent("judge", system(), binding.clone(), memory_log()).with_limits(limits(2, 0));
    let mut dialog = start(&agent);
    let classes = vec!["yes".to_string(), "no".to_string()];

    let output = Classifier::new(&agent, tokenizer())
        .classify(&mut dialog, &classes, None, 10)
        .await
        .unwrap();

    assert!((output.probabilities["no"] - 0.9).abs() < 1e-9);
    assert_eq!(output.message.content, "no");
    // Instruction and final answer only; the corrective turn stays in the sandbox.
    assert_eq!(dialog.len(), 4);
    assert!(Arc::ptr_eq(dialog.tail().unwrap(), &output.message));
    assert_eq!(binding.seen_lengths(), vec![3, 5]);
}

#[tokio::test]
async fn classification_budget_exhaustion_is_fatal() {
    let binding = Arc::new(ScriptedBinding::new(vec![
        Step::token("maybe", &[("maybe", 1.0)]),
        Step::token("maybe", &[("maybe", 1.0)]),
    ]));
    let agent = agent("judge", system(), binding.clone(), memory_log()).with_limits(limits(1, 0));
    let mut dialog = start(&agent);
    let classes = vec!["yes".to_string(), "no".to_string()];

    let err = Classifier::new(&agent, tokenizer())
        .classify(&mut dialog, &classes, None, 10)
        .await
        .unwrap_err();

    assert!(matches!(err, ParleyError::Classification { .. }));
    assert_eq!(binding.calls(), 2);
    assert_eq!(dialog.len(), 3);
}

#[tokio::test]
async fn other_failures_restart_from_the_sandbox_snapshot() {
    let binding = Arc::new(ScriptedBinding::new(vec![
        Step::Error(ParleyError::api(502, "bad gateway")),
        Step::Error(ParleyError::api(502, "bad gateway")),
        Step::token("yes", &[("yes", 0.5), ("no", 0.5)]),
    ]));
    let agent = agent("judge", system(), binding.clone(), memory_log()).with_limits(limits(0, 1));
    let mut dialog = start(&agent);
    let classes = vec!["yes".to_string(), "no".to_string()];

    let output = Classifier::new(&agent, tokenizer())
        .classify(&mut dialog, &classes, None, 10)
        .await
        .unwrap();

    assert_eq!(output.probabilities.len(), 2);
    assert_eq!(binding.calls(), 3);
    assert_eq!(binding.seen_lengths(), vec![3, 3, 3]);
}

#[tokio::test]
async fn registry_errors_are_not_recalled() {
    let binding = Arc::new(ScriptedBinding::new(vec![
        Step::Error(ParleyError::PromptNotFound("judge/missing".into())),
        Step::token("yes", &[("yes", 0.5), ("no", 0.5)]),
    ]));
    let agent = agent("judge", system(), binding.clone(), memory_log()).with_limits(limits(0, 1));
    let mut dialog = start(&agent);
    let classes = vec!["yes".to_string(), "no".to_string()];

    let err = Classifier::new(&agent, tokenizer())
        .classify(&mut dialog, &classes, None, 10)
        .await
        .unwrap_err();

    assert!(matches!(err, ParleyError::PromptNotFound(_)));
    assert_eq!(binding.calls(), 1);
    assert_eq!(dialog.len(), 3);
}

#[tokio::test]
async fn recalled_classifier_continues_on_a_fresh_branch() {
    let log = memory_log();
    let binding = Arc::new(ScriptedBinding::new(vec![
        Step::Error(ParleyError::api(502, "bad gateway")),
        Step::Error(ParleyError::api(502, "bad gateway")),
        Step::token("yes", &[("yes", 0.7), ("no", 0.3)]),
    ]));
    let agent = agent("judge", system(), binding, log.clone()).with_limits(limits(0, 1));
    let mut dialog = start(&agent);
    let classes = vec!["yes".to_string(), "no".to_string()];

    Classifier::new(&agent, tokenizer())
        .classify(&mut dialog, &classes, None, 10)
        .await
        .unwrap();

    let replay = ReplaySession::load(log.as_ref(), dialog.session_name()).unwrap();
    let first = replay
        .dialog_ids()
        .into_iter()
        .find(|id| replay.parent_of(id) == Some(dialog.dialog_id()))
        .unwrap();
    let answered: Vec<&str> = replay
        .dialog_ids()
        .into_iter()
        .filter(|id| *id != dialog.dialog_id())
        .filter(|id| replay.messages(id).iter().any(|m| m.role == Role::Assistant))
        .collect();
    assert_eq!(answered.len(), 1);
    let last = answered[0];
    assert_ne!(last, first);
    let middle = replay.parent_of(last).unwrap();
    assert_eq!(replay.parent_of(middle), Some(first));
    assert_eq!(dialog.messages()[3].role, Role::Assistant);
}

#[tokio::test]
async fn classes_must_be_single_tokens() {
    let binding = Arc::new(ScriptedBinding::new(vec![]));
    let agent = agent("judge", system(), binding.clone(), memory_log());
    let mut dialog = start(&agent);
    let classes = vec!["absolutely".to_string(), "no".to_string()];

    let err = Classifier::new(&agent, tokenizer())
        .classify(&mut dialog, &classes, None, 10)
        .await
        .unwrap_err();

    assert!(matches!(err, ParleyError::InvalidArgument(_)));
    assert_eq!(binding.calls(), 0);
    assert_eq!(dialog.len(), 2);
}
