//! CLI command handlers for chat, replay, and prompt listing.

use std::path::Path;
use std::sync::Arc;

use crate::agent::Agent;
use crate::config::{ParleyConfig, ProjectConfig};
use crate::log::{build_log, ActivityKind, ReplaySession};
use crate::models::{ModelCatalog, StaticCatalog};
use crate::prompt::{Prompt, PromptArgs, PromptLoader, PromptRegistry};
use crate::provider;
use crate::types::CallOptions;

const DEFAULT_SYSTEM: &str = "You are a helpful assistant.";

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Load the project config from `path`, or discover it.
pub fn load_project(path: Option<&Path>) -> crate::error::Result<ProjectConfig> {
    match path {
        Some(path) => ProjectConfig::load(path),
        None => ProjectConfig::discover(),
    }
}

/// Registry holding every prompt in the project's prompt folders.
pub fn load_prompts(project: &ProjectConfig) -> crate::error::Result<PromptRegistry> {
    let mut registry = PromptRegistry::new();
    PromptLoader::new(project.prompt_folders()).load_into(&mut registry)?;
    Ok(registry)
}

/// Handle `parley chat`.
pub async fn handle_chat(project: &ProjectConfig, args: super::ChatArgs) -> CliResult {
    let Some(text) = args.prompt else {
        eprintln!("Usage: parley chat \"your prompt here\"");
        std::process::exit(1);
    };

    let log = build_log(project)?;
    let catalog: Arc<dyn ModelCatalog> = Arc::new(StaticCatalog::builtin());
    let credentials = ParleyConfig::global();
    let mut registry = load_prompts(project)?;

    let mut agent = match args.agent.as_deref() {
        Some(name) => Agent::from_project(name, project, &registry, credentials, catalog, log)?,
        None => {
            let system = registry.register(Prompt::new(
                "cli/system",
                args.system.as_deref().unwrap_or(DEFAULT_SYSTEM),
            ))?;
            let binding = provider::create_binding(project.api_type, credentials, catalog.clone())?;
            Agent::new("assistant", system, &args.model, binding, catalog.as_ref(), log)?
        }
    };
    let overrides = CallOptions {
        temperature: args.temperature,
        max_tokens: args.max_tokens,
        ..Default::default()
    };
    agent = {
        let merged = agent.options().merge(&overrides);
        agent.with_options(merged)
    };

    let mut dialog = agent.init_dialog(&PromptArgs::new(), args.session)?;
    dialog.send_message(text, &PromptArgs::new())?;
    let response = agent.call(&mut dialog).await?;

    println!("{}", response.message.content);
    for call in &response.interrupts {
        eprintln!("  {} {}", call.name, call.arguments_json());
    }
    let cost = dialog.cost();
    eprintln!(
        "session {} | {} prompt + {} completion tokens | ${:.6}",
        dialog.session_name(),
        cost.prompt_tokens,
        cost.completion_tokens,
        cost.cost
    );
    Ok(())
}

/// Handle `parley replay <session>`.
pub fn handle_replay(project: &ProjectConfig, args: super::ReplayArgs) -> CliResult {
    let log = build_log(project)?;
    let session = ReplaySession::load(log.as_ref(), &args.session)?;
    let activities = session.activities();
    if activities.is_empty() {
        eprintln!("No activity logged for session {}", args.session);
        return Ok(());
    }
    for activity in activities {
        let source = match &activity.kind {
            ActivityKind::Message { dialog_id } => short_id(dialog_id).to_string(),
            ActivityKind::Frontend => "frontend".to_string(),
        };
        let role = activity.metadata.get("role").and_then(|r| r.as_str()).unwrap_or("-");
        println!(
            "{} [{source}] {role:<9} {}",
            activity.timestamp.format("%H:%M:%S%.3f"),
            truncate(&activity.value, args.width)
        );
    }
    Ok(())
}

/// Handle `parley prompts`.
pub fn handle_prompts(project: &ProjectConfig) -> CliResult {
    let registry = load_prompts(project)?;
    if registry.is_empty() {
        eprintln!("No prompts found in {:?}", project.prompt_folders());
        return Ok(());
    }
    for path in registry.paths() {
        println!("{path}");
    }
    Ok(())
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn truncate(value: &str, width: usize) -> String {
    let flat = value.replace('\n', " ");
    if flat.chars().count() <= width {
        return flat;
    }
    let mut out: String = flat.chars().take(width).collect();
    out.push_str("...");
    out
}
