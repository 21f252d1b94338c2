//! Parley: replayable multi-turn LLM dialogs.
//!
//! A [`Dialog`](dialog::Dialog) is an append-only, forkable list of messages
//! logged to a replay log. An [`Agent`](agent::Agent) drives a model binding
//! over a dialog, dispatching tool calls and recovering from unparseable
//! responses, rate limits and transport failures within fixed budgets.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use parley::prelude::*;
//!
//! # async fn example() -> parley::error::Result<()> {
//! let catalog: Arc<dyn ModelCatalog> = Arc::new(StaticCatalog::builtin());
//! let binding = parley::provider::create_binding(
//!     ApiType::Completion,
//!     ParleyConfig::global(),
//!     catalog.clone(),
//! )?;
//! let mut registry = PromptRegistry::new();
//! let system = registry.register(Prompt::new("assistant/system", "You are terse."))?;
//! let agent = Agent::new("assistant", system, "gpt-4o-mini", binding, catalog.as_ref(), Arc::new(NoLog))?;
//!
//! let mut dialog = agent.init_dialog(&PromptArgs::new(), None)?;
//! dialog.send_message("Hello!", &PromptArgs::new())?;
//! let response = agent.call(&mut dialog).await?;
//! println!("{}", response.message.content);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod dialog;
pub mod error;
pub mod log;
pub mod models;
pub mod prelude;
pub mod prompt;
pub mod provider;
pub mod tools;
pub mod types;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;
