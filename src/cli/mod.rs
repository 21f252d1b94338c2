//! CLI entry point for Parley.

pub mod commands;

use clap::{Parser, Subcommand};

/// Parley CLI
#[derive(Parser, Debug)]
#[command(name = "parley", version, about = "Parley: replayable LLM dialogs")]
pub struct Cli {
    /// Path to parley.toml (defaults to PARLEY_CONFIG or discovery from the working directory)
    #[arg(short, long, global = true)]
    pub config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one agent turn
    Chat(ChatArgs),
    /// Print the logged activity of a session
    Replay(ReplayArgs),
    /// List loaded prompts
    Prompts,
}

/// Arguments for the `chat` subcommand.
#[derive(Parser, Debug)]
pub struct ChatArgs {
    /// Agent from `[agents.<name>]`; overrides --model and --system
    #[arg(short, long)]
    pub agent: Option<String>,

    /// Model card or snapshot name
    #[arg(short, long, default_value = "gpt-4o-mini")]
    pub model: String,

    /// System prompt text
    #[arg(short, long)]
    pub system: Option<String>,

    /// Temperature (0.0 - 2.0)
    #[arg(short, long)]
    pub temperature: Option<f64>,

    /// Max tokens
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Session name for the replay log
    #[arg(long)]
    pub session: Option<String>,

    /// User prompt (positional)
    pub prompt: Option<String>,
}

/// Arguments for the `replay` subcommand.
#[derive(Parser, Debug)]
pub struct ReplayArgs {
    /// Session name to replay
    pub session: String,

    /// Truncate printed values to this many characters
    #[arg(long, default_value_t = 120)]
    pub width: usize,
}

impl Cli {
    /// Parse CLI arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
