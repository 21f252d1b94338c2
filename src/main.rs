//! Parley CLI binary entry point.

use parley::cli::{commands, Cli, Commands};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_env("PARLEY_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse_args();

    let result = match commands::load_project(cli.config.as_deref()) {
        Ok(project) => match cli.command {
            Commands::Chat(args) => commands::handle_chat(&project, args).await,
            Commands::Replay(args) => commands::handle_replay(&project, args),
            Commands::Prompts => commands::handle_prompts(&project),
        },
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
