//! Policy Pro CLI
//!
//! Main entry point for the policypro command-line tool.
//! Answers questions about insurance policies from a pre-built document
//! index, searching the web only when explicitly asked to.

mod commands;

use clap::{Parser, Subcommand};
use commands::{AskCommand, ChatCommand, PromptsCommand, StatsCommand};
use policypro_core::{
    config::AppConfig,
    logging::{self, LogFormat},
    AppResult,
};
use std::path::{Path, PathBuf};
use tracing::Instrument;

/// Policy Pro - insurance policy assistant
#[derive(Parser, Debug)]
#[command(name = "policypro")]
#[command(about = "Answer questions about insurance policies", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "POLICYPRO_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "POLICYPRO_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Completion model identifier
    #[arg(short, long, global = true, env = "FAST_LLM_MODEL")]
    model: Option<String>,

    /// Directory of the document index
    #[arg(long, global = true, env = "POLICYPRO_INDEX_PATH")]
    index_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Interactive conversation
    Chat(ChatCommand),

    /// Answer a single question
    Ask(AskCommand),

    /// Show document index statistics
    Stats(StatsCommand),

    /// List prompt definitions and workspace overrides
    Prompts(PromptsCommand),
}

/// Load `.env` from the workspace, then from the current directory.
/// Variables already set are never overridden.
fn load_dotenv(workspace: Option<&Path>) {
    if let Some(workspace) = workspace {
        let path = workspace.join(".env");
        if path.exists() {
            let _ = dotenvy::from_path(&path);
        }
    }
    let _ = dotenvy::dotenv();
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    load_dotenv(cli.workspace.as_deref());

    // Workspace and config file select the YAML that gets merged
    let config = AppConfig::load_from(cli.workspace.clone(), cli.config.clone())?.with_overrides(
        cli.workspace,
        cli.config,
        cli.model,
        cli.index_path,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );

    let format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    logging::init_logging(config.log_level.as_deref(), config.no_color, format)?;

    tracing::info!("Policy Pro CLI starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Model: {:?}", config.llm.model);

    let command_name = match &cli.command {
        Commands::Chat(_) => "chat",
        Commands::Ask(_) => "ask",
        Commands::Stats(_) => "stats",
        Commands::Prompts(_) => "prompts",
    };
    let span = tracing::info_span!("command", name = command_name);

    let result = async {
        match cli.command {
            Commands::Chat(cmd) => cmd.execute(&config).await,
            Commands::Ask(cmd) => cmd.execute(&config).await,
            Commands::Stats(cmd) => cmd.execute(&config).await,
            Commands::Prompts(cmd) => cmd.execute(&config).await,
        }
    }
    .instrument(span)
    .await;

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}
