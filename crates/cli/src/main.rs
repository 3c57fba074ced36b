//! FlowLM CLI — the main entry point.
//!
//! Commands:
//! - `nodes`        — List node types
//! - `credentials`  — List credential types and configured status
//! - `providers`    — List the provider table
//! - `run`          — Execute an agent node over input items
//! - `config`       — Show, locate or initialise the config file

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use flowlm_config::{AppConfig, LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(
    name = "flowlm",
    about = "FlowLM — LLM workflow nodes with Langfuse, Helicone and Phoenix observability",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to $FLOWLM_CONFIG or ~/.flowlm/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered node types
    Nodes {
        /// Print full node descriptions as JSON
        #[arg(long)]
        json: bool,
    },

    /// List credential types
    Credentials,

    /// List supported LLM providers
    Providers,

    /// Execute an agent node
    Run {
        /// Node type name, e.g. aiAgentPhoenix
        node: String,

        /// JSON file holding the input items
        #[arg(short, long)]
        items: Option<PathBuf>,

        /// JSON file holding parameters and connected sub-nodes
        #[arg(short, long)]
        params: Option<PathBuf>,

        /// Run a single item with this chat input
        #[arg(long, conflicts_with = "items")]
        input: Option<String>,

        /// Attach buffer-window memory for this session
        #[arg(long)]
        session: Option<String>,

        /// Messages kept by session memory
        #[arg(long, default_value_t = 10)]
        memory_window: usize,

        /// Turn failed items into error records instead of stopping
        #[arg(long)]
        continue_on_fail: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration with secrets hidden
    Show,
    /// Print the config file path
    Path,
    /// Write a default config file
    Init,
}

fn init_tracing(verbose: bool, logging: &LoggingConfig) {
    let default = if verbose { "debug" } else { logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(AppConfig::config_path);
    let config =
        AppConfig::load_path(&config_path).map_err(|e| format!("Failed to load config: {e}"))?;
    init_tracing(cli.verbose, &config.logging);

    match cli.command {
        Commands::Nodes { json } => commands::nodes::run(json).await?,
        Commands::Credentials => commands::credentials::run(&config, cli.verbose).await?,
        Commands::Providers => commands::providers::run().await?,
        Commands::Run {
            node,
            items,
            params,
            input,
            session,
            memory_window,
            continue_on_fail,
        } => {
            let args = commands::run::RunArgs {
                node,
                items,
                params,
                input,
                session,
                memory_window,
                continue_on_fail,
            };
            commands::run::run(args, &config).await?
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show(&config).await?,
            ConfigAction::Path => commands::config_cmd::path(&config_path).await?,
            ConfigAction::Init => commands::config_cmd::init(&config_path).await?,
        },
    }

    Ok(())
}
