//! toolsieve CLI - replay model output through the tool-call sieve.

pub mod input;
pub mod render;

mod cli_args;
mod commands;

use anyhow::Result;
use clap::Parser;
use tracing::debug;

use toolsieve_config::{Config, ConfigOverrides};

pub use cli_args::{Cli, Command};

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    initialize_logging(&cli);

    // Load configuration with CLI overrides
    let config = load_config_with_cli_overrides(&cli)?;
    debug!("Loaded configuration: {:?}", config);

    match cli.command {
        Command::Stream(args) => commands::run_stream(args, &config).await,
        Command::Parse(args) => commands::run_parse(args, &config).await,
        Command::Prompt(args) => commands::run_prompt(args).await,
    }
}

// --- Helper functions ---

fn initialize_logging(cli: &Cli) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let level = if cli.verbose { "debug" } else { "warn" };
    let directives =
        format!("toolsieve={level},toolsieve_core={level},toolsieve_config={level},toolsieve_cli={level}");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives));

    // stdout carries the event stream, so logs go to stderr
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config_with_cli_overrides(cli: &Cli) -> Result<Config> {
    let overrides = match &cli.command {
        Command::Stream(args) => ConfigOverrides {
            toolcall_mode: args.toolcall_mode.clone(),
            early_emit_confidence: args.early_emit.clone(),
            capture_limit: args.capture_limit,
            tail_limit: None,
        },
        Command::Parse(_) | Command::Prompt(_) => ConfigOverrides::default(),
    };
    Config::load_with_overrides(cli.config.as_deref(), overrides)
}
