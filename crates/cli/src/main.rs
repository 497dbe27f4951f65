//! Memoria CLI: the main entry point.
//!
//! Commands:
//! - `serve`  : Start the HTTP gateway
//! - `chat`   : Send one message and print the reply
//! - `models` : Show the model catalog and health
//! - `memory` : Inspect or prune a device's stored turns
//! - `link`   : Share memory between two devices
//! - `unlink` : Stop sharing memory between two devices
//! - `config` : Show, validate, or initialize configuration

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "memoria",
    about = "Memoria: conversation memory and model routing for local LLMs",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true, env = "MEMORIA_LOG_JSON")]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Send a single message
    Chat {
        /// Device sending the message
        #[arg(short, long)]
        device: String,

        /// Continue an existing conversation
        #[arg(short, long)]
        conversation: Option<String>,

        /// Bypass classification and use this model
        #[arg(short, long)]
        model: Option<String>,

        /// Print the full response as JSON
        #[arg(long)]
        json: bool,

        message: String,
    },

    /// Show model health
    Models {
        /// Run one health sweep first
        #[arg(long)]
        probe: bool,
    },

    /// Inspect stored memory
    Memory {
        #[command(subcommand)]
        action: MemoryAction,
    },

    /// Link two devices so each sees the other's history
    Link { device: String, target: String },

    /// Remove a link between two devices
    Unlink { device: String, target: String },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum MemoryAction {
    /// Show the most recent turns for a device
    Show {
        #[arg(short, long)]
        device: String,

        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Delete one conversation from a device's log
    Forget {
        #[arg(short, long)]
        device: String,

        conversation: String,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Check the configuration for errors
    Validate,
    /// Print the config file path
    Path,
    /// Write a default config file
    Init {
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    match cli.command {
        Commands::Serve { port } => commands::gateway::run(port).await?,
        Commands::Chat {
            device,
            conversation,
            model,
            json,
            message,
        } => commands::chat::run(device, message, conversation, model, json).await?,
        Commands::Models { probe } => commands::models::run(probe).await?,
        Commands::Memory { action } => match action {
            MemoryAction::Show { device, limit } => commands::memory::show(device, limit).await?,
            MemoryAction::Forget {
                device,
                conversation,
            } => commands::memory::forget(device, conversation).await?,
        },
        Commands::Link { device, target } => commands::links::link(device, target).await?,
        Commands::Unlink { device, target } => commands::links::unlink(device, target).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show().await?,
            ConfigAction::Validate => commands::config_cmd::validate().await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
            ConfigAction::Init { force } => commands::config_cmd::init(force).await?,
        },
    }

    Ok(())
}
