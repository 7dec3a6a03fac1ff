//! # concord CLI
//!
//! The external actor's side of a concord run: enqueue commands on the bus,
//! read published concept states, and inspect or trace the journal.

mod commands;

use clap::{Parser, Subcommand};
use concord_types::CommandStatus;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "concord")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(long, default_value = "concord.yml", env = "CONCORD_CONFIG")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Queue an action for the running system
    Enqueue {
        /// Target concept name
        target: String,

        /// Action name
        action: String,

        /// JSON payload
        #[arg(long, default_value = "{}")]
        payload: String,
    },

    /// List commands on the bus
    Commands {
        /// Only show commands with this status (pending, done, error)
        #[arg(long)]
        status: Option<CommandStatus>,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Show published concept state
    State {
        /// Concept name (all concepts if omitted)
        name: Option<String>,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Summarize the journal
    Inspect {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Follow an event's causal chain back to its root action
    Trace {
        /// Event id
        event: String,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Check a synchronization rule file
    Rules {
        /// YAML rule file
        file: PathBuf,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing; stdout is reserved for command output
    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(if cli.verbose {
                tracing::Level::DEBUG.into()
            } else {
                tracing::Level::WARN.into()
            }),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Enqueue {
            target,
            action,
            payload,
        } => commands::enqueue(&cli.config, &target, &action, &payload),
        Commands::Commands { status, json } => commands::list_commands(&cli.config, status, json),
        Commands::State { name, json } => commands::show_state(&cli.config, name.as_deref(), json),
        Commands::Inspect { json } => commands::inspect(&cli.config, json),
        Commands::Trace { event, json } => commands::trace(&cli.config, &event, json),
        Commands::Rules { file, json } => commands::check_rules(&file, json),
    }
}
