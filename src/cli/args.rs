//! CLI argument definitions using clap derive
//!
//! Defines all command-line arguments and subcommands.

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

/// Real-time GPU telemetry broadcaster
///
/// Samples an NVIDIA GPU through NVML and pushes every sample to WebSocket
/// subscribers.
#[derive(Parser, Debug)]
#[command(name = "nvstream")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "NVSTREAM_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start sampling and serve subscribers (default)
    Serve(ServeArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Arguments for the serve command
#[derive(Args, Debug, Default, Clone)]
pub struct ServeArgs {
    /// Target GPU by index (0-based)
    #[arg(long)]
    pub gpu: Option<u32>,

    /// Sampling interval in milliseconds
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval_ms: Option<u64>,

    /// Bind address
    #[arg(long)]
    pub host: Option<String>,

    /// Bind port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Channel to publish to (repeatable, replaces the configured list)
    #[arg(long = "channel", value_name = "CHANNEL")]
    pub channels: Vec<String>,
}

impl Cli {
    /// Serve arguments, defaulting when no subcommand was given
    pub fn serve_args(&self) -> Option<ServeArgs> {
        match &self.command {
            None => Some(ServeArgs::default()),
            Some(Commands::Serve(args)) => Some(args.clone()),
            Some(Commands::Completions { .. }) => None,
        }
    }
}

/// Generate shell completions and print to stdout
pub fn generate_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
}
