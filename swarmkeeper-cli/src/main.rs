//! Swarmkeeper — p2p swarm membership reconciler CLI.
//!
//! # Usage
//!
//! ```text
//! swarmkeeper daemon start|stop|status
//! swarmkeeper envs [--json]
//! swarmkeeper readiness <environment>
//! swarmkeeper config show|set-p2p <path>|set-directory <path>
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    config::ConfigCommand,
    daemon::DaemonCommand,
    envs::{EnvsArgs, ReadinessArgs},
};

#[derive(Parser, Debug)]
#[command(
    name = "swarmkeeper",
    version,
    about = "Keep the overlay daemon's joined swarms converged with the environment directory",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage the swarmkeeper background daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },

    /// Show tracked environments and their connectivity.
    Envs(EnvsArgs),

    /// Show per-container launch readiness for one environment.
    Readiness(ReadinessArgs),

    /// Inspect or edit the daemon configuration.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Daemon { command } => commands::daemon::run(command),
        Commands::Envs(args) => args.run(),
        Commands::Readiness(args) => args.run(),
        Commands::Config { command } => commands::config::run(command),
    }
}
