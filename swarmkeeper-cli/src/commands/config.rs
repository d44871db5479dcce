//! `swarmkeeper config` — daemon configuration file management.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;

use swarmkeeper_core::Config;

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration.
    Show,
    /// Set the overlay daemon binary path.
    SetP2p { path: PathBuf },
    /// Set the environment directory snapshot path.
    SetDirectory { path: PathBuf },
}

pub fn run(command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            let config = Config::load().context("failed to load configuration")?;
            let yaml =
                serde_yaml::to_string(&config).context("failed to render configuration")?;
            print!("{yaml}");
        }
        ConfigCommand::SetP2p { path } => {
            let mut config = Config::load().context("failed to load configuration")?;
            config.p2p_path = path;
            config.save().context("failed to save configuration")?;
            println!("p2p_path set to {}", config.p2p_path.display());
        }
        ConfigCommand::SetDirectory { path } => {
            let mut config = Config::load().context("failed to load configuration")?;
            let shown = path.display().to_string();
            config.directory_path = Some(path);
            config.save().context("failed to save configuration")?;
            println!("directory_path set to {shown}");
        }
    }
    Ok(())
}
