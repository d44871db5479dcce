//! `swarmkeeper envs` / `swarmkeeper readiness` — connectivity visibility.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde_json::Value;
use tabled::{settings::Style, Table, Tabled};

use swarmkeeper_daemon::{request_readiness, request_status, DaemonError};

/// Arguments for `swarmkeeper envs`.
#[derive(Args, Debug)]
pub struct EnvsArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `swarmkeeper readiness`.
#[derive(Args, Debug)]
pub struct ReadinessArgs {
    /// Environment name as listed in the directory.
    pub environment: String,
}

#[derive(Tabled)]
struct EnvTableRow {
    #[tabled(rename = "environment")]
    environment: String,
    #[tabled(rename = "swarm")]
    swarm: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "interface")]
    interface: String,
    #[tabled(rename = "containers ready")]
    containers_ready: String,
}

impl EnvsArgs {
    pub fn run(self) -> Result<()> {
        let home = dirs::home_dir().context("could not determine home directory")?;

        let status = match request_status(&home) {
            Ok(status) => status,
            Err(DaemonError::DaemonNotRunning { .. }) => {
                if self.json {
                    println!("{}", serde_json::json!({ "running": false }));
                } else {
                    println!("daemon is not running — start it with 'swarmkeeper daemon start'");
                }
                return Ok(());
            }
            Err(err) => return Err(err).context("failed to query daemon status"),
        };

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&status["environments"])
                    .context("failed to serialize environments JSON")?
            );
            return Ok(());
        }

        print_envs_table(&status);
        Ok(())
    }
}

impl ReadinessArgs {
    pub fn run(self) -> Result<()> {
        let home = dirs::home_dir().context("could not determine home directory")?;
        match request_readiness(&home, self.environment) {
            Ok(payload) => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&payload)
                        .context("failed to serialize readiness JSON")?
                );
                Ok(())
            }
            Err(DaemonError::DaemonNotRunning { .. }) => {
                println!("daemon is not running — start it with 'swarmkeeper daemon start'");
                Ok(())
            }
            Err(err) => Err(err).context("failed to query readiness"),
        }
    }
}

fn print_envs_table(status: &Value) {
    let p2p_status = status["p2p_status"].as_str().unwrap_or("unknown");
    println!(
        "Swarmkeeper v{} | overlay daemon: {}",
        env!("CARGO_PKG_VERSION"),
        colorize_p2p_status(p2p_status),
    );

    let Some(environments) = status["environments"].as_array() else {
        println!("No environments tracked.");
        return;
    };
    if environments.is_empty() {
        println!("No environments tracked.");
        return;
    }

    let rows: Vec<EnvTableRow> = environments.iter().map(env_row).collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    if let Some(tick) = status["last_tick"].as_object() {
        let at = tick.get("at").and_then(Value::as_str).unwrap_or("never");
        println!("last reconciliation: {at}");
    }
}

fn env_row(env: &Value) -> EnvTableRow {
    let joined = env["joined"].as_bool().unwrap_or(false);
    let healthy = env["healthy"].as_bool().unwrap_or(false);
    let status = match (healthy, joined) {
        (_, true) => "JOINED".green().bold().to_string(),
        (true, false) => "PENDING".yellow().bold().to_string(),
        (false, false) => "UNHEALTHY".bright_black().bold().to_string(),
    };

    let containers = env["containers"].as_array().cloned().unwrap_or_default();
    let ready = containers
        .iter()
        .filter(|c| c["readiness"] == "ready")
        .count();

    EnvTableRow {
        environment: env["name"].as_str().unwrap_or("?").to_string(),
        swarm: env["hash"].as_str().unwrap_or("?").to_string(),
        status,
        interface: env["interface_id"]
            .as_i64()
            .map(|id| format!("swarmif{id}"))
            .unwrap_or_else(|| "-".to_string()),
        containers_ready: format!("{ready}/{}", containers.len()),
    }
}

fn colorize_p2p_status(status: &str) -> String {
    match status {
        "running" => status.green().bold().to_string(),
        "installed_stopped" => status.yellow().bold().to_string(),
        _ => status.red().bold().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_env(joined: bool, healthy: bool, readiness: &str) -> Value {
        json!({
            "name": "staging",
            "hash": "h1",
            "healthy": healthy,
            "joined": joined,
            "interface_id": 4,
            "containers": [
                { "id": "c1", "name": "web", "readiness": readiness },
            ],
        })
    }

    #[test]
    fn env_row_counts_ready_containers() {
        let row = env_row(&sample_env(true, true, "ready"));
        assert_eq!(row.containers_ready, "1/1");
        assert_eq!(row.interface, "swarmif4");

        let row = env_row(&sample_env(true, true, "container_not_reachable"));
        assert_eq!(row.containers_ready, "0/1");
    }

    #[test]
    fn env_row_without_interface_shows_dash() {
        let mut env = sample_env(false, true, "swarm_not_joined");
        env["interface_id"] = Value::Null;
        let row = env_row(&env);
        assert_eq!(row.interface, "-");
    }
}
