//! External process gateway for the overlay-network daemon.
//!
//! [`P2pControl`] is the abstract control surface consumed by the
//! reconciler; [`DaemonCli`] is the production implementation that shells
//! out to the daemon binary. Read-only queries return `Result` so parse and
//! launch failures stay visible; mutating operations (join/leave/handshake)
//! return a [`CommandOutcome`] and never error past this boundary.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;

use swarmkeeper_core::{Container, Environment, SwarmHash};

use crate::error::P2pError;
use crate::parse;

/// Result code and captured output of one daemon-mutating operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub success: bool,
    /// Process exit code; `None` when the process was killed by a signal or
    /// never started.
    pub code: Option<i32>,
    /// Trimmed stderr on failure, trimmed stdout on success.
    pub detail: String,
}

impl CommandOutcome {
    pub fn ok(detail: impl Into<String>) -> Self {
        Self {
            success: true,
            code: Some(0),
            detail: detail.into(),
        }
    }

    pub fn failed(code: Option<i32>, detail: impl Into<String>) -> Self {
        Self {
            success: false,
            code,
            detail: detail.into(),
        }
    }
}

/// A `(swarm hash, interface descriptor)` pair reported by the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceBinding {
    pub hash: SwarmHash,
    pub descriptor: String,
}

/// Abstract contract over the daemon's command-line control surface.
///
/// One implementation drives the real binary; tests substitute scripted
/// doubles. Both the health monitor and the reconciler's precondition check
/// source liveness from the same two probes here.
#[async_trait]
pub trait P2pControl: Send + Sync {
    /// The daemon binary exists and is executable.
    fn binary_launchable(&self) -> bool;

    /// The daemon process answers its status command.
    async fn daemon_alive(&self) -> bool;

    /// Swarm hashes the daemon currently reports as joined.
    async fn joined_swarms(&self) -> Result<Vec<SwarmHash>, P2pError>;

    /// `(swarm, interface)` bindings the daemon currently reports.
    async fn interface_bindings(&self) -> Result<Vec<InterfaceBinding>, P2pError>;

    /// Join the swarm identified by `hash`.
    async fn join(&self, hash: &SwarmHash) -> CommandOutcome;

    /// Leave the swarm identified by `hash`. Idempotent at the daemon level.
    async fn leave(&self, hash: &SwarmHash) -> CommandOutcome;

    /// Handshake with one container inside a joined swarm.
    async fn handshake(&self, env: &Environment, container: &Container) -> CommandOutcome;
}

/// Production gateway: spawns the configured daemon binary per call.
#[derive(Debug, Clone)]
pub struct DaemonCli {
    binary: PathBuf,
}

impl DaemonCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Run a query command, returning trimmed stdout on a zero exit.
    async fn run_capture(&self, args: &[&str]) -> Result<String, P2pError> {
        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .map_err(|source| P2pError::Launch {
                binary: self.binary.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(P2pError::CommandFailed {
                command: format!("{} {}", self.binary.display(), args.join(" ")),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Run a mutating command, folding every failure into the outcome.
    async fn run_outcome(&self, args: &[&str]) -> CommandOutcome {
        match Command::new(&self.binary).args(args).output().await {
            Ok(output) if output.status.success() => {
                CommandOutcome::ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
            }
            Ok(output) => CommandOutcome::failed(
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ),
            Err(err) => CommandOutcome::failed(None, format!("failed to launch daemon: {err}")),
        }
    }
}

#[async_trait]
impl P2pControl for DaemonCli {
    fn binary_launchable(&self) -> bool {
        is_executable(&self.binary)
    }

    async fn daemon_alive(&self) -> bool {
        self.run_outcome(&["status"]).await.success
    }

    async fn joined_swarms(&self) -> Result<Vec<SwarmHash>, P2pError> {
        let stdout = self.run_capture(&["show"]).await?;
        Ok(parse::swarm_hashes(&stdout))
    }

    async fn interface_bindings(&self) -> Result<Vec<InterfaceBinding>, P2pError> {
        let stdout = self
            .run_capture(&["show", "--interfaces", "--bind"])
            .await?;
        Ok(parse::interface_bindings(&stdout))
    }

    async fn join(&self, hash: &SwarmHash) -> CommandOutcome {
        self.run_outcome(&["start", "--hash", &hash.0]).await
    }

    async fn leave(&self, hash: &SwarmHash) -> CommandOutcome {
        self.run_outcome(&["stop", "--hash", &hash.0]).await
    }

    async fn handshake(&self, env: &Environment, container: &Container) -> CommandOutcome {
        self.run_outcome(&["ping", "--hash", &env.hash.0, "--peer", &container.peer_id.0])
            .await
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    match std::fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
