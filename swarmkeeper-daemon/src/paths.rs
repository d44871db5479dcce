use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DAEMON_SOCKET: &str = "swarmkeeper.sock";

/// Delay before the first reconciliation tick after daemon start.
pub const STARTUP_DELAY: Duration = Duration::from_secs(5);

/// Depth of the serialized swarm-operation queue.
pub const TASK_QUEUE_DEPTH: usize = 64;

pub fn swarmkeeper_root(home: &Path) -> PathBuf {
    home.join(".swarmkeeper")
}

pub fn run_dir(home: &Path) -> PathBuf {
    swarmkeeper_root(home).join("run")
}

pub fn socket_path(home: &Path) -> PathBuf {
    swarmkeeper_root(home).join(DAEMON_SOCKET)
}

/// Default directory snapshot location when the config names none.
pub fn directory_snapshot_path(home: &Path) -> PathBuf {
    swarmkeeper_root(home).join("environments.yaml")
}
