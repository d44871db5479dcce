//! Error types for swarmkeeper-p2p.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from read-only daemon queries.
///
/// Mutating operations (join/leave/handshake) never surface an error type;
/// their failures are folded into a
/// [`CommandOutcome`](crate::gateway::CommandOutcome) result code instead.
#[derive(Debug, Error)]
pub enum P2pError {
    /// The daemon binary could not be spawned at all.
    #[error("failed to launch {binary}: {source}")]
    Launch {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The daemon ran but exited non-zero for a query command.
    #[error("`{command}` failed (status {code:?}): {stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
}
