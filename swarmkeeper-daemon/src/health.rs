//! Overlay daemon availability monitor.
//!
//! Independent poll loop classifying the daemon as absent / installed but
//! stopped / running, publishing transitions on a `watch` channel. The
//! reconciler gates its precondition on the same receiver, so the two
//! checks can never disagree about the daemon's state.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, watch};

use swarmkeeper_p2p::P2pControl;

/// Coarse daemon availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum P2pStatus {
    /// The daemon binary is not launchable.
    Absent,
    /// Binary present but the liveness probe fails.
    InstalledStopped,
    Running,
}

impl std::fmt::Display for P2pStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            P2pStatus::Absent => write!(f, "absent"),
            P2pStatus::InstalledStopped => write!(f, "installed (stopped)"),
            P2pStatus::Running => write!(f, "running"),
        }
    }
}

/// One probe of the daemon's availability.
pub async fn classify(p2p: &dyn P2pControl) -> P2pStatus {
    if !p2p.binary_launchable() {
        P2pStatus::Absent
    } else if !p2p.daemon_alive().await {
        P2pStatus::InstalledStopped
    } else {
        P2pStatus::Running
    }
}

pub struct HealthMonitor {
    p2p: Arc<dyn P2pControl>,
    tx: watch::Sender<P2pStatus>,
    idle_poll: Duration,
    running_poll: Duration,
}

impl HealthMonitor {
    /// Build the monitor and the receiver its subscribers (UI, reconciler)
    /// observe. The state starts at `Absent` until the first probe lands.
    pub fn new(
        p2p: Arc<dyn P2pControl>,
        idle_poll: Duration,
        running_poll: Duration,
    ) -> (Self, watch::Receiver<P2pStatus>) {
        let (tx, rx) = watch::channel(P2pStatus::Absent);
        (
            Self {
                p2p,
                tx,
                idle_poll,
                running_poll,
            },
            rx,
        )
    }

    /// Poll until shutdown: every `idle_poll` while not running, every
    /// `running_poll` once running.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        loop {
            let status = classify(self.p2p.as_ref()).await;
            if *self.tx.borrow() != status {
                tracing::info!(%status, "overlay daemon availability changed");
            }
            // send_replace also refreshes the value for late subscribers
            // when the status did not change.
            self.tx.send_replace(status);

            let delay = if status == P2pStatus::Running {
                self.running_poll
            } else {
                self.idle_poll
            };
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
