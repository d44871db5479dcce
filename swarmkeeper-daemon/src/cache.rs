//! Connectivity status cache.
//!
//! Thread-safe record of "is this swarm joined" and "is this container
//! reachable" facts. Written only by the reconciler (ground-truth sweep in
//! the synchronous tick phase, then per-operation completion callbacks);
//! read by status consumers. Unknown always reads as `false` — the
//! conservative answer.
//!
//! The two maps are guarded by separate locks because they are updated on
//! independent paths and read together only for readiness classification.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use swarmkeeper_core::{ContainerId, SwarmHash};

/// Coarse launch-readiness classification for one (environment, container).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    /// The environment's swarm is not joined.
    SwarmNotJoined,
    /// Swarm joined, but the container has not answered a handshake.
    ContainerNotReachable,
    Ready,
}

#[derive(Debug, Default)]
pub struct ConnectivityCache {
    joined: Mutex<HashSet<SwarmHash>>,
    reachable: Mutex<HashSet<(SwarmHash, ContainerId)>>,
}

impl ConnectivityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_environment_joined(&self, hash: &SwarmHash) -> bool {
        lock(&self.joined).contains(hash)
    }

    pub fn is_container_reachable(&self, hash: &SwarmHash, container: &ContainerId) -> bool {
        lock(&self.reachable).contains(&(hash.clone(), container.clone()))
    }

    pub fn set_environment_joined(&self, hash: &SwarmHash, joined: bool) {
        let mut set = lock(&self.joined);
        if joined {
            set.insert(hash.clone());
        } else {
            set.remove(hash);
        }
    }

    pub fn set_container_reachable(
        &self,
        hash: &SwarmHash,
        container: &ContainerId,
        reachable: bool,
    ) {
        let mut set = lock(&self.reachable);
        let key = (hash.clone(), container.clone());
        if reachable {
            set.insert(key);
        } else {
            set.remove(&key);
        }
    }

    /// Drop every fact. Used when the overlay daemon is judged
    /// non-operational: unknown state is treated as disconnected.
    pub fn clear_all(&self) {
        lock(&self.joined).clear();
        lock(&self.reachable).clear();
    }

    /// Drop facts whose owner left the desired-state snapshot.
    pub fn prune(
        &self,
        live_environments: &HashSet<SwarmHash>,
        live_containers: &HashSet<(SwarmHash, ContainerId)>,
    ) {
        lock(&self.joined).retain(|hash| live_environments.contains(hash));
        lock(&self.reachable).retain(|key| live_containers.contains(key));
    }

    pub fn readiness(&self, hash: &SwarmHash, container: &ContainerId) -> Readiness {
        if !self.is_environment_joined(hash) {
            Readiness::SwarmNotJoined
        } else if !self.is_container_reachable(hash, container) {
            Readiness::ContainerNotReachable
        } else {
            Readiness::Ready
        }
    }
}

/// A poisoned lock only means a panicking reader; the data (two plain sets)
/// cannot be left in a torn state, so recover the guard.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
