//! Domain types for the swarmkeeper reconciler.
//!
//! An [`Environment`] is a user-declared grouping of containers sourced from
//! the remote directory service; its `hash` identifies the overlay-network
//! swarm the host must join while the environment is declared and healthy.
//! Directory snapshots are plain data — all per-process reconciliation state
//! (interface assignments, connectivity facts) lives in the daemon crate.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Stable overlay-network swarm identifier, unique per environment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SwarmHash(pub String);

impl fmt::Display for SwarmHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for SwarmHash {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SwarmHash {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Directory-assigned container identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerId(pub String);

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ContainerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ContainerId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Identifies a container within the overlay network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId(pub String);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// A container declared by the directory service. Owned by exactly one
/// [`Environment`]; it has no independent lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub id: ContainerId,
    pub name: String,
    pub peer_id: PeerId,
}

/// A declared environment, as reported by the directory service.
///
/// Each snapshot read by the reconciler is a point-in-time copy; no shared
/// mutable environment objects are retained across reconciliation passes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub name: String,
    pub hash: SwarmHash,
    #[serde(default = "default_healthy")]
    pub healthy: bool,
    #[serde(default)]
    pub containers: Vec<Container>,
}

fn default_healthy() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
