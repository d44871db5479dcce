//! Desired-vs-actual diff for one reconciliation tick.
//!
//! Given the directory's desired environments `D` and the daemon's joined
//! set `A`, a tick schedules exactly:
//!
//! - join:  healthy members of `D` whose hash is absent from `A`
//! - check: members of `D` whose hash is present in `A` (per container)
//! - leave: members of `A` with no corresponding desired environment
//!
//! No hash appears in more than one set.

use std::collections::HashSet;

use swarmkeeper_core::{Environment, SwarmHash};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub join: Vec<Environment>,
    pub check: Vec<Environment>,
    pub leave: Vec<SwarmHash>,
}

pub fn compute(desired: &[Environment], joined: &HashSet<SwarmHash>) -> ReconcilePlan {
    let desired_hashes: HashSet<&SwarmHash> = desired.iter().map(|env| &env.hash).collect();

    let join = desired
        .iter()
        .filter(|env| env.healthy && !joined.contains(&env.hash))
        .cloned()
        .collect();

    let check = desired
        .iter()
        .filter(|env| joined.contains(&env.hash))
        .cloned()
        .collect();

    let leave = joined
        .iter()
        .filter(|hash| !desired_hashes.contains(hash))
        .cloned()
        .collect();

    ReconcilePlan { join, check, leave }
}
