//! Virtual interface id assignment.
//!
//! Every healthy environment gets exactly one interface id for the lifetime
//! of the process. A daemon-reported binding wins; otherwise the lowest id
//! never handed out before is allocated. The id→hash table is rebuilt from
//! scratch on every pass so stale entries from prior passes never linger.

use std::collections::{BTreeSet, HashMap};

use swarmkeeper_core::{Environment, SwarmHash};

use crate::gateway::InterfaceBinding;
use crate::parse;

#[derive(Debug, Default)]
pub struct InterfaceAllocator {
    /// Permanent per-process assignments. Never overwritten once set.
    assigned: HashMap<SwarmHash, i32>,
    /// Every id handed out during this process lifetime, adopted or
    /// allocated. Lowest-unused allocation draws from the complement.
    used: BTreeSet<i32>,
    /// id → hash, rebuilt each pass from current assignments.
    bindings: HashMap<i32, SwarmHash>,
}

impl InterfaceAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run one assignment pass over the desired environments.
    ///
    /// Adoption first: an environment whose hash appears in the daemon's
    /// reported bindings takes that interface id. Allocation second: the
    /// remaining unassigned environments take the lowest unused id.
    /// Unhealthy environments are skipped entirely; an environment with an
    /// unparseable reported descriptor is skipped for this pass only.
    pub fn assign_pass(&mut self, desired: &[Environment], reported: &[InterfaceBinding]) {
        self.bindings.clear();
        for (hash, id) in &self.assigned {
            self.bindings.insert(*id, hash.clone());
        }

        for env in desired {
            if !env.healthy || self.assigned.contains_key(&env.hash) {
                continue;
            }
            let Some(binding) = reported.iter().find(|b| b.hash == env.hash) else {
                continue;
            };
            match parse::leading_interface_id(&binding.descriptor) {
                Some(id) => self.record(env, id, "adopted daemon-reported interface"),
                None => tracing::warn!(
                    env = %env.name,
                    hash = %env.hash,
                    descriptor = %binding.descriptor,
                    "unparseable interface descriptor; skipping assignment this pass",
                ),
            }
        }

        for env in desired {
            if !env.healthy || self.assigned.contains_key(&env.hash) {
                continue;
            }
            if reported.iter().any(|b| b.hash == env.hash) {
                continue; // binding exists but did not parse above
            }
            let id = self.lowest_unused();
            self.record(env, id, "allocated lowest unused interface");
        }
    }

    /// The id assigned to `hash`, if any pass has assigned one.
    pub fn interface_id(&self, hash: &SwarmHash) -> Option<i32> {
        self.assigned.get(hash).copied()
    }

    /// All permanent assignments (hash → id).
    pub fn assignments(&self) -> &HashMap<SwarmHash, i32> {
        &self.assigned
    }

    /// This pass's id → hash table.
    pub fn bindings(&self) -> &HashMap<i32, SwarmHash> {
        &self.bindings
    }

    fn record(&mut self, env: &Environment, id: i32, what: &str) {
        tracing::info!(env = %env.name, hash = %env.hash, id, "{what}");
        self.assigned.insert(env.hash.clone(), id);
        self.used.insert(id);
        self.bindings.insert(id, env.hash.clone());
    }

    fn lowest_unused(&self) -> i32 {
        (0..).find(|id| !self.used.contains(id)).unwrap_or(0)
    }
}
