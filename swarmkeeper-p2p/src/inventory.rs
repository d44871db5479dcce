//! Local container inventory (desktop-peer hosts only).
//!
//! Reads each locally hosted container's hostname file from a fixed root
//! (`<root>/<name>/rootfs/etc/hostname`) and cross-references the result
//! against directory-declared containers, producing a peer-id → present
//! table. Consumed by status output only, never by the reconciliation diff.

use std::collections::HashMap;
use std::path::Path;

use swarmkeeper_core::{Environment, PeerId};

/// Collect the hostnames of locally hosted containers.
///
/// Best effort: unreadable entries are logged and skipped; a missing root
/// yields an empty list.
pub fn scan_local_hostnames(root: &Path) -> Vec<String> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!(root = %root.display(), error = %err, "container root not readable");
            return Vec::new();
        }
    };

    let mut hostnames = Vec::new();
    for entry in entries.filter_map(|e| e.ok()) {
        let hostfile = entry.path().join("rootfs").join("etc").join("hostname");
        match std::fs::read_to_string(&hostfile) {
            Ok(contents) => {
                let Some(hostname) = contents.lines().next().map(str::trim) else {
                    continue;
                };
                if hostname.is_empty() {
                    continue;
                }
                tracing::debug!(hostname, "local container hostname found");
                hostnames.push(hostname.to_string());
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %hostfile.display(), "container hostname file absent");
            }
            Err(err) => {
                tracing::warn!(path = %hostfile.display(), error = %err, "error reading hostname file");
            }
        }
    }
    hostnames
}

/// Cross-reference directory-declared containers against local hostnames.
///
/// A container is considered locally present when any local hostname
/// contains the container's directory name as a substring.
pub fn local_presence(
    environments: &[Environment],
    local_hostnames: &[String],
) -> HashMap<PeerId, bool> {
    if local_hostnames.is_empty() {
        tracing::debug!("no local container hostnames found");
    }

    let mut table = HashMap::new();
    for env in environments {
        for container in &env.containers {
            let found = local_hostnames
                .iter()
                .any(|local| local.contains(&container.name));
            if found {
                tracing::debug!(
                    container = %container.name,
                    peer = %container.peer_id,
                    "matched local container",
                );
            }
            table.insert(container.peer_id.clone(), found);
        }
    }
    table
}
