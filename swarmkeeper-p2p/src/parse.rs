//! Parsing of the overlay daemon's textual output.
//!
//! The daemon prints one record per line. `show` lists joined swarms with
//! the hash as the first whitespace-separated token; `show --interfaces
//! --bind` lists `(hash, interface descriptor)` pairs. Interface descriptors
//! are compound strings (`"swarmif10"`, `"10 -- vptp"`); the numeric id is
//! the first integer token.

use std::sync::LazyLock;

use regex::Regex;

use swarmkeeper_core::SwarmHash;

use crate::gateway::InterfaceBinding;

static INT_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?\d+").expect("integer token pattern"));

/// Extract the joined swarm hashes from `show` output.
///
/// Each non-empty line contributes its first token; anything after it
/// (addresses, state columns) is ignored.
pub fn swarm_hashes(stdout: &str) -> Vec<SwarmHash> {
    stdout
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(SwarmHash::from)
        .collect()
}

/// Extract `(hash, descriptor)` pairs from `show --interfaces --bind` output.
///
/// Lines without at least two tokens are skipped with a debug log; a single
/// malformed line must not discard the rest of the listing.
pub fn interface_bindings(stdout: &str) -> Vec<InterfaceBinding> {
    let mut bindings = Vec::new();
    for line in stdout.lines() {
        let mut tokens = line.split_whitespace();
        let Some(hash) = tokens.next() else {
            continue;
        };
        let descriptor: Vec<&str> = tokens.collect();
        if descriptor.is_empty() {
            tracing::debug!(line, "skipping interface line without a descriptor");
            continue;
        }
        bindings.push(InterfaceBinding {
            hash: SwarmHash::from(hash),
            descriptor: descriptor.join(" "),
        });
    }
    bindings
}

/// Extract the leading integer token from an interface descriptor.
///
/// Returns `None` when the descriptor carries no parseable integer; the
/// caller skips interface assignment for that environment this pass.
pub fn leading_interface_id(descriptor: &str) -> Option<i32> {
    INT_TOKEN
        .find(descriptor)
        .and_then(|m| m.as_str().parse::<i32>().ok())
}
