//! End-to-end reconciliation ticks against scripted directory and daemon
//! doubles: convergence, interface stability, cache coherence, and the
//! fail-safe paths.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, Notify};

use swarmkeeper_core::{Config, Container, ContainerId, Environment, PeerId, SwarmHash};
use swarmkeeper_daemon::{
    ConnectivityCache, DirectoryError, DirectoryService, P2pStatus, Reconciler, SharedState,
    TaskRunner,
};
use swarmkeeper_p2p::{CommandOutcome, InterfaceBinding, P2pControl, P2pError};

// ---------------------------------------------------------------------------
// Doubles
// ---------------------------------------------------------------------------

struct MockDirectory {
    environments: Mutex<Option<Vec<Environment>>>,
}

impl MockDirectory {
    fn serving(environments: Vec<Environment>) -> Arc<Self> {
        Arc::new(Self {
            environments: Mutex::new(Some(environments)),
        })
    }

    fn set(&self, environments: Option<Vec<Environment>>) {
        *self.environments.lock().unwrap() = environments;
    }
}

#[async_trait]
impl DirectoryService for MockDirectory {
    async fn list_environments(&self) -> Result<Vec<Environment>, DirectoryError> {
        match self.environments.lock().unwrap().clone() {
            Some(environments) => Ok(environments),
            None => Err(DirectoryError::Io {
                path: PathBuf::from("mock-directory"),
                source: std::io::Error::new(std::io::ErrorKind::Other, "directory unreachable"),
            }),
        }
    }
}

#[derive(Default)]
struct MockP2p {
    joined: Mutex<HashSet<SwarmHash>>,
    bindings: Mutex<Vec<InterfaceBinding>>,
    calls: Mutex<Vec<String>>,
    fail_queries: AtomicBool,
    /// When set, `join` blocks until notified — used to observe mid-flight
    /// cache state.
    join_gate: Option<Arc<Notify>>,
}

impl MockP2p {
    fn with_joined(hashes: &[&str]) -> Arc<Self> {
        let mock = Self::default();
        *mock.joined.lock().unwrap() = hashes.iter().map(|h| SwarmHash::from(*h)).collect();
        Arc::new(mock)
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn is_joined(&self, hash: &str) -> bool {
        self.joined.lock().unwrap().contains(&SwarmHash::from(hash))
    }
}

#[async_trait]
impl P2pControl for MockP2p {
    fn binary_launchable(&self) -> bool {
        true
    }

    async fn daemon_alive(&self) -> bool {
        true
    }

    async fn joined_swarms(&self) -> Result<Vec<SwarmHash>, P2pError> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(P2pError::CommandFailed {
                command: "p2p show".to_string(),
                code: Some(1),
                stderr: "daemon gone".to_string(),
            });
        }
        Ok(self.joined.lock().unwrap().iter().cloned().collect())
    }

    async fn interface_bindings(&self) -> Result<Vec<InterfaceBinding>, P2pError> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(P2pError::CommandFailed {
                command: "p2p show --interfaces --bind".to_string(),
                code: Some(1),
                stderr: "daemon gone".to_string(),
            });
        }
        Ok(self.bindings.lock().unwrap().clone())
    }

    async fn join(&self, hash: &SwarmHash) -> CommandOutcome {
        self.record(format!("join {hash}"));
        if let Some(gate) = &self.join_gate {
            gate.notified().await;
        }
        self.joined.lock().unwrap().insert(hash.clone());
        CommandOutcome::ok("")
    }

    async fn leave(&self, hash: &SwarmHash) -> CommandOutcome {
        self.record(format!("leave {hash}"));
        self.joined.lock().unwrap().remove(hash);
        CommandOutcome::ok("")
    }

    async fn handshake(&self, env: &Environment, container: &Container) -> CommandOutcome {
        self.record(format!("handshake {}/{}", env.hash, container.id));
        CommandOutcome::ok("")
    }
}

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

struct Fixture {
    reconciler: Reconciler,
    cache: Arc<ConnectivityCache>,
    shared: Arc<SharedState>,
    health_tx: watch::Sender<P2pStatus>,
}

fn fixture(directory: Arc<MockDirectory>, p2p: Arc<MockP2p>) -> Fixture {
    let config = Config {
        lxc_root: PathBuf::from("/nonexistent-lxc-root"),
        ..Config::default()
    };
    let cache = Arc::new(ConnectivityCache::new());
    let shared = Arc::new(SharedState::default());
    let (runner, _worker) = TaskRunner::start(64);
    let (health_tx, health_rx) = watch::channel(P2pStatus::Running);

    let reconciler = Reconciler::new(
        directory,
        p2p,
        cache.clone(),
        runner,
        health_rx,
        shared.clone(),
        &config,
    );
    Fixture {
        reconciler,
        cache,
        shared,
        health_tx,
    }
}

fn env(name: &str, hash: &str, healthy: bool, containers: &[&str]) -> Environment {
    Environment {
        name: name.to_string(),
        hash: SwarmHash::from(hash),
        healthy,
        containers: containers
            .iter()
            .map(|c| Container {
                id: ContainerId::from(*c),
                name: format!("{name}-{c}"),
                peer_id: PeerId::from(format!("peer-{c}")),
            })
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// Convergence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn tick_joins_checks_and_leaves_the_right_swarms() {
    let directory = MockDirectory::serving(vec![
        env("envA", "h1", true, &["c1"]),
        env("envB", "h2", true, &[]),
    ]);
    let p2p = MockP2p::with_joined(&["h1", "h3"]);
    let mut fx = fixture(directory, p2p.clone());

    fx.reconciler.tick().await;
    fx.reconciler.quiesce().await;

    let calls = p2p.calls();
    assert!(calls.contains(&"join h2".to_string()), "calls: {calls:?}");
    assert!(calls.contains(&"handshake h1/c1".to_string()), "calls: {calls:?}");
    assert!(calls.contains(&"leave h3".to_string()), "calls: {calls:?}");

    // Daemon side converged.
    assert!(p2p.is_joined("h1"));
    assert!(p2p.is_joined("h2"));
    assert!(!p2p.is_joined("h3"));

    // Cache reflects completions.
    assert!(fx.cache.is_environment_joined(&SwarmHash::from("h1")));
    assert!(fx.cache.is_environment_joined(&SwarmHash::from("h2")));
    assert!(!fx.cache.is_environment_joined(&SwarmHash::from("h3")));
    assert!(fx
        .cache
        .is_container_reachable(&SwarmHash::from("h1"), &ContainerId::from("c1")));
}

#[tokio::test]
async fn second_tick_reaches_steady_state() {
    let directory = MockDirectory::serving(vec![env("envA", "h1", true, &["c1"])]);
    let p2p = MockP2p::with_joined(&[]);
    let mut fx = fixture(directory, p2p.clone());

    fx.reconciler.tick().await;
    fx.reconciler.quiesce().await;
    p2p.clear_calls();

    fx.reconciler.tick().await;
    fx.reconciler.quiesce().await;

    let calls = p2p.calls();
    assert_eq!(
        calls,
        vec!["handshake h1/c1".to_string()],
        "steady state schedules only container checks"
    );
}

#[tokio::test]
async fn unhealthy_environment_is_not_joined_but_still_checked_once_joined() {
    let directory = MockDirectory::serving(vec![
        env("sick-new", "h1", false, &["c1"]),
        env("sick-old", "h2", false, &["c2"]),
    ]);
    let p2p = MockP2p::with_joined(&["h2"]);
    let mut fx = fixture(directory, p2p.clone());

    fx.reconciler.tick().await;
    fx.reconciler.quiesce().await;

    let calls = p2p.calls();
    assert!(!calls.iter().any(|c| c.starts_with("join")), "calls: {calls:?}");
    assert!(!calls.iter().any(|c| c.starts_with("leave")), "calls: {calls:?}");
    assert!(calls.contains(&"handshake h2/c2".to_string()), "calls: {calls:?}");
}

#[tokio::test]
async fn foreign_swarm_is_left_exactly_once_per_tick() {
    let directory = MockDirectory::serving(vec![]);
    let p2p = MockP2p::with_joined(&["h9"]);
    let mut fx = fixture(directory, p2p.clone());

    fx.reconciler.tick().await;
    fx.reconciler.quiesce().await;

    assert_eq!(p2p.calls(), vec!["leave h9".to_string()]);
}

// ---------------------------------------------------------------------------
// Interface stability
// ---------------------------------------------------------------------------

#[tokio::test]
async fn interface_ids_are_stable_across_ticks() {
    let directory = MockDirectory::serving(vec![
        env("envA", "h1", true, &[]),
        env("envB", "h2", true, &[]),
    ]);
    let p2p = MockP2p::with_joined(&["h1"]);
    *p2p.bindings.lock().unwrap() = vec![InterfaceBinding {
        hash: SwarmHash::from("h1"),
        descriptor: "swarmif4".to_string(),
    }];
    let mut fx = fixture(directory, p2p.clone());

    fx.reconciler.tick().await;
    fx.reconciler.quiesce().await;

    {
        let ids = fx.shared.interface_ids.read().await;
        assert_eq!(ids.get(&SwarmHash::from("h1")), Some(&4), "adopted binding");
        assert_eq!(ids.get(&SwarmHash::from("h2")), Some(&0), "lowest unused");
    }

    // The daemon re-reports a different binding; assignments must not move.
    *p2p.bindings.lock().unwrap() = vec![InterfaceBinding {
        hash: SwarmHash::from("h1"),
        descriptor: "swarmif8".to_string(),
    }];
    fx.reconciler.tick().await;
    fx.reconciler.quiesce().await;

    let ids = fx.shared.interface_ids.read().await;
    assert_eq!(ids.get(&SwarmHash::from("h1")), Some(&4));
    assert_eq!(ids.get(&SwarmHash::from("h2")), Some(&0));
}

// ---------------------------------------------------------------------------
// Cache coherence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ground_truth_lands_before_a_pending_join_completes() {
    let gate = Arc::new(Notify::new());
    let p2p = Arc::new(MockP2p {
        join_gate: Some(gate.clone()),
        ..MockP2p::default()
    });
    let directory = MockDirectory::serving(vec![env("envB", "h2", true, &[])]);
    let mut fx = fixture(directory, p2p.clone());

    fx.reconciler.tick().await;

    // The join is queued but blocked on the gate: the cache must already
    // hold the daemon-reported truth (not joined), not an optimistic value.
    assert!(!fx.cache.is_environment_joined(&SwarmHash::from("h2")));

    gate.notify_one();
    fx.reconciler.quiesce().await;
    assert!(fx.cache.is_environment_joined(&SwarmHash::from("h2")));
}

#[tokio::test]
async fn departed_environment_facts_are_pruned() {
    let directory = MockDirectory::serving(vec![env("envA", "h1", true, &["c1"])]);
    let p2p = MockP2p::with_joined(&["h1"]);
    let mut fx = fixture(directory.clone(), p2p);

    fx.reconciler.tick().await;
    fx.reconciler.quiesce().await;
    assert!(fx
        .cache
        .is_container_reachable(&SwarmHash::from("h1"), &ContainerId::from("c1")));

    // envA disappears from the directory.
    directory.set(Some(vec![]));
    fx.reconciler.tick().await;
    fx.reconciler.quiesce().await;

    assert!(!fx.cache.is_environment_joined(&SwarmHash::from("h1")));
    assert!(!fx
        .cache
        .is_container_reachable(&SwarmHash::from("h1"), &ContainerId::from("c1")));
}

// ---------------------------------------------------------------------------
// Fail-safe paths
// ---------------------------------------------------------------------------

#[tokio::test]
async fn overlay_daemon_down_clears_facts_and_backs_off() {
    let directory = MockDirectory::serving(vec![env("envA", "h1", true, &["c1"])]);
    let p2p = MockP2p::with_joined(&["h1"]);
    let mut fx = fixture(directory, p2p);

    fx.reconciler.tick().await;
    fx.reconciler.quiesce().await;
    assert!(fx.cache.is_environment_joined(&SwarmHash::from("h1")));

    fx.health_tx.send_replace(P2pStatus::InstalledStopped);
    let delay = fx.reconciler.tick().await;

    assert_eq!(delay, Duration::from_secs(30), "backoff interval");
    assert!(!fx.cache.is_environment_joined(&SwarmHash::from("h1")));

    let tick = fx.shared.last_tick.read().await.clone().expect("recorded");
    assert_eq!(tick.p2p_status, P2pStatus::InstalledStopped);
    assert_eq!(tick.joins_scheduled, 0);
}

#[tokio::test]
async fn directory_failure_aborts_the_tick_without_touching_facts() {
    let directory = MockDirectory::serving(vec![env("envA", "h1", true, &["c1"])]);
    let p2p = MockP2p::with_joined(&["h1"]);
    let mut fx = fixture(directory.clone(), p2p.clone());

    fx.reconciler.tick().await;
    fx.reconciler.quiesce().await;
    p2p.clear_calls();

    directory.set(None);
    let delay = fx.reconciler.tick().await;
    fx.reconciler.quiesce().await;

    assert_eq!(delay, Duration::from_secs(15), "normal re-arm, not backoff");
    assert!(
        fx.cache.is_environment_joined(&SwarmHash::from("h1")),
        "stale facts are kept when only the directory is unreachable"
    );
    assert!(p2p.calls().is_empty(), "no operations scheduled");

    // The aborted tick is still visible over the status surface.
    let tick = fx.shared.last_tick.read().await.clone().expect("recorded");
    let error = tick.error.expect("aborted tick carries its error");
    assert!(error.contains("directory"), "error: {error}");
}

#[tokio::test]
async fn daemon_query_failure_mid_tick_goes_pessimistic() {
    let directory = MockDirectory::serving(vec![env("envA", "h1", true, &["c1"])]);
    let p2p = MockP2p::with_joined(&["h1"]);
    let mut fx = fixture(directory, p2p.clone());

    fx.reconciler.tick().await;
    fx.reconciler.quiesce().await;
    assert!(fx.cache.is_environment_joined(&SwarmHash::from("h1")));

    p2p.fail_queries.store(true, Ordering::SeqCst);
    let delay = fx.reconciler.tick().await;

    assert_eq!(delay, Duration::from_secs(30), "backoff interval");
    assert!(!fx.cache.is_environment_joined(&SwarmHash::from("h1")));

    let tick = fx.shared.last_tick.read().await.clone().expect("recorded");
    assert!(tick.error.is_some(), "aborted tick carries its error");
}
