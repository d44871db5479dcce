//! Swarm reconciliation loop.
//!
//! Each tick converges the overlay daemon's joined swarms toward the
//! directory's desired environments: fetch both sides, diff, refresh the
//! connectivity cache from ground truth, then schedule join / handshake /
//! leave operations on the serialized runner. Completion callbacks update
//! the cache as results land; the next tick re-observes whatever actually
//! happened, so a failed or skipped operation is simply retried.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, watch, RwLock};
use tokio::task::JoinSet;

use swarmkeeper_core::{Config, Environment, PeerId, SwarmHash};
use swarmkeeper_p2p::P2pControl;

use crate::cache::ConnectivityCache;
use crate::directory::DirectoryService;
use crate::health::P2pStatus;
use crate::plan;
use crate::runner::TaskRunner;

/// Record of one tick, surfaced over the status socket. Aborted ticks are
/// recorded too, with `error` set, so status consumers can tell a stale
/// snapshot from a daemon that stopped ticking.
#[derive(Debug, Clone, Serialize)]
pub struct TickSummary {
    pub at: DateTime<Utc>,
    pub p2p_status: P2pStatus,
    pub joins_scheduled: usize,
    pub checks_scheduled: usize,
    pub leaves_scheduled: usize,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// State the reconciler publishes for status consumers.
///
/// Everything here is a snapshot of the latest tick; the connectivity cache
/// holds the authoritative joined/reachable facts separately.
#[derive(Debug, Default)]
pub struct SharedState {
    pub environments: RwLock<Vec<Environment>>,
    pub local_presence: RwLock<HashMap<PeerId, bool>>,
    pub interface_ids: RwLock<HashMap<SwarmHash, i32>>,
    pub last_tick: RwLock<Option<TickSummary>>,
}

pub struct Reconciler {
    directory: Arc<dyn DirectoryService>,
    p2p: Arc<dyn P2pControl>,
    cache: Arc<ConnectivityCache>,
    allocator: swarmkeeper_p2p::InterfaceAllocator,
    runner: TaskRunner,
    health: watch::Receiver<P2pStatus>,
    shared: Arc<SharedState>,
    lxc_root: PathBuf,
    tick_interval: Duration,
    backoff_interval: Duration,
    in_flight: JoinSet<()>,
}

impl Reconciler {
    pub fn new(
        directory: Arc<dyn DirectoryService>,
        p2p: Arc<dyn P2pControl>,
        cache: Arc<ConnectivityCache>,
        runner: TaskRunner,
        health: watch::Receiver<P2pStatus>,
        shared: Arc<SharedState>,
        config: &Config,
    ) -> Self {
        Self {
            directory,
            p2p,
            cache,
            allocator: swarmkeeper_p2p::InterfaceAllocator::new(),
            runner,
            health,
            shared,
            lxc_root: config.lxc_root.clone(),
            tick_interval: Duration::from_secs(config.tick_secs),
            backoff_interval: Duration::from_secs(config.backoff_secs),
            in_flight: JoinSet::new(),
        }
    }

    /// Run ticks until shutdown. The first tick waits `startup_delay` so the
    /// overlay daemon has a chance to settle after boot.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>, startup_delay: Duration) {
        tokio::select! {
            _ = shutdown.recv() => return,
            _ = tokio::time::sleep(startup_delay) => {}
        }
        loop {
            let delay = self.tick().await;
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        tracing::info!("reconciler stopped");
    }

    /// One reconciliation pass. Returns the delay before the next tick:
    /// the normal interval, or the backoff interval when the overlay daemon
    /// is unavailable or failed mid-tick.
    pub async fn tick(&mut self) -> Duration {
        let started = std::time::Instant::now();
        self.reap_completed();

        let status = *self.health.borrow();
        if status != P2pStatus::Running {
            tracing::info!(%status, "overlay daemon not operational; clearing connectivity facts");
            self.cache.clear_all();
            self.record_aborted_tick(status, None, started).await;
            return self.backoff_interval;
        }

        // Desired state first. A directory failure aborts the tick without
        // touching the cache: stale facts beat fabricated disconnection when
        // only the directory is unreachable.
        let desired = match self.directory.list_environments().await {
            Ok(desired) => desired,
            Err(err) => {
                tracing::warn!(error = %err, "directory fetch failed; keeping previous state");
                self.record_aborted_tick(status, Some(err.to_string()), started)
                    .await;
                return self.tick_interval;
            }
        };

        // Actual state. A daemon query failure after the health gate means
        // the daemon died mid-tick; go pessimistic.
        let (joined, bindings) = match tokio::try_join!(
            self.p2p.joined_swarms(),
            self.p2p.interface_bindings(),
        ) {
            Ok((joined, bindings)) => (joined, bindings),
            Err(err) => {
                tracing::warn!(error = %err, "overlay daemon query failed; clearing connectivity facts");
                self.cache.clear_all();
                self.record_aborted_tick(status, Some(err.to_string()), started)
                    .await;
                return self.backoff_interval;
            }
        };
        let joined: HashSet<SwarmHash> = joined.into_iter().collect();

        self.refresh_local_presence(&desired).await;

        self.allocator.assign_pass(&desired, &bindings);
        *self.shared.interface_ids.write().await = self.allocator.assignments().clone();

        let plan = plan::compute(&desired, &joined);

        // Ground-truth sweep before any operation is scheduled: every
        // desired environment's joined fact reflects the daemon's report,
        // and facts for departed environments are dropped.
        for env in &desired {
            self.cache
                .set_environment_joined(&env.hash, joined.contains(&env.hash));
        }
        let live_envs: HashSet<SwarmHash> = desired.iter().map(|e| e.hash.clone()).collect();
        let live_containers: HashSet<_> = desired
            .iter()
            .flat_map(|env| {
                env.containers
                    .iter()
                    .map(|c| (env.hash.clone(), c.id.clone()))
            })
            .collect();
        self.cache.prune(&live_envs, &live_containers);
        *self.shared.environments.write().await = desired.clone();

        let checks = self.schedule(&plan).await;
        self.record_tick(status, &plan, checks, started).await;
        self.tick_interval
    }

    /// Wait for every in-flight completion callback to finish.
    pub async fn quiesce(&mut self) {
        while self.in_flight.join_next().await.is_some() {}
    }

    fn reap_completed(&mut self) {
        while self.in_flight.try_join_next().is_some() {}
    }

    async fn refresh_local_presence(&self, desired: &[Environment]) {
        let root = self.lxc_root.clone();
        let hostnames = match tokio::task::spawn_blocking(move || {
            swarmkeeper_p2p::inventory::scan_local_hostnames(&root)
        })
        .await
        {
            Ok(hostnames) => hostnames,
            Err(err) => {
                tracing::warn!(error = %err, "local inventory scan panicked");
                Vec::new()
            }
        };
        let table = swarmkeeper_p2p::inventory::local_presence(desired, &hostnames);
        *self.shared.local_presence.write().await = table;
    }

    /// Enqueue the plan's operations on the serialized runner, spawning one
    /// completion callback per operation. Returns the number of container
    /// handshakes scheduled.
    async fn schedule(&mut self, plan: &plan::ReconcilePlan) -> usize {
        for env in &plan.join {
            let p2p = self.p2p.clone();
            let hash = env.hash.clone();
            let work = {
                let hash = hash.clone();
                async move { p2p.join(&hash).await }
            };
            let rx = match self.runner.submit(format!("join {hash}"), work).await {
                Ok(rx) => rx,
                Err(err) => {
                    tracing::warn!(error = %err, "cannot schedule swarm operations");
                    return 0;
                }
            };
            let cache = self.cache.clone();
            self.in_flight.spawn(async move {
                let Ok(outcome) = rx.await else { return };
                if outcome.success {
                    tracing::info!(%hash, "joined swarm");
                } else {
                    tracing::warn!(%hash, code = ?outcome.code, detail = %outcome.detail, "join failed");
                }
                cache.set_environment_joined(&hash, outcome.success);
            });
        }

        let mut checks = 0;
        for env in &plan.check {
            for container in &env.containers {
                let p2p = self.p2p.clone();
                let env_owned = env.clone();
                let container_owned = container.clone();
                let work = async move { p2p.handshake(&env_owned, &container_owned).await };
                let label = format!("handshake {}/{}", env.hash, container.id);
                let rx = match self.runner.submit(label, work).await {
                    Ok(rx) => rx,
                    Err(err) => {
                        tracing::warn!(error = %err, "cannot schedule swarm operations");
                        return checks;
                    }
                };
                checks += 1;
                let cache = self.cache.clone();
                let hash = env.hash.clone();
                let id = container.id.clone();
                self.in_flight.spawn(async move {
                    let Ok(outcome) = rx.await else { return };
                    if !outcome.success {
                        tracing::debug!(%hash, container = %id, detail = %outcome.detail, "handshake failed");
                    }
                    cache.set_container_reachable(&hash, &id, outcome.success);
                });
            }
        }

        for hash in &plan.leave {
            let p2p = self.p2p.clone();
            let hash = hash.clone();
            let work = {
                let hash = hash.clone();
                async move { p2p.leave(&hash).await }
            };
            let rx = match self.runner.submit(format!("leave {hash}"), work).await {
                Ok(rx) => rx,
                Err(err) => {
                    tracing::warn!(error = %err, "cannot schedule swarm operations");
                    return checks;
                }
            };
            let cache = self.cache.clone();
            self.in_flight.spawn(async move {
                let Ok(outcome) = rx.await else { return };
                if outcome.success {
                    tracing::info!(%hash, "left swarm");
                } else {
                    // The next tick re-reads the joined set and retries.
                    tracing::warn!(%hash, code = ?outcome.code, detail = %outcome.detail, "leave failed");
                }
                cache.set_environment_joined(&hash, false);
            });
        }
        checks
    }

    async fn record_tick(
        &self,
        status: P2pStatus,
        plan: &plan::ReconcilePlan,
        checks: usize,
        started: std::time::Instant,
    ) {
        let summary = TickSummary {
            at: Utc::now(),
            p2p_status: status,
            joins_scheduled: plan.join.len(),
            checks_scheduled: checks,
            leaves_scheduled: plan.leave.len(),
            duration_ms: started.elapsed().as_millis() as u64,
            error: None,
        };
        tracing::info!(
            joins = summary.joins_scheduled,
            checks = summary.checks_scheduled,
            leaves = summary.leaves_scheduled,
            duration_ms = summary.duration_ms,
            "reconciliation tick complete",
        );
        *self.shared.last_tick.write().await = Some(summary);
    }

    /// Ticks cut short by the health gate or a collaborator failure still
    /// land in `last_tick`; the causing branch has already logged.
    async fn record_aborted_tick(
        &self,
        status: P2pStatus,
        error: Option<String>,
        started: std::time::Instant,
    ) {
        *self.shared.last_tick.write().await = Some(TickSummary {
            at: Utc::now(),
            p2p_status: status,
            joins_scheduled: 0,
            checks_scheduled: 0,
            leaves_scheduled: 0,
            duration_ms: started.elapsed().as_millis() as u64,
            error,
        });
    }
}
