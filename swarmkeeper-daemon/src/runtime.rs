use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, watch};

use swarmkeeper_core::Config;
use swarmkeeper_p2p::DaemonCli;

use crate::cache::ConnectivityCache;
use crate::directory::{DirectoryService, FileDirectory};
use crate::error::{io_err, DaemonError};
use crate::health::{HealthMonitor, P2pStatus};
use crate::paths::{
    directory_snapshot_path, run_dir, socket_path, swarmkeeper_root, STARTUP_DELAY,
    TASK_QUEUE_DEPTH,
};
use crate::protocol::{ContainerReadiness, DaemonRequest, DaemonResponse, ReadinessReport};
use crate::reconciler::{Reconciler, SharedState};
use crate::runner::TaskRunner;

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf()))
}

/// Run the daemon runtime.
pub async fn run(home: PathBuf) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;
    let config = Config::load_at(&home)?;
    let started_at_unix = unix_seconds_now();

    let p2p = Arc::new(DaemonCli::new(&config.p2p_path));
    let snapshot = config
        .directory_path
        .clone()
        .unwrap_or_else(|| directory_snapshot_path(&home));
    let directory: Arc<dyn DirectoryService> = Arc::new(FileDirectory::new(snapshot));

    let cache = Arc::new(ConnectivityCache::new());
    let shared = Arc::new(SharedState::default());

    let (runner, runner_worker) = TaskRunner::start(TASK_QUEUE_DEPTH);
    let (monitor, health_rx) = HealthMonitor::new(
        p2p.clone(),
        Duration::from_secs(config.health_idle_secs),
        Duration::from_secs(config.health_running_secs),
    );
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let monitor_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            monitor.run(shutdown.subscribe()).await;
            let _ = shutdown.send(());
            Ok(())
        })
    };

    let reconciler_handle = {
        let shutdown = shutdown_tx.clone();
        let reconciler = Reconciler::new(
            directory,
            p2p,
            cache.clone(),
            runner,
            health_rx.clone(),
            shared.clone(),
            &config,
        );
        tokio::spawn(async move {
            reconciler.run(shutdown.subscribe(), STARTUP_DELAY).await;
            let _ = shutdown.send(());
            Ok(())
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        let cache = cache.clone();
        let shared = shared.clone();
        let health_rx = health_rx.clone();
        tokio::spawn(async move {
            let result = socket_server_task(
                home,
                cache,
                shared,
                health_rx,
                shutdown.clone(),
                shutdown.subscribe(),
                started_at_unix,
            )
            .await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (monitor_result, reconciler_result, socket_result, signal_result) = tokio::join!(
        monitor_handle,
        reconciler_handle,
        socket_handle,
        signal_handle
    );

    handle_join("health_monitor", monitor_result)?;
    handle_join("reconciler", reconciler_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;

    // The worker drains once every runner handle is gone.
    if let Err(err) = runner_worker.await {
        tracing::warn!(error = %err, "swarm operation worker join failure");
    }
    Ok(())
}

async fn socket_server_task(
    home: PathBuf,
    cache: Arc<ConnectivityCache>,
    shared: Arc<SharedState>,
    health_rx: watch::Receiver<P2pStatus>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    let run = run_dir(&home);
    if !run.exists() {
        fs::create_dir_all(&run).map_err(|e| io_err(&run, e))?;
    }

    let socket = socket_path(&home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let home = home.clone();
                let cache = cache.clone();
                let shared = shared.clone();
                let health_rx = health_rx.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(
                        stream,
                        home,
                        cache,
                        shared,
                        health_rx,
                        shutdown_tx,
                        started_at_unix,
                    ).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    home: PathBuf,
    cache: Arc<ConnectivityCache>,
    shared: Arc<SharedState>,
    health_rx: watch::Receiver<P2pStatus>,
    shutdown_tx: broadcast::Sender<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request: Result<DaemonRequest, _> = serde_json::from_str(&line);
        let request = match request {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let stopping = matches!(request, DaemonRequest::Stop);
        let response = match request {
            DaemonRequest::Status => {
                let payload =
                    build_status_payload(&home, &cache, &shared, &health_rx, started_at_unix)
                        .await;
                DaemonResponse::ok(payload)
            }
            DaemonRequest::Readiness { environment } => {
                match build_readiness_report(&cache, &shared, &environment).await {
                    Some(report) => DaemonResponse::ok(serde_json::to_value(report)?),
                    None => {
                        DaemonResponse::error(format!("unknown environment '{environment}'"))
                    }
                }
            }
            DaemonRequest::Stop => {
                let _ = shutdown_tx.send(());
                DaemonResponse::ok(json!({ "stopping": true }))
            }
        };

        write_response(&mut writer, &response).await?;
        if stopping {
            break;
        }
    }

    Ok(())
}

async fn build_status_payload(
    home: &Path,
    cache: &ConnectivityCache,
    shared: &SharedState,
    health_rx: &watch::Receiver<P2pStatus>,
    started_at_unix: u64,
) -> Value {
    let p2p_status = *health_rx.borrow();

    // Snapshot each lock in turn; none is held across JSON assembly.
    let environments = shared.environments.read().await.clone();
    let interface_ids = shared.interface_ids.read().await.clone();
    let local_presence = shared.local_presence.read().await.clone();
    let last_tick = shared.last_tick.read().await.clone();

    let environments: Vec<Value> = environments
        .iter()
        .map(|env| {
            let containers: Vec<Value> = env
                .containers
                .iter()
                .map(|c| {
                    json!({
                        "id": &c.id,
                        "name": &c.name,
                        "peer_id": &c.peer_id,
                        "reachable": cache.is_container_reachable(&env.hash, &c.id),
                        "present_locally": local_presence.get(&c.peer_id).copied().unwrap_or(false),
                        "readiness": cache.readiness(&env.hash, &c.id),
                    })
                })
                .collect();
            json!({
                "name": &env.name,
                "hash": &env.hash,
                "healthy": env.healthy,
                "joined": cache.is_environment_joined(&env.hash),
                "interface_id": interface_ids.get(&env.hash),
                "containers": containers,
            })
        })
        .collect();

    json!({
        "running": true,
        "p2p_status": p2p_status,
        "started_at_unix": started_at_unix,
        "last_tick": last_tick,
        "environments": environments,
        "socket": socket_path(home).display().to_string(),
    })
}

/// `None` when the directory has never declared `name`.
async fn build_readiness_report(
    cache: &ConnectivityCache,
    shared: &SharedState,
    name: &str,
) -> Option<ReadinessReport> {
    let environments = shared.environments.read().await;
    let env = environments.iter().find(|env| env.name == name)?;

    Some(ReadinessReport {
        environment: env.name.clone(),
        hash: env.hash.0.clone(),
        joined: cache.is_environment_joined(&env.hash),
        containers: env
            .containers
            .iter()
            .map(|c| ContainerReadiness {
                id: c.id.clone(),
                name: c.name.clone(),
                readiness: cache.readiness(&env.hash, &c.id),
            })
            .collect(),
    })
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    let root = swarmkeeper_root(home);
    if !root.exists() {
        fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;
    }
    let run = run_dir(home);
    if !run.exists() {
        fs::create_dir_all(&run).map_err(|e| io_err(&run, e))?;
    }
    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}
