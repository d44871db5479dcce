//! Swarmkeeper daemon runtime: reconciliation loop + health monitor + socket server.

pub mod cache;
pub mod directory;
mod error;
pub mod health;
pub mod paths;
pub mod plan;
pub mod protocol;
pub mod reconciler;
pub mod runner;
mod runtime;

pub use cache::{ConnectivityCache, Readiness};
pub use directory::{DirectoryError, DirectoryService, FileDirectory};
pub use error::DaemonError;
pub use health::{HealthMonitor, P2pStatus};
pub use protocol::{
    request_readiness, request_status, request_stop, send_request, ContainerReadiness,
    DaemonRequest, DaemonResponse, ReadinessReport,
};
pub use reconciler::{Reconciler, SharedState, TickSummary};
pub use runner::TaskRunner;
pub use runtime::{run, start_blocking};
