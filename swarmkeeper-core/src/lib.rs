//! Swarmkeeper core library — domain types, configuration, errors.
//!
//! Public API surface:
//! - [`types`] — newtypes and domain structs for environments and containers
//! - [`config`] — `~/.swarmkeeper/config.yaml` load / save
//! - [`error`] — [`ConfigError`]

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::ConfigError;
pub use types::{Container, ContainerId, Environment, PeerId, SwarmHash};
