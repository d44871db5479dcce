//! # swarmkeeper-p2p
//!
//! Control surface for the overlay-network daemon, plus the pieces that
//! interpret its textual output: swarm/interface parsing, the per-process
//! interface allocator, and the local container inventory scan.
//!
//! The daemon is driven exclusively through its command line; this crate
//! never speaks the overlay protocol itself.

pub mod error;
pub mod gateway;
pub mod ifalloc;
pub mod inventory;
pub mod parse;

pub use error::P2pError;
pub use gateway::{CommandOutcome, DaemonCli, InterfaceBinding, P2pControl};
pub use ifalloc::InterfaceAllocator;
