//! The core façade a host application embeds: swarm downloads, mesh gossip,
//! and backfill probing wired into one long-lived [`Core`] object (spec
//! section 4.7).
//!
//! Every subsystem crate (`swarm`, `mesh`, `backfill`, `verification`,
//! `hashdb`) is consumed here, not reimplemented. `Core` owns the two seams
//! a host must supply: [`verification::TransferClient`] for downloads and
//! [`connector::MeshConnector`] for dialing gossip neighbors.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(clippy::unwrap_used)]

pub mod config;
pub mod connector;
mod core;
pub mod error;
mod mesh_stats;

pub use connector::{ConnectError, MeshConnector};
pub use core::{Core, JobStatus};
pub use error::Error;
pub use mesh_stats::Snapshot as MeshStatsSnapshot;
