//! Epidemic gossip of content fingerprints between peers (spec section 4.5).
//!
//! [`run_initiator`]/[`run_responder`] exchange deltas with one neighbor over
//! any transport implementing [`MeshTransport`]; [`MeshScheduler`] rate-limits
//! how often sessions are started, and [`PeerViolations`] tracks misbehaving
//! neighbors so callers can stop syncing with them.

mod config;
mod error;
mod neighbor;
mod scheduler;
mod session;
mod transport;
mod violations;
mod wire;

pub use config::{MeshConfig, PROTOCOL_VERSION};
pub use error::{Error, Result};
pub use neighbor::NeighborId;
pub use scheduler::MeshScheduler;
pub use session::{request_key, run_initiator, run_responder, SessionReport};
pub use transport::MeshTransport;
pub use violations::{PeerViolations, VIOLATION_THRESHOLD};
pub use wire::{DeltaEntry, Message, MAX_FRAME_BYTES};
