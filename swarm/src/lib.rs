//! Multi-source chunked swarm download: chunk planning, dispatch across
//! heterogeneous peers, slow-peer cycling, proven-source retry rounds,
//! assembly, and final hash verification (spec section 4.3).
//!
//! [`job::SwarmJob`] is the entry point. It takes an ordered list of peers
//! already agreed (by `ContentVerification`, in the `verification` crate) to
//! hold the same content, and turns that into bytes on disk.

mod assemble;
pub mod config;
pub mod error;
mod job;
mod plan;
mod progress;
mod queue;
mod throughput_writer;
mod worker;

pub use config::SwarmConfig;
pub use error::Error;
pub use job::{JobOutcome, JobState, MultiSourceDownloadRequest, SwarmJob};
pub use plan::{plan, Chunk};
pub use progress::{Progress, Snapshot};
