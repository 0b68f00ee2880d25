//! Rate-limited scheduler that opportunistically probes peers to populate
//! missing fingerprints (spec section 4.6).
//!
//! [`scheduler::run_loop`] ticks on `config.interval`, skipping a cycle when
//! [`ActivityTracker`] reports the system hasn't been idle of user-initiated
//! transfers long enough; otherwise [`cycle::run_cycle`] claims up to
//! `candidates_per_cycle` inventory rows and probes each candidate's owning
//! peer directly via `verification::verify`.

mod activity;
mod config;
mod cycle;
mod error;
mod scheduler;
mod stats;

pub use activity::ActivityTracker;
pub use config::BackfillConfig;
pub use cycle::run_cycle;
pub use error::{Error, Result};
pub use scheduler::run_loop;
pub use stats::{BackfillStats, Snapshot};
