//! # spasy-sync
//!
//! Reconciliation and coordination for Spatial Sync.
//!
//! This crate provides:
//! - Staleness checks, log replay and full-state adoption between trees
//! - The name shapes peers use to publish and request state
//! - `SyncCoordinator`, which publishes every local mutation and reacts to
//!   peer notifications
//!
//! ## Architecture
//!
//! Peers exchange root hashes in notification names. A peer whose hash
//! differs pulls the advertised update log and replays what it has not
//! seen. When the gap is wider than the log window, replay cannot converge
//! and the peer fetches the full tree instead.

mod config;
mod coordinator;
mod error;
mod names;
pub mod reconcile;
mod stats;

pub use config::{SyncConfig, SyncConfigBuilder};
pub use coordinator::{MutationPhase, MutationReport, NotificationOutcome, SyncCoordinator};
pub use error::{NameError, Result, SyncError};
pub use names::{Notification, SyncNames};
pub use reconcile::{
    adopt_full_state, adopt_keeping_local, apply_remote_log, is_newer, Reconciliation,
};
pub use stats::{Stats, Timer};
