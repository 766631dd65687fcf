//! Error types for the sync layer.

use spasy_transport::FetchFailure;
use spasy_tree::{SnapshotError, TreeError};
use thiserror::Error;

/// A name that does not have the shape of a sync name.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NameError {
    #[error("Name {0} is not under the application prefix")]
    WrongPrefix(String),

    #[error("Name {name} has {actual} components after the prefix, expected {expected}")]
    WrongShape {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("Name {0} is not a notification")]
    NotNotification(String),

    #[error("Unknown action: {0}")]
    InvalidAction(String),

    #[error("Invalid root hash: {0}")]
    InvalidHash(String),

    #[error("Invalid segment count: {0}")]
    InvalidCount(String),
}

/// Error type for coordinator operations.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("Name error: {0}")]
    Name(#[from] NameError),

    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchFailure),

    #[error("Zone not tracked: {0}")]
    UntrackedZone(String),

    #[error("Invalid zone: {0:?}")]
    InvalidZone(String),

    #[error("Notification addressed to {route}, this node is {node}")]
    Misrouted { route: String, node: String },

    #[error("Incomplete fetch of {name}: {received} of {expected:?} segments")]
    Incomplete {
        name: String,
        received: u64,
        expected: Option<u64>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
