//! Error types for the quadtree.

use thiserror::Error;

/// Structural rejections. None of these mutate the tree.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("Malformed item name: {0}")]
    MalformedName(String),

    #[error("Location code {code} does not belong under root {root}")]
    OutsideRoot { code: String, root: String },

    #[error("Location code {code} has length {actual}, expected {expected}")]
    WrongCodeLength {
        code: String,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid location code character in {0}")]
    InvalidCode(String),

    #[error("Invalid root hash: {0}")]
    InvalidHash(String),

    #[error("Corrupt tree: {0}")]
    Corrupt(String),
}

/// Errors raised while encoding or decoding tree snapshots.
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u8, actual: u8 },

    #[error("Invalid snapshot data: {0}")]
    InvalidData(String),
}

impl From<serde_json::Error> for SnapshotError {
    fn from(err: serde_json::Error) -> Self {
        SnapshotError::SerializationError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TreeError>;
