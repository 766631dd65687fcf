//! Segment-level failure taxonomy.

use thiserror::Error;

/// Why a single segment request produced no data.
///
/// Failures are values: the fetch strategies record them per segment and
/// keep going, they never abort sibling requests.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    #[error("Nacked: {0}")]
    Nack(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Request canceled")]
    Canceled,

    #[error("Data failed to validate: {0}")]
    ValidationFailed(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Segment count {count} exceeds limit {limit}")]
    TooManySegments { count: u64, limit: u64 },
}

impl FetchFailure {
    /// Short label for logs and stats.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchFailure::Nack(_) => "nack",
            FetchFailure::Timeout => "timeout",
            FetchFailure::Canceled => "canceled",
            FetchFailure::ValidationFailed(_) => "validation",
            FetchFailure::Transport(_) => "transport",
            FetchFailure::TooManySegments { .. } => "too-many-segments",
        }
    }
}
