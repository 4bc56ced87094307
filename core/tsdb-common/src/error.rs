//! Error types for the TSDB2 common layer.
//!
//! Public APIs that can fail return `CommonResult<T>`. Looking up a handle that
//! no longer exists is not an error: those operations return `bool`.

use thiserror::Error;

/// Unified error type for common-layer operations.
#[derive(Debug, Error)]
pub enum CommonError {
    /// Invalid construction-time configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The scheduler or periodic thread stopped while the caller was waiting on it
    #[error("cancelled: the component is stopping or stopped")]
    Cancelled,

    /// The OS refused to spawn a worker thread
    #[error("failed to spawn worker thread: {source}")]
    ThreadSpawn {
        #[from]
        source: std::io::Error,
    },

    /// Every worker thread is gone while tasks are still queued
    #[error("no live worker thread is left to run queued tasks")]
    NoLiveWorkers,

    /// Configuration parsing error
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for common-layer operations.
pub type CommonResult<T> = Result<T, CommonError>;

impl From<serde_json::Error> for CommonError {
    fn from(err: serde_json::Error) -> Self {
        CommonError::Serialization(err.to_string())
    }
}
