//! Error types for tiled-matmul operations

use thiserror::Error;

/// Result type for tiled-matmul operations
pub type Result<T> = std::result::Result<T, MatmulError>;

/// Errors that can occur while preparing, running or checking a benchmark
#[derive(Debug, Error)]
pub enum MatmulError {
    /// Invalid input (bad dimensions, bad configuration)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Size mismatch between operands
    #[error("Size mismatch: expected {expected}, got {actual}")]
    SizeMismatch {
        /// Expected size
        expected: usize,
        /// Actual size
        actual: usize,
    },

    /// No GPU adapter could be enumerated
    #[error("No GPU adapter found")]
    NoAdapter,

    /// Device/queue creation failed
    #[error("Unable to create device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),

    /// Shader module or pipeline failed validation
    #[error("Error building program: {0}")]
    ShaderBuild(String),

    /// Uploading, dispatching or copying failed on the device
    #[error("GPU dispatch failed: {0}")]
    Dispatch(String),

    /// Mapping a buffer back to the host failed
    #[error("Buffer mapping failed: {0}")]
    BufferMap(String),

    /// No work-group layout fits the problem on this device
    #[error("Work-group plan rejected: {0}")]
    WorkgroupPlan(String),

    /// A clock reported an end before its start
    #[error("Inconsistent timing: end {end} precedes start {start}")]
    Timing {
        /// Start timestamp in nanoseconds
        start: u64,
        /// End timestamp in nanoseconds
        end: u64,
    },

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
