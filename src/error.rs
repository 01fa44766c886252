//! # Renderer Error Types
//!
//! All errors that can surface from the section renderer. Per-section job
//! failures are carried inside [`crate::task_management::job_result::ChunkJobResult`]
//! and never abort a batch; GPU allocation failures are fatal and propagate to
//! the frame orchestrator.

use thiserror::Error;

/// Errors that can occur while building, uploading or drawing sections.
#[derive(Error, Debug)]
pub enum RenderError {
    /// A background build or sort task returned an error.
    #[error("chunk job failed for section {section:?}: {message}")]
    JobExecutionFailure {
        /// Section coordinates of the failed job.
        section: [i32; 3],
        /// Description of the failure.
        message: String,
    },

    /// A GPU buffer could not be allocated.
    #[error("out of GPU memory: failed to allocate {requested} bytes for '{label}'")]
    ResourceExhaustion {
        /// Debug label of the buffer being allocated.
        label: String,
        /// Size of the failed allocation in bytes.
        requested: u64,
    },

    /// The device lacks a capability the renderer cannot work without.
    #[error("device does not support {0}")]
    Unsupported(&'static str),

    /// The device rejected an operation, e.g. a buffer map failed.
    #[error("device error: {0}")]
    Device(String),

    /// Invalid renderer configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failed to read a configuration file.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Failed to parse a configuration file.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result type for renderer operations.
pub type RenderResult<T> = Result<T, RenderError>;
