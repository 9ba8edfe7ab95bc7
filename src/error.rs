//! Error types for voxpipe.
//!
//! Only `Startup` is fatal: it aborts the process before the pipeline
//! reaches `Ready`. Every other variant is local to one chunk or span and
//! is reported as an error event while the pipeline continues.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoxpipeError {
    // Wire protocol errors
    #[error("Framing error: {message}")]
    Framing { message: String },

    #[error("Invalid chunk: {message}")]
    Validation { message: String },

    // Backpressure
    #[error("Work queue full, dropped span {sequence_id}")]
    QueueFull { sequence_id: u64 },

    // Recognition errors
    #[error("Recognition failed for span {sequence_id}: {message}")]
    Processing { sequence_id: u64, message: String },

    #[error("Startup error: {message}")]
    Startup { message: String },

    // Configuration errors
    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl VoxpipeError {
    /// Returns true when the error must abort the process rather than be
    /// reported and skipped.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            VoxpipeError::Startup { .. }
                | VoxpipeError::Config(_)
                | VoxpipeError::ConfigInvalidValue { .. }
        )
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, VoxpipeError>;
