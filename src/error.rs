//! Error types for partjoin
//!
//! This module provides the error taxonomy for the library:
//! - A top-level [`Error`] used by every fallible operation
//! - [`JoinError`] for failures that abort a single reassembly job
//! - Machine-readable error codes for notification payloads
//!
//! Classification misses and pending fragments are not errors: the classifier
//! returns `None` and the gate returns a `Wait` decision. Only failures that end
//! a reassembly job (or a configuration/IO problem outside of one) surface here.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for partjoin operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for partjoin
///
/// Each variant includes enough context to diagnose the failure from a log line
/// or an outcome notification alone.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "chunk_size")
        key: Option<String>,
    },

    /// I/O error outside of a reassembly job (directory creation, config file read)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Reassembly job failure
    #[error("join error: {0}")]
    Join(#[from] JoinError),

    /// Network error (webhook delivery)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Insufficient disk space to write the joined output
    #[error("insufficient disk space: need {required} bytes, have {available} bytes")]
    InsufficientSpace {
        /// Number of bytes required for the operation
        required: u64,
        /// Number of bytes currently available on disk
        available: u64,
    },

    /// Failed to check disk space
    #[error("failed to check disk space: {0}")]
    DiskSpaceCheckFailed(String),

    /// A notification sink failed to deliver a message
    #[error("notification sink error: {0}")]
    Sink(String),

    /// Shutdown in progress - no new work is started
    #[error("shutdown in progress: not accepting new work")]
    ShuttingDown,
}

/// Errors that abort a single reassembly job
///
/// None of these mark the logical archive as completed, so a later trigger may
/// attempt the join again.
#[derive(Debug, Error)]
pub enum JoinError {
    /// A fragment could not be opened or read
    #[error("cannot read fragment {path}: {reason}")]
    FragmentUnreadable {
        /// Path of the fragment that failed
        path: PathBuf,
        /// The underlying failure
        reason: String,
    },

    /// The output file could not be created or written
    #[error("cannot write output {path}: {reason}")]
    OutputFailed {
        /// Path of the output file
        path: PathBuf,
        /// The underlying failure
        reason: String,
    },

    /// Volume-copy mode was selected but no first volume is part of the job
    #[error("first volume of {logical_id} not found")]
    FirstVolumeMissing {
        /// The logical archive identifier
        logical_id: String,
    },

    /// The job was cancelled before it finished writing
    #[error("join of {logical_id} was cancelled")]
    Cancelled {
        /// The logical archive identifier
        logical_id: String,
    },

    /// The job carried no fragments
    #[error("no fragments to join for {logical_id}")]
    EmptyJob {
        /// The logical archive identifier
        logical_id: String,
    },
}

impl Error {
    /// Machine-readable error code, used in outcome notifications
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Io(_) => "io_error",
            Error::Join(e) => match e {
                JoinError::FragmentUnreadable { .. } => "fragment_unreadable",
                JoinError::OutputFailed { .. } => "output_failed",
                JoinError::FirstVolumeMissing { .. } => "first_volume_missing",
                JoinError::Cancelled { .. } => "cancelled",
                JoinError::EmptyJob { .. } => "empty_job",
            },
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::InsufficientSpace { .. } => "insufficient_space",
            Error::DiskSpaceCheckFailed(_) => "disk_space_check_failed",
            Error::Sink(_) => "sink_error",
            Error::ShuttingDown => "shutting_down",
        }
    }

    /// Whether this error represents a cooperative cancellation rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Join(JoinError::Cancelled { .. }))
    }

    /// Shorthand for a configuration error on a specific key
    pub(crate) fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}
