//! Core types for partjoin

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Unique identifier for an in-flight transfer
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferId(pub u64);

impl TransferId {
    /// Create a new TransferId
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for TransferId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for TransferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Best-effort guess at the archive format a set of fragments belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerHint {
    /// RAR archive (`.rar` anywhere in the name)
    Rar,
    /// ZIP archive (`.zip` anywhere in the name)
    Zip,
    /// 7-Zip archive (`.7z` anywhere in the name)
    #[serde(rename = "7z")]
    SevenZip,
    /// Generic "z" split token (`.z01`, `.z02`, ...)
    #[serde(rename = "z")]
    ZSplit,
    /// Bare three-digit numeric suffix (`.001`)
    Numbered,
    /// Matched a fragment pattern but nothing hints at the format
    Unknown,
}

impl ContainerHint {
    /// Output extension implied by the hint alone, if any
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            ContainerHint::Rar => Some("rar"),
            ContainerHint::Zip => Some("zip"),
            ContainerHint::SevenZip => Some("7z"),
            ContainerHint::ZSplit | ContainerHint::Numbered | ContainerHint::Unknown => None,
        }
    }

    /// Whether the format can locate sibling volumes by itself
    pub fn supports_volumes(&self) -> bool {
        matches!(self, ContainerHint::Rar | ContainerHint::SevenZip)
    }
}

impl std::fmt::Display for ContainerHint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ContainerHint::Rar => "rar",
            ContainerHint::Zip => "zip",
            ContainerHint::SevenZip => "7z",
            ContainerHint::ZSplit => "z",
            ContainerHint::Numbered => "numbered",
            ContainerHint::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// What a file name says about the fragment it names
///
/// Derived from the name alone and recomputed whenever needed; the filesystem
/// stays the source of truth.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentDescriptor {
    /// Shared base identifier of the logical archive
    pub logical_id: String,
    /// Position of the fragment within its archive
    pub ordinal: u32,
    /// Format guess
    pub container: ContainerHint,
    /// Whether this looks like the canonical first fragment of the set
    pub is_canonical_first: bool,
    /// The classified file name
    pub file_name: String,
}

/// A fragment found on disk by the scanner
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    /// Position of the fragment within its archive
    pub ordinal: u32,
    /// File name within the download directory
    pub file_name: String,
    /// Full path of the fragment
    pub path: PathBuf,
    /// Size in bytes at scan time
    pub size: u64,
}

/// Reassembly strategy chosen for a job
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinMode {
    /// Only the first volume is copied; the format's extractor finds the rest
    VolumeCopy,
    /// Fragment bytes are physically joined in ordinal order
    Concatenate,
}

/// Progress report for a running join
#[derive(Clone, Debug, PartialEq)]
pub struct JoinProgress {
    /// Logical archive being joined
    pub logical_id: String,
    /// Progress percentage (0.0 to 100.0)
    pub percent: f32,
    /// Number of fragments in the job
    pub fragment_count: usize,
    /// Time since the join started
    pub elapsed: Duration,
}

/// Terminal outcome of a join, reported exactly once per job
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JoinOutcome {
    /// Logical archive that was joined
    pub logical_id: String,
    /// Whether the join finished (a size mismatch still counts as finished)
    pub success: bool,
    /// Output file path
    pub output_path: PathBuf,
    /// Output size on disk after the join (0 when unknown)
    pub actual_size: u64,
    /// Sum of the fragment sizes
    pub expected_size: u64,
    /// Output size differs from the sum of fragment sizes
    pub size_mismatch: bool,
    /// The job was stopped by cancellation
    pub cancelled: bool,
    /// Error message for failed joins
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Event emitted by the coordinator
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A fragment finished transferring and was handed to the coordinator
    FragmentCompleted {
        /// Logical archive the fragment belongs to
        logical_id: String,
        /// Fragment file name
        file_name: String,
    },

    /// A join started
    JoinStarted {
        /// Logical archive being joined
        logical_id: String,
        /// Number of fragments in the job
        fragment_count: usize,
    },

    /// Join progress update
    JoinProgress {
        /// Logical archive being joined
        logical_id: String,
        /// Progress percentage (0.0 to 100.0)
        percent: f32,
        /// Number of fragments in the job
        fragment_count: usize,
        /// Seconds since the join started
        elapsed_secs: u64,
    },

    /// Join finished
    JoinComplete {
        /// Logical archive that was joined
        logical_id: String,
        /// Output file path
        output_path: PathBuf,
        /// Output size on disk
        actual_size: u64,
        /// Sum of the fragment sizes
        expected_size: u64,
        /// Output size differs from the expected size
        size_mismatch: bool,
    },

    /// Join failed or was cancelled
    JoinFailed {
        /// Logical archive that failed
        logical_id: String,
        /// Output file path
        output_path: PathBuf,
        /// Error message
        error: String,
        /// The job was stopped by cancellation
        cancelled: bool,
    },

    /// A webhook could not be delivered
    WebhookFailed {
        /// Webhook URL
        url: String,
        /// Error message
        error: String,
    },

    /// Coordinator shut down
    Shutdown,
}

/// JSON body POSTed to webhooks
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WebhookPayload {
    /// Event type (complete, failed)
    pub event: String,

    /// Logical archive identifier
    pub logical_id: String,

    /// Output file path
    pub output_path: PathBuf,

    /// Output size on disk
    pub actual_size: u64,

    /// Sum of the fragment sizes
    pub expected_size: u64,

    /// Output size differs from the expected size
    pub size_mismatch: bool,

    /// Error message (for failed joins)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Timestamp of the event (Unix timestamp in seconds)
    pub timestamp: i64,
}
