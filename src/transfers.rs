//! In-flight transfer bookkeeping
//!
//! The reassembly core never fetches bytes itself. It only asks "which files in
//! this directory are still being written?" through [`PendingTransfers`].
//! [`TransferTable`] is the in-memory implementation an embedding application
//! drives from its transfer mechanism.

use crate::classifier;
use crate::types::TransferId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Point-in-time view of the transfers that are still running
#[async_trait]
pub trait PendingTransfers: Send + Sync {
    /// File names of incomplete, non-cancelled transfers whose target lives
    /// directly in `dir` and already exists on disk
    async fn incomplete_in(&self, dir: &Path) -> Vec<String>;
}

/// Pending-transfer source that never reports anything in flight
///
/// Useful when fragments are dropped into the directory by an external tool
/// that only announces finished files.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoPendingTransfers;

#[async_trait]
impl PendingTransfers for NoPendingTransfers {
    async fn incomplete_in(&self, _dir: &Path) -> Vec<String> {
        Vec::new()
    }
}

/// One in-flight fetch
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingTransfer {
    /// Transfer identifier
    pub id: TransferId,
    /// Name of the file being written
    pub file_name: String,
    /// Where the bytes land
    pub target_path: PathBuf,
    /// Bytes written so far
    pub bytes_transferred: u64,
    /// Expected size, if known
    pub total_bytes: Option<u64>,
    /// Transfer finished writing
    pub complete: bool,
    /// Transfer was cancelled
    pub cancelled: bool,
}

impl PendingTransfer {
    /// Logical archive this transfer feeds, if its name is a fragment
    pub fn logical_id(&self) -> Option<String> {
        classifier::classify(&self.file_name).map(|d| d.logical_id)
    }

    /// Progress percentage, when the total size is known
    pub fn percent(&self) -> Option<f32> {
        match self.total_bytes {
            Some(0) | None => None,
            Some(total) => Some((self.bytes_transferred as f64 / total as f64 * 100.0) as f32),
        }
    }
}

/// Shared table of running transfers
///
/// Cheap to clone; every clone sees the same records. Records are created by
/// [`begin`](Self::begin) and dropped by [`finish`](Self::finish),
/// [`cancel`](Self::cancel) or [`fail`](Self::fail).
#[derive(Clone)]
pub struct TransferTable {
    entries: Arc<Mutex<HashMap<TransferId, Entry>>>,
    next_id: Arc<AtomicU64>,
}

struct Entry {
    transfer: PendingTransfer,
    cancel_token: CancellationToken,
}

impl TransferTable {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Register a new transfer
    ///
    /// Returns the transfer id and a token the transfer task should watch; it
    /// fires when the transfer is cancelled through [`cancel`](Self::cancel).
    pub async fn begin(
        &self,
        file_name: impl Into<String>,
        target_path: impl Into<PathBuf>,
        total_bytes: Option<u64>,
    ) -> (TransferId, CancellationToken) {
        let id = TransferId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let cancel_token = CancellationToken::new();
        let transfer = PendingTransfer {
            id,
            file_name: file_name.into(),
            target_path: target_path.into(),
            bytes_transferred: 0,
            total_bytes,
            complete: false,
            cancelled: false,
        };

        tracing::debug!(transfer_id = id.0, file = %transfer.file_name, "transfer started");
        self.entries.lock().await.insert(
            id,
            Entry {
                transfer,
                cancel_token: cancel_token.clone(),
            },
        );
        (id, cancel_token)
    }

    /// Update the byte counter of a running transfer
    ///
    /// Returns `false` when the transfer is unknown.
    pub async fn record_progress(&self, id: TransferId, bytes_transferred: u64) -> bool {
        match self.entries.lock().await.get_mut(&id) {
            Some(entry) => {
                entry.transfer.bytes_transferred = bytes_transferred;
                true
            }
            None => false,
        }
    }

    /// Mark a transfer complete and drop its record
    pub async fn finish(&self, id: TransferId) -> Option<PendingTransfer> {
        let mut entry = self.entries.lock().await.remove(&id)?;
        entry.transfer.complete = true;
        if let Some(total) = entry.transfer.total_bytes {
            entry.transfer.bytes_transferred = total;
        }
        tracing::debug!(transfer_id = id.0, file = %entry.transfer.file_name, "transfer finished");
        Some(entry.transfer)
    }

    /// Cancel a transfer, drop its record and delete the partial file
    ///
    /// Returns the cancelled record, or `None` when the transfer is unknown.
    pub async fn cancel(&self, id: TransferId) -> Option<PendingTransfer> {
        let mut entry = self.entries.lock().await.remove(&id)?;
        entry.cancel_token.cancel();
        entry.transfer.cancelled = true;

        let path = &entry.transfer.target_path;
        match tokio::fs::remove_file(path).await {
            Ok(()) => tracing::debug!(transfer_id = id.0, ?path, "removed partial file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(
                    transfer_id = id.0,
                    ?path,
                    error = %e,
                    "failed to delete partial file of cancelled transfer"
                );
            }
        }

        tracing::info!(transfer_id = id.0, file = %entry.transfer.file_name, "transfer cancelled");
        Some(entry.transfer)
    }

    /// Drop the record of a transfer that failed
    ///
    /// The partial file is left for the caller to inspect or retry.
    pub async fn fail(&self, id: TransferId) -> Option<PendingTransfer> {
        let entry = self.entries.lock().await.remove(&id)?;
        tracing::warn!(transfer_id = id.0, file = %entry.transfer.file_name, "transfer failed");
        Some(entry.transfer)
    }

    /// Copy of every running transfer, ordered by id
    pub async fn snapshot(&self) -> Vec<PendingTransfer> {
        let mut transfers: Vec<PendingTransfer> = self
            .entries
            .lock()
            .await
            .values()
            .map(|entry| entry.transfer.clone())
            .collect();
        transfers.sort_by_key(|t| t.id);
        transfers
    }

    /// Number of running transfers
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether no transfer is running
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

impl Default for TransferTable {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PendingTransfers for TransferTable {
    /// Directories are compared after resolving both sides, so a relative or
    /// symlinked download directory still matches absolute transfer targets.
    async fn incomplete_in(&self, dir: &Path) -> Vec<String> {
        let dir = match tokio::fs::canonicalize(dir).await {
            Ok(resolved) => resolved,
            Err(e) => {
                tracing::debug!(?dir, error = %e, "cannot resolve directory, comparing as given");
                dir.to_path_buf()
            }
        };

        let mut names = Vec::new();
        for transfer in self.snapshot().await {
            if transfer.complete || transfer.cancelled {
                continue;
            }
            // Fails when the target does not exist yet; such a transfer cannot
            // be confused with a fragment on disk
            let Ok(target) = tokio::fs::canonicalize(&transfer.target_path).await else {
                continue;
            };
            if target.parent() == Some(dir.as_path()) {
                names.push(transfer.file_name);
            }
        }
        names
    }
}
