//! Fragment inventory for one logical archive
//!
//! Scans the flat download directory for every fragment of a logical archive
//! and cross-references the pending-transfer snapshot. Descriptors are
//! recomputed from file names on every scan; nothing is cached.

use crate::classifier;
use crate::error::Result;
use crate::transfers::PendingTransfers;
use crate::types::Fragment;
use std::collections::{BTreeSet, HashSet};
use std::path::Path;

/// What is known about one logical archive at a point in time
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Inventory {
    /// Fragments present on disk, ascending by ordinal
    pub on_disk: Vec<Fragment>,
    /// Names of fragments still being written
    pub pending: BTreeSet<String>,
}

impl Inventory {
    /// Sum of the on-disk fragment sizes
    pub fn total_bytes(&self) -> u64 {
        self.on_disk.iter().map(|f| f.size).sum()
    }
}

/// Collect the fragments of `logical_id` found directly under `dir`
///
/// Entries whose metadata cannot be read or whose names are not UTF-8 are
/// skipped. Only failing to open the directory itself is an error.
pub async fn scan(
    dir: &Path,
    logical_id: &str,
    transfers: &dyn PendingTransfers,
) -> Result<Inventory> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut seen = HashSet::new();
    let mut on_disk = Vec::new();

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(?dir, error = %e, "directory listing ended early");
                break;
            }
        };

        let path = entry.path();
        let Some(file_name) = entry.file_name().to_str().map(str::to_string) else {
            tracing::debug!(?path, "skipping non UTF-8 file name");
            continue;
        };

        let Some(descriptor) = classifier::classify(&file_name) else {
            continue;
        };
        if descriptor.logical_id != logical_id {
            continue;
        }

        let metadata = match entry.metadata().await {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::warn!(?path, error = %e, "skipping unreadable fragment");
                continue;
            }
        };
        if !metadata.is_file() {
            continue;
        }

        if seen.insert(path.clone()) {
            on_disk.push(Fragment {
                ordinal: descriptor.ordinal,
                file_name,
                path,
                size: metadata.len(),
            });
        }
    }

    // Stable: duplicate ordinals keep encounter order
    on_disk.sort_by_key(|f| f.ordinal);

    let pending: BTreeSet<String> = transfers
        .incomplete_in(dir)
        .await
        .into_iter()
        .filter(|name| {
            classifier::classify(name).is_some_and(|d| d.logical_id == logical_id)
        })
        .collect();

    tracing::debug!(
        logical_id,
        on_disk = on_disk.len(),
        pending = pending.len(),
        "scanned fragment inventory"
    );

    Ok(Inventory { on_disk, pending })
}
