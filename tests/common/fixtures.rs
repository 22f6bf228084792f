//! Fragment fixtures and a simulated transfer channel

use partjoin::{TransferId, TransferTable};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Deterministic pseudo-random content of `len` bytes
pub fn pattern_bytes(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u32).wrapping_mul(31).wrapping_add(seed as u32) as u8)
        .collect()
}

/// Split `data` into `count` contiguous pieces (the last one takes the remainder)
pub fn split_into(data: &[u8], count: usize) -> Vec<Vec<u8>> {
    let piece = data.len().div_ceil(count);
    data.chunks(piece.max(1)).map(<[u8]>::to_vec).collect()
}

/// Write a finished fragment straight to disk
pub fn write_fragment(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap_or_else(|e| panic!("write {name}: {e}"));
    path
}

/// Register transfers for every name and create their (empty) target files
///
/// Models a downloader that queued the whole set before any fragment finished.
pub async fn begin_transfers(
    transfers: &TransferTable,
    dir: &Path,
    names: &[&str],
) -> Vec<(TransferId, PathBuf)> {
    let mut started = Vec::with_capacity(names.len());
    for name in names {
        let path = dir.join(name);
        std::fs::write(&path, b"").unwrap_or_else(|e| panic!("create {name}: {e}"));
        let (id, _cancel) = transfers.begin(*name, &path, None).await;
        started.push((id, path));
    }
    started
}

/// Simulate a transfer: register it, write the bytes in a few steps, then finish it
///
/// Returns the target path. The transfer is pending while the bytes are being written.
pub async fn transfer_fragment(
    transfers: &TransferTable,
    dir: &Path,
    name: &str,
    bytes: &[u8],
) -> PathBuf {
    let path = dir.join(name);
    let (id, _cancel) = transfers
        .begin(name, &path, Some(bytes.len() as u64))
        .await;
    complete_transfer(transfers, id, &path, bytes).await;
    path
}

/// Write `bytes` to an already registered transfer in a few steps, then finish it
pub async fn complete_transfer(transfers: &TransferTable, id: TransferId, path: &Path, bytes: &[u8]) {
    let name = path.display();
    let mut file = tokio::fs::File::create(path)
        .await
        .unwrap_or_else(|e| panic!("create {name}: {e}"));
    let mut written = 0u64;
    for chunk in bytes.chunks(1024) {
        file.write_all(chunk)
            .await
            .unwrap_or_else(|e| panic!("write {name}: {e}"));
        written += chunk.len() as u64;
        transfers.record_progress(id, written).await;
        tokio::task::yield_now().await;
    }
    file.flush()
        .await
        .unwrap_or_else(|e| panic!("flush {name}: {e}"));
    drop(file);

    transfers.finish(id).await;
}
