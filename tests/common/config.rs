//! Test configuration helpers for building coordinators over temporary directories

use partjoin::{Config, Coordinator, PendingTransfers, TransferTable};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Configuration tuned for tests: no debounce, small buffer, settle checks out of the way
pub fn fast_config(dir: &TempDir) -> Config {
    let mut config = Config {
        download_dir: dir.path().to_path_buf(),
        ..Default::default()
    };
    config.join.debounce_interval = Duration::ZERO;
    config.join.settle_delay = Duration::from_secs(3600);
    config.join.chunk_size = 4096;
    config.join.progress_interval = Duration::ZERO;
    config
}

/// Coordinator and transfer table over a fresh temporary directory
///
/// The `TempDir` must be kept alive for the duration of the test.
pub async fn create_test_coordinator() -> (Coordinator, TransferTable, TempDir) {
    let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("temp dir: {e}"));
    let (coordinator, transfers) = create_coordinator_with(fast_config(&dir)).await;
    (coordinator, transfers, dir)
}

/// Coordinator over `config` backed by a new transfer table
pub async fn create_coordinator_with(config: Config) -> (Coordinator, TransferTable) {
    let transfers = TransferTable::new();
    let source: Arc<dyn PendingTransfers> = Arc::new(transfers.clone());
    let coordinator = Coordinator::new(config, source)
        .await
        .unwrap_or_else(|e| panic!("coordinator: {e}"));
    (coordinator, transfers)
}
