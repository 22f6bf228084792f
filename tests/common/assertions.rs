//! Event-based assertions for integration tests

use partjoin::Event;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast;

/// Result of waiting for a join to finish
#[derive(Debug)]
pub enum WaitResult {
    /// Join completed
    Completed {
        /// Output file
        output_path: PathBuf,
        /// Output size
        actual_size: u64,
        /// Size mismatch flag
        size_mismatch: bool,
    },
    /// Join failed or was cancelled
    Failed(String),
    /// Timeout waiting for an outcome
    Timeout,
    /// Channel closed unexpectedly
    ChannelClosed,
}

/// Wait for the outcome event of `logical_id`
pub async fn wait_for_join(
    events: &mut broadcast::Receiver<Event>,
    logical_id: &str,
    timeout: Duration,
) -> WaitResult {
    let result = tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(Event::JoinComplete {
                    logical_id: id,
                    output_path,
                    actual_size,
                    size_mismatch,
                    ..
                }) if id == logical_id => {
                    return WaitResult::Completed {
                        output_path,
                        actual_size,
                        size_mismatch,
                    };
                }
                Ok(Event::JoinFailed {
                    logical_id: id,
                    error,
                    ..
                }) if id == logical_id => {
                    return WaitResult::Failed(error);
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return WaitResult::ChannelClosed,
            }
        }
    })
    .await;

    result.unwrap_or(WaitResult::Timeout)
}

/// Drain every event currently buffered in the channel
pub fn drain_events(events: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

/// Count join-start events for `logical_id`
pub fn count_join_starts(events: &[Event], logical_id: &str) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, Event::JoinStarted { logical_id: id, .. } if id == logical_id))
        .count()
}
