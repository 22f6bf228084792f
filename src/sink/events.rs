//! Broadcast-channel sink

use super::JoinSink;
use crate::error::Result;
use crate::types::{Event, JoinOutcome, JoinProgress};
use async_trait::async_trait;
use tokio::sync::broadcast;

/// Publishes join notifications as [`Event`]s on a broadcast channel
///
/// Having no subscribers is not an error.
#[derive(Clone, Debug)]
pub struct EventSink {
    event_tx: broadcast::Sender<Event>,
}

impl EventSink {
    /// Publish on `event_tx`
    pub fn new(event_tx: broadcast::Sender<Event>) -> Self {
        Self { event_tx }
    }

    fn emit(&self, event: Event) {
        // send() only fails when there are no receivers
        self.event_tx.send(event).ok();
    }
}

#[async_trait]
impl JoinSink for EventSink {
    async fn announce_start(&self, logical_id: &str, fragment_count: usize) -> Result<()> {
        self.emit(Event::JoinStarted {
            logical_id: logical_id.to_string(),
            fragment_count,
        });
        Ok(())
    }

    async fn report_progress(&self, progress: &JoinProgress) -> Result<()> {
        self.emit(Event::JoinProgress {
            logical_id: progress.logical_id.clone(),
            percent: progress.percent,
            fragment_count: progress.fragment_count,
            elapsed_secs: progress.elapsed.as_secs(),
        });
        Ok(())
    }

    async fn announce_outcome(&self, outcome: &JoinOutcome) -> Result<()> {
        let event = if outcome.success {
            Event::JoinComplete {
                logical_id: outcome.logical_id.clone(),
                output_path: outcome.output_path.clone(),
                actual_size: outcome.actual_size,
                expected_size: outcome.expected_size,
                size_mismatch: outcome.size_mismatch,
            }
        } else {
            Event::JoinFailed {
                logical_id: outcome.logical_id.clone(),
                output_path: outcome.output_path.clone(),
                error: outcome
                    .error
                    .clone()
                    .unwrap_or_else(|| "join failed".to_string()),
                cancelled: outcome.cancelled,
            }
        };
        self.emit(event);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "events"
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    #[tokio::test]
    async fn notifications_become_events() {
        let (tx, mut rx) = broadcast::channel(16);
        let sink = EventSink::new(tx);

        sink.announce_start("a", 2).await.unwrap();
        sink.report_progress(&JoinProgress {
            logical_id: "a".into(),
            percent: 42.0,
            fragment_count: 2,
            elapsed: Duration::from_millis(2500),
        })
        .await
        .unwrap();

        assert!(matches!(
            rx.recv().await.unwrap(),
            Event::JoinStarted { ref logical_id, fragment_count: 2 } if logical_id == "a"
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            Event::JoinProgress { elapsed_secs: 2, .. }
        ));
    }

    #[tokio::test]
    async fn failed_outcome_carries_error_and_cancel_flag() {
        let (tx, mut rx) = broadcast::channel(16);
        let sink = EventSink::new(tx);

        sink.announce_outcome(&JoinOutcome {
            logical_id: "a".into(),
            success: false,
            output_path: PathBuf::from("/d/a.7z"),
            actual_size: 0,
            expected_size: 10,
            size_mismatch: false,
            cancelled: true,
            error: Some("cancelled".into()),
        })
        .await
        .unwrap();

        match rx.recv().await.unwrap() {
            Event::JoinFailed {
                error, cancelled, ..
            } => {
                assert_eq!(error, "cancelled");
                assert!(cancelled);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn no_subscribers_is_fine() {
        let (tx, rx) = broadcast::channel(1);
        drop(rx);
        EventSink::new(tx).announce_start("a", 2).await.unwrap();
    }
}
