//! Join notifications
//!
//! The reassembler reports through a [`JoinSink`]: once when a join starts,
//! throttled progress while it runs, and exactly once with the outcome.
//! Sink failures are logged by the caller and never abort a join.

mod events;
mod webhook;

pub use events::EventSink;
pub use webhook::WebhookSink;

use crate::error::{Error, Result};
use crate::types::{JoinOutcome, JoinProgress};
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;

/// Receiver of join notifications
///
/// # Examples
///
/// ```
/// use partjoin::sink::{JoinSink, NoOpSink};
///
/// # #[tokio::main]
/// # async fn main() -> partjoin::Result<()> {
/// let sink = NoOpSink;
/// sink.announce_start("movie", 3).await?;
/// assert_eq!(sink.name(), "noop");
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait JoinSink: Send + Sync {
    /// A join of `fragment_count` fragments is starting
    async fn announce_start(&self, logical_id: &str, fragment_count: usize) -> Result<()>;

    /// A join made progress
    async fn report_progress(&self, progress: &JoinProgress) -> Result<()>;

    /// A join reached its terminal outcome
    async fn announce_outcome(&self, outcome: &JoinOutcome) -> Result<()>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Sink that discards every notification
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpSink;

#[async_trait]
impl JoinSink for NoOpSink {
    async fn announce_start(&self, _logical_id: &str, _fragment_count: usize) -> Result<()> {
        Ok(())
    }

    async fn report_progress(&self, _progress: &JoinProgress) -> Result<()> {
        Ok(())
    }

    async fn announce_outcome(&self, _outcome: &JoinOutcome) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

/// Forwards every notification to several sinks concurrently
///
/// All sinks are always called. Failures are collected into one
/// [`Error::Sink`] naming each failing sink.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn JoinSink>>,
}

impl FanoutSink {
    /// Create a fan-out over `sinks`
    pub fn new(sinks: Vec<Arc<dyn JoinSink>>) -> Self {
        Self { sinks }
    }

    /// Add another sink
    pub fn push(&mut self, sink: Arc<dyn JoinSink>) {
        self.sinks.push(sink);
    }

    /// Number of wrapped sinks
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Whether no sink is wrapped
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    fn collect(&self, results: Vec<Result<()>>) -> Result<()> {
        let failures: Vec<String> = self
            .sinks
            .iter()
            .zip(results)
            .filter_map(|(sink, result)| result.err().map(|e| format!("{}: {}", sink.name(), e)))
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Sink(failures.join("; ")))
        }
    }
}

#[async_trait]
impl JoinSink for FanoutSink {
    async fn announce_start(&self, logical_id: &str, fragment_count: usize) -> Result<()> {
        let results = join_all(
            self.sinks
                .iter()
                .map(|sink| sink.announce_start(logical_id, fragment_count)),
        )
        .await;
        self.collect(results)
    }

    async fn report_progress(&self, progress: &JoinProgress) -> Result<()> {
        let results = join_all(self.sinks.iter().map(|sink| sink.report_progress(progress))).await;
        self.collect(results)
    }

    async fn announce_outcome(&self, outcome: &JoinOutcome) -> Result<()> {
        let results = join_all(self.sinks.iter().map(|sink| sink.announce_outcome(outcome))).await;
        self.collect(results)
    }

    fn name(&self) -> &'static str {
        "fanout"
    }
}
