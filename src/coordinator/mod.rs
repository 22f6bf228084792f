//! Trigger and scheduling of reassembly
//!
//! Every completed transfer is handed to [`Coordinator::fragment_completed`].
//! The coordinator evaluates the fragment's archive right away and also
//! schedules one deferred re-check after the settle delay, which catches sets
//! whose last fragment finished while the immediate check was waiting.
//! Deferred checks that find nothing to do are cheap: the completed and
//! debounce registries short-circuit them.


use crate::classifier;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::gate::{CompletedRegistry, DebounceRegistry, Decision, Gate, WaitReason};
use crate::reassembler::{ReassemblyResult, Reassembler};
use crate::sink::{EventSink, FanoutSink, JoinSink, WebhookSink};
use crate::transfers::PendingTransfers;
use crate::types::{Event, FragmentDescriptor};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// How long [`Coordinator::shutdown`] waits for running work
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of one evaluation (and, when it proceeded, the join)
#[derive(Clone, Debug, PartialEq)]
pub enum CheckOutcome {
    /// The gate proceeded and the reassembler ran
    Joined(ReassemblyResult),
    /// The gate asked to wait
    Waiting(WaitReason),
    /// The archive was already joined
    AlreadyDone,
    /// No fragment of the archive is on disk
    NoFragments,
}

/// Entry point tying the gate, the reassembler and the notification sinks together
///
/// Cheap to clone; clones share registries, sinks and the shutdown token.
#[derive(Clone)]
pub struct Coordinator {
    config: Arc<Config>,
    gate: Gate,
    reassembler: Reassembler,
    sinks: FanoutSink,
    event_tx: broadcast::Sender<Event>,
    cancel: CancellationToken,
    tracker: TaskTracker,
    deliveries: TaskTracker,
    accepting: Arc<AtomicBool>,
}

impl Coordinator {
    /// Create a coordinator with fresh registries
    ///
    /// Validates `config` and creates the download directory if needed.
    /// Events are always published; webhooks are added when configured.
    pub async fn new(config: Config, transfers: Arc<dyn PendingTransfers>) -> Result<Self> {
        Self::with_registries(
            config,
            transfers,
            CompletedRegistry::new(),
            DebounceRegistry::new(),
        )
        .await
    }

    /// Create a coordinator over existing registries
    pub async fn with_registries(
        config: Config,
        transfers: Arc<dyn PendingTransfers>,
        completed: CompletedRegistry,
        debounce: DebounceRegistry,
    ) -> Result<Self> {
        config.validate()?;
        tokio::fs::create_dir_all(config.download_dir()).await?;

        let config = Arc::new(config);
        let (event_tx, _) = broadcast::channel(config.join.event_channel_capacity);

        let deliveries = TaskTracker::new();
        let mut sinks = FanoutSink::default();
        sinks.push(Arc::new(EventSink::new(event_tx.clone())));
        if !config.notifications.webhooks.is_empty() {
            sinks.push(Arc::new(
                WebhookSink::new(config.notifications.webhooks.clone())
                    .with_events(event_tx.clone())
                    .with_tracker(deliveries.clone()),
            ));
        }

        tracing::info!(
            download_dir = ?config.download_dir(),
            webhooks = config.notifications.webhooks.len(),
            "coordinator ready"
        );

        Ok(Self {
            gate: Gate::new(config.clone(), transfers, completed.clone(), debounce),
            reassembler: Reassembler::new(config.clone(), completed),
            config,
            sinks,
            event_tx,
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
            deliveries,
            accepting: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Also notify `sink` about every join
    pub fn with_sink(mut self, sink: Arc<dyn JoinSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Subscribe to coordinator events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Registry of joined archives
    pub fn completed(&self) -> &CompletedRegistry {
        self.gate.completed()
    }

    /// Handle a finished transfer
    ///
    /// Returns `Ok(None)` when the file is not a fragment. Otherwise the
    /// archive is evaluated (and joined, if ready) before returning, and one
    /// deferred re-check is scheduled.
    pub async fn fragment_completed(&self, path: &Path) -> Result<Option<CheckOutcome>> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            tracing::debug!(?path, "completed path has no usable file name");
            return Ok(None);
        };
        let Some(descriptor) = classifier::classify(file_name) else {
            tracing::debug!(file = file_name, "not a fragment");
            return Ok(None);
        };

        tracing::debug!(
            logical_id = %descriptor.logical_id,
            file = file_name,
            ordinal = descriptor.ordinal,
            container = %descriptor.container,
            "fragment completed"
        );
        self.event_tx
            .send(Event::FragmentCompleted {
                logical_id: descriptor.logical_id.clone(),
                file_name: file_name.to_string(),
            })
            .ok();

        let outcome = self.check(&descriptor).await;
        self.schedule_settle_check(descriptor);
        Ok(Some(outcome))
    }

    /// Evaluate the archive of `descriptor` once and join it if the gate proceeds
    pub async fn check(&self, descriptor: &FragmentDescriptor) -> CheckOutcome {
        match self.gate.evaluate(descriptor).await {
            Decision::Proceed(job) => {
                let cancel = self.cancel.child_token();
                let result = self.reassembler.run(job, &self.sinks, &cancel).await;
                CheckOutcome::Joined(result)
            }
            Decision::Wait(reason) => CheckOutcome::Waiting(reason),
            Decision::AlreadyDone => CheckOutcome::AlreadyDone,
            Decision::NoFragments => CheckOutcome::NoFragments,
        }
    }

    fn schedule_settle_check(&self, descriptor: FragmentDescriptor) {
        let this = self.clone();
        let delay = self.config.join.settle_delay;

        self.tracker.spawn(async move {
            tokio::select! {
                _ = this.cancel.cancelled() => {
                    tracing::debug!(logical_id = %descriptor.logical_id, "settle check dropped on shutdown");
                }
                _ = tokio::time::sleep(delay) => {
                    let outcome = this.check(&descriptor).await;
                    tracing::debug!(logical_id = %descriptor.logical_id, ?outcome, "settle check finished");
                }
            }
        });
    }

    /// Number of deferred checks still scheduled or running
    pub fn pending_checks(&self) -> usize {
        self.tracker.len()
    }

    /// Number of webhook deliveries still in flight
    pub fn pending_deliveries(&self) -> usize {
        self.deliveries.len()
    }

    /// Stop accepting work, cancel running joins and wait for outstanding tasks
    ///
    /// Deferred checks are waited for first, then webhook deliveries (which may
    /// have been started by those checks). Waits at most 30 seconds in total,
    /// then emits [`Event::Shutdown`].
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("initiating coordinator shutdown");

        self.accepting.store(false, Ordering::SeqCst);
        self.cancel.cancel();
        self.tracker.close();

        let drain = async {
            self.tracker.wait().await;
            self.deliveries.close();
            self.deliveries.wait().await;
        };
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, drain).await {
            Ok(()) => tracing::info!("all deferred checks and deliveries finished"),
            Err(_) => tracing::warn!(
                checks = self.tracker.len(),
                deliveries = self.deliveries.len(),
                "timeout waiting for outstanding tasks, proceeding with shutdown"
            ),
        }

        self.event_tx.send(Event::Shutdown).ok();
        tracing::info!("coordinator shutdown complete");
        Ok(())
    }
}
