//! # partjoin
//!
//! Recognizes multi-part archive fragments as they finish downloading and
//! reassembles each logical archive exactly once.
//!
//! ## Design Philosophy
//!
//! partjoin is designed to be:
//! - **Name driven** - Fragments are recognized from file names alone; archive contents are never inspected
//! - **At-most-once** - A joined archive is never joined again, however often it is triggered
//! - **Library-first** - No CLI or UI, the embedding application owns transfers and startup
//! - **Event-driven** - Consumers subscribe to events or plug in their own sinks
//!
//! ## Quick Start
//!
//! ```no_run
//! use partjoin::{Config, Coordinator, TransferTable};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transfers = TransferTable::new();
//!     let coordinator = Coordinator::new(Config::from_env()?, Arc::new(transfers.clone())).await?;
//!
//!     // Subscribe to events
//!     let mut events = coordinator.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     // Report a finished transfer
//!     let target = coordinator.config().download_dir().join("movie.part2.rar");
//!     let (id, _cancel) = transfers.begin("movie.part2.rar", &target, None).await;
//!     // ... bytes land in `target` ...
//!     transfers.finish(id).await;
//!     coordinator.fragment_completed(&target).await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Fragment name classification
pub mod classifier;
/// Configuration types
pub mod config;
/// Completion-triggered scheduling of joins
pub mod coordinator;
/// Error types
pub mod error;
/// Reassembly gate and its registries
pub mod gate;
/// Volume copy and streamed concatenation
pub mod reassembler;
/// Fragment inventory scanning
pub mod scanner;
/// Join notification sinks
pub mod sink;
/// In-flight transfer bookkeeping
pub mod transfers;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use classifier::classify;
pub use config::{Config, JoinConfig, WebhookConfig, WebhookEvent};
pub use coordinator::{CheckOutcome, Coordinator};
pub use error::{Error, JoinError, Result};
pub use gate::{CompletedRegistry, DebounceRegistry, Decision, Gate, ReassemblyJob, WaitReason};
pub use reassembler::{ReassemblyResult, Reassembler};
pub use sink::{EventSink, FanoutSink, JoinSink, NoOpSink, WebhookSink};
pub use transfers::{NoPendingTransfers, PendingTransfer, PendingTransfers, TransferTable};
pub use types::{
    ContainerHint, Event, Fragment, FragmentDescriptor, JoinMode, JoinOutcome, JoinProgress,
    TransferId,
};

/// Helper function to run the coordinator with graceful signal handling.
///
/// Waits for a termination signal and then calls the coordinator's `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use partjoin::{Config, Coordinator, NoPendingTransfers, run_with_shutdown};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let coordinator = Coordinator::new(Config::default(), Arc::new(NoPendingTransfers)).await?;
///
///     // Hand `coordinator.clone()` to whatever reports finished transfers, then:
///     run_with_shutdown(coordinator).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(coordinator: Coordinator) -> Result<()> {
    wait_for_signal().await;
    coordinator.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments (containers, tests)
    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("received SIGTERM"),
                _ = sigint.recv() => tracing::info!("received SIGINT"),
            }
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "could not register SIGTERM handler, waiting for SIGINT only");
            sigint.recv().await;
            tracing::info!("received SIGINT");
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "could not register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("received SIGTERM");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "could not register any signal handler, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("received Ctrl+C"),
        Err(e) => tracing::error!(error = %e, "failed to listen for Ctrl+C"),
    }
}
