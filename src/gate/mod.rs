//! Reassembly gate
//!
//! Decides whether a logical archive may be joined right now. The gate is the
//! only place that combines the completed registry, the debounce registry and
//! a fresh inventory scan into a single [`Decision`].

mod registry;


pub use registry::{CompletedRegistry, DebounceRegistry};

use crate::config::Config;
use crate::reassembler::output_path_for;
use crate::scanner;
use crate::transfers::PendingTransfers;
use crate::types::{ContainerHint, Fragment, FragmentDescriptor};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// One unit of reassembly work
#[derive(Clone, Debug, PartialEq)]
pub struct ReassemblyJob {
    /// Logical archive to join
    pub logical_id: String,
    /// Format guess taken from the fragment that triggered the evaluation
    pub container: ContainerHint,
    /// Fragments ascending by ordinal
    pub fragments: Vec<Fragment>,
    /// Where the joined file goes
    pub output_path: PathBuf,
    /// Sum of the fragment sizes at scan time
    pub total_expected_bytes: u64,
    /// When the gate produced the job
    pub created_at: Instant,
}

/// Why the gate declined to proceed for now
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WaitReason {
    /// The archive was evaluated within the debounce interval
    Debounced,
    /// These fragments are still being written
    PendingFragments(Vec<String>),
    /// Too few fragments on disk to be a multi-part set
    SingleFragment,
}

/// Result of one gate evaluation
#[derive(Clone, Debug, PartialEq)]
pub enum Decision {
    /// All fragments are present and finished
    Proceed(ReassemblyJob),
    /// Try again later
    Wait(WaitReason),
    /// The archive was already joined
    AlreadyDone,
    /// No fragment of the archive is on disk
    NoFragments,
}

/// Decides when a logical archive is safe to join
#[derive(Clone)]
pub struct Gate {
    config: Arc<Config>,
    transfers: Arc<dyn PendingTransfers>,
    completed: CompletedRegistry,
    debounce: DebounceRegistry,
}

impl Gate {
    /// Create a gate over the given registries
    pub fn new(
        config: Arc<Config>,
        transfers: Arc<dyn PendingTransfers>,
        completed: CompletedRegistry,
        debounce: DebounceRegistry,
    ) -> Self {
        Self {
            config,
            transfers,
            completed,
            debounce,
        }
    }

    /// Registry of joined archives this gate consults
    pub fn completed(&self) -> &CompletedRegistry {
        &self.completed
    }

    /// Evaluate the archive `descriptor` belongs to
    pub async fn evaluate(&self, descriptor: &FragmentDescriptor) -> Decision {
        let logical_id = descriptor.logical_id.as_str();

        if self.completed.contains(logical_id).await {
            tracing::debug!(logical_id, "archive already joined");
            return Decision::AlreadyDone;
        }

        let interval = self.config.join.debounce_interval;
        if !self
            .debounce
            .try_stamp(logical_id, interval, Instant::now())
            .await
        {
            tracing::debug!(logical_id, "evaluation debounced");
            return Decision::Wait(WaitReason::Debounced);
        }

        let dir = self.config.download_dir();
        let inventory = match scanner::scan(dir, logical_id, self.transfers.as_ref()).await {
            Ok(inventory) => inventory,
            Err(e) => {
                tracing::warn!(logical_id, ?dir, error = %e, "fragment scan failed");
                return Decision::NoFragments;
            }
        };

        if !inventory.pending.is_empty() {
            let pending: Vec<String> = inventory.pending.into_iter().collect();
            tracing::debug!(logical_id, ?pending, "waiting for pending fragments");
            return Decision::Wait(WaitReason::PendingFragments(pending));
        }

        if inventory.on_disk.is_empty() {
            return Decision::NoFragments;
        }

        if inventory.on_disk.len() < self.config.join.min_fragments {
            tracing::debug!(
                logical_id,
                found = inventory.on_disk.len(),
                "not enough fragments for a multi-part set"
            );
            return Decision::Wait(WaitReason::SingleFragment);
        }

        let total_expected_bytes = inventory.total_bytes();
        let first_name = inventory.on_disk[0].file_name.as_str();
        let output_path = output_path_for(dir, logical_id, descriptor.container, first_name);

        tracing::debug!(
            logical_id,
            fragments = inventory.on_disk.len(),
            total_expected_bytes,
            ?output_path,
            "archive ready to join"
        );

        Decision::Proceed(ReassemblyJob {
            logical_id: logical_id.to_string(),
            container: descriptor.container,
            fragments: inventory.on_disk,
            output_path,
            total_expected_bytes,
            created_at: Instant::now(),
        })
    }
}
