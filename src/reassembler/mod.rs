//! Reassembly of fragment sets into one output file
//!
//! Two strategies:
//! - **Volume copy** for RAR and 7z volume sets (`name.part1.rar`): only the
//!   first volume is copied, the format's own extractor finds the others.
//! - **Concatenation** for everything else: fragments are streamed in ordinal
//!   order through a fixed-size buffer into the output.
//!
//! Output is written to a staging file next to the final path and renamed into
//! place once complete, so an output that was reported as joined is never
//! truncated or removed by a later run for the same archive.
//!
//! Every job ends with exactly one outcome notification. Only a finished join
//! marks the logical archive as completed.

mod progress;


pub use progress::ProgressThrottle;

use crate::classifier::is_first_volume;
use crate::config::Config;
use crate::error::{Error, JoinError, Result};
use crate::gate::{CompletedRegistry, ReassemblyJob};
use crate::sink::JoinSink;
use crate::types::{ContainerHint, JoinMode, JoinOutcome, JoinProgress};
use crate::utils::ensure_disk_space;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

/// Extensions recognized in front of a numeric split suffix (`name.7z.001`)
const CHAIN_EXTENSIONS: [&str; 6] = ["7z", "zip", "rar", "tar", "gz", "bz2"];

/// Suffix of staging files; matches no fragment convention
const STAGING_SUFFIX: &str = "joining";

static STAGING_SEQ: AtomicU64 = AtomicU64::new(0);

/// What a reassembly run did
#[derive(Clone, Debug, PartialEq)]
pub struct ReassemblyResult {
    /// Logical archive that was joined
    pub logical_id: String,
    /// The join finished (a size mismatch still counts)
    pub success: bool,
    /// Bytes written; the full expected size in volume-copy mode
    pub bytes_written: u64,
    /// Output file path
    pub output_path: PathBuf,
    /// Output size differs from the sum of the fragment sizes
    pub size_mismatch: bool,
    /// Strategy used
    pub mode: JoinMode,
    /// The job was stopped by cancellation
    pub cancelled: bool,
    /// Failure description
    pub error: Option<String>,
}

/// Output path for a logical archive
///
/// The container hint decides the extension for RAR, ZIP and 7z. Other sets
/// recover it from the first fragment when that one carries a `.001`, `.01`
/// or `.1` suffix behind a known extension (`backup.tar.001` → `backup.tar`);
/// otherwise the output has no extension.
pub fn output_path_for(
    dir: &Path,
    logical_id: &str,
    container: ContainerHint,
    first_fragment: &str,
) -> PathBuf {
    let extension = container
        .extension()
        .or_else(|| chained_extension(first_fragment));
    match extension {
        Some(ext) => dir.join(format!("{logical_id}.{ext}")),
        None => dir.join(logical_id),
    }
}

fn chained_extension(first_fragment: &str) -> Option<&'static str> {
    let lower = first_fragment.to_lowercase();
    if ![".001", ".01", ".1"].iter().any(|s| lower.ends_with(s)) {
        return None;
    }
    let (stem, _) = lower.rsplit_once('.')?;
    let (_, ext) = stem.rsplit_once('.')?;
    CHAIN_EXTENSIONS.iter().copied().find(|known| *known == ext)
}

/// Fresh staging path beside `output`, unique per run
fn staging_path_for(output: &Path) -> PathBuf {
    let seq = STAGING_SEQ.fetch_add(1, Ordering::Relaxed);
    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    output.with_file_name(format!(
        "{name}.{}-{seq}.{STAGING_SUFFIX}",
        std::process::id()
    ))
}

/// Strategy for a job
pub fn select_mode(job: &ReassemblyJob) -> JoinMode {
    if job.container.supports_volumes()
        && job.fragments.iter().any(|f| is_first_volume(&f.file_name))
    {
        JoinMode::VolumeCopy
    } else {
        JoinMode::Concatenate
    }
}

/// Runs reassembly jobs
#[derive(Clone)]
pub struct Reassembler {
    config: Arc<Config>,
    completed: CompletedRegistry,
}

impl Reassembler {
    /// Create a reassembler that records finished joins in `completed`
    pub fn new(config: Arc<Config>, completed: CompletedRegistry) -> Self {
        Self { config, completed }
    }

    /// Run `job` to its terminal outcome
    ///
    /// Never returns an error: failures, cancellation and size mismatches are
    /// all described by the result and by the single outcome sent to `sink`.
    pub async fn run(
        &self,
        job: ReassemblyJob,
        sink: &dyn JoinSink,
        cancel: &CancellationToken,
    ) -> ReassemblyResult {
        let started = Instant::now();
        let mode = select_mode(&job);
        let logical_id = job.logical_id.as_str();

        tracing::info!(
            logical_id,
            fragments = job.fragments.len(),
            ?mode,
            output = ?job.output_path,
            total_bytes = job.total_expected_bytes,
            "starting join"
        );

        if let Err(e) = sink.announce_start(logical_id, job.fragments.len()).await {
            tracing::warn!(logical_id, sink = sink.name(), error = %e, "failed to announce join start");
        }

        let staging = staging_path_for(&job.output_path);
        let mut bytes_written = 0;
        let attempt = match mode {
            JoinMode::VolumeCopy => self.copy_first_volume(&job, &staging, cancel).await,
            JoinMode::Concatenate => {
                self.concatenate(&job, &staging, sink, cancel, started, &mut bytes_written)
                    .await
            }
        };
        let attempt = match attempt {
            Ok(actual_size) => publish(&staging, &job.output_path)
                .await
                .map(|()| actual_size),
            Err(e) => Err(e),
        };

        let (result, outcome) = match attempt {
            Ok(actual_size) => self.finished(&job, mode, actual_size).await,
            Err(e) => self.failed(&job, mode, &staging, bytes_written, e).await,
        };

        if let Err(e) = sink.announce_outcome(&outcome).await {
            tracing::warn!(logical_id, sink = sink.name(), error = %e, "failed to announce join outcome");
        }

        result
    }

    /// Copy the first volume to `staging`. Returns the copied size.
    async fn copy_first_volume(
        &self,
        job: &ReassemblyJob,
        staging: &Path,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let first = job
            .fragments
            .iter()
            .find(|f| is_first_volume(&f.file_name))
            .ok_or_else(|| JoinError::FirstVolumeMissing {
                logical_id: job.logical_id.clone(),
            })?;

        self.check_space(&job.output_path, first.size)?;

        if cancel.is_cancelled() {
            return Err(JoinError::Cancelled {
                logical_id: job.logical_id.clone(),
            }
            .into());
        }

        tracing::debug!(
            logical_id = %job.logical_id,
            source = ?first.path,
            "copying first volume"
        );

        // Distinguish an unreadable source from an unwritable destination
        if let Err(e) = tokio::fs::metadata(&first.path).await {
            return Err(JoinError::FragmentUnreadable {
                path: first.path.clone(),
                reason: e.to_string(),
            }
            .into());
        }

        let copied = tokio::fs::copy(&first.path, staging)
            .await
            .map_err(|e| JoinError::OutputFailed {
                path: job.output_path.clone(),
                reason: e.to_string(),
            })?;
        Ok(copied)
    }

    /// Stream every fragment into `staging`. Returns its size on disk.
    async fn concatenate(
        &self,
        job: &ReassemblyJob,
        staging: &Path,
        sink: &dyn JoinSink,
        cancel: &CancellationToken,
        started: Instant,
        bytes_written: &mut u64,
    ) -> Result<u64> {
        if job.fragments.is_empty() {
            return Err(JoinError::EmptyJob {
                logical_id: job.logical_id.clone(),
            }
            .into());
        }

        self.check_space(&job.output_path, job.total_expected_bytes)?;

        let output_failed = |e: std::io::Error| JoinError::OutputFailed {
            path: job.output_path.clone(),
            reason: e.to_string(),
        };

        let mut output = tokio::fs::File::create(staging)
            .await
            .map_err(output_failed)?;
        let mut buffer = vec![0u8; self.config.join.chunk_size];
        let mut throttle = ProgressThrottle::new(
            self.config.join.progress_interval,
            self.config.join.progress_step_percent,
            started,
        );

        for fragment in &job.fragments {
            let unreadable = |e: std::io::Error| JoinError::FragmentUnreadable {
                path: fragment.path.clone(),
                reason: e.to_string(),
            };

            let mut input = tokio::fs::File::open(&fragment.path)
                .await
                .map_err(unreadable)?;
            tracing::debug!(
                logical_id = %job.logical_id,
                fragment = %fragment.file_name,
                ordinal = fragment.ordinal,
                "appending fragment"
            );

            loop {
                if cancel.is_cancelled() {
                    return Err(JoinError::Cancelled {
                        logical_id: job.logical_id.clone(),
                    }
                    .into());
                }

                let n = input.read(&mut buffer).await.map_err(unreadable)?;
                if n == 0 {
                    break;
                }
                output
                    .write_all(&buffer[..n])
                    .await
                    .map_err(output_failed)?;
                *bytes_written += n as u64;

                let percent = percent_of(*bytes_written, job.total_expected_bytes);
                let now = Instant::now();
                if throttle.should_report(percent, now) {
                    let progress = JoinProgress {
                        logical_id: job.logical_id.clone(),
                        percent,
                        fragment_count: job.fragments.len(),
                        elapsed: now.duration_since(started),
                    };
                    if let Err(e) = sink.report_progress(&progress).await {
                        tracing::warn!(
                            logical_id = %job.logical_id,
                            sink = sink.name(),
                            error = %e,
                            "failed to report join progress"
                        );
                    }
                }

                tokio::task::yield_now().await;
            }
        }

        output.flush().await.map_err(output_failed)?;
        drop(output);

        let actual = tokio::fs::metadata(staging)
            .await
            .map(|m| m.len())
            .unwrap_or(*bytes_written);
        Ok(actual)
    }

    fn check_space(&self, output_path: &Path, bytes: u64) -> Result<()> {
        let dir = output_path
            .parent()
            .unwrap_or_else(|| self.config.download_dir().as_path());
        ensure_disk_space(&self.config.disk_space, dir, bytes)
    }

    async fn finished(
        &self,
        job: &ReassemblyJob,
        mode: JoinMode,
        actual_size: u64,
    ) -> (ReassemblyResult, JoinOutcome) {
        let (bytes_written, size_mismatch) = match mode {
            // Volume copy writes only the first volume; report the whole set
            JoinMode::VolumeCopy => (job.total_expected_bytes, false),
            JoinMode::Concatenate => (actual_size, actual_size != job.total_expected_bytes),
        };

        if size_mismatch {
            tracing::warn!(
                logical_id = %job.logical_id,
                expected = job.total_expected_bytes,
                actual = actual_size,
                "joined size does not match the sum of the fragments"
            );
        }

        self.completed.insert(&job.logical_id).await;
        tracing::info!(
            logical_id = %job.logical_id,
            output = ?job.output_path,
            bytes = actual_size,
            ?mode,
            "join complete"
        );

        let result = ReassemblyResult {
            logical_id: job.logical_id.clone(),
            success: true,
            bytes_written,
            output_path: job.output_path.clone(),
            size_mismatch,
            mode,
            cancelled: false,
            error: None,
        };
        let outcome = JoinOutcome {
            logical_id: job.logical_id.clone(),
            success: true,
            output_path: job.output_path.clone(),
            actual_size,
            expected_size: job.total_expected_bytes,
            size_mismatch,
            cancelled: false,
            error: size_mismatch.then(|| {
                format!(
                    "size mismatch: expected {} bytes, got {}",
                    job.total_expected_bytes, actual_size
                )
            }),
        };
        (result, outcome)
    }

    async fn failed(
        &self,
        job: &ReassemblyJob,
        mode: JoinMode,
        staging: &Path,
        bytes_written: u64,
        error: Error,
    ) -> (ReassemblyResult, JoinOutcome) {
        let cancelled = error.is_cancelled();
        if cancelled {
            tracing::info!(logical_id = %job.logical_id, bytes_written, "join cancelled");
            if self.config.join.remove_partial_on_cancel {
                remove_partial(staging).await;
            } else if tokio::fs::try_exists(staging).await.unwrap_or(false) {
                tracing::info!(logical_id = %job.logical_id, partial = ?staging, "keeping partial output");
            }
        } else {
            tracing::error!(
                logical_id = %job.logical_id,
                code = error.code(),
                error = %error,
                "join failed"
            );
            remove_partial(staging).await;
        }

        let message = error.to_string();
        let result = ReassemblyResult {
            logical_id: job.logical_id.clone(),
            success: false,
            bytes_written,
            output_path: job.output_path.clone(),
            size_mismatch: false,
            mode,
            cancelled,
            error: Some(message.clone()),
        };
        let outcome = JoinOutcome {
            logical_id: job.logical_id.clone(),
            success: false,
            output_path: job.output_path.clone(),
            actual_size: 0,
            expected_size: job.total_expected_bytes,
            size_mismatch: false,
            cancelled,
            error: Some(message),
        };
        (result, outcome)
    }
}

fn percent_of(written: u64, total: u64) -> f32 {
    if total == 0 {
        return 100.0;
    }
    ((written as f64 / total as f64) * 100.0).min(100.0) as f32
}

/// Move a finished staging file over the final output
async fn publish(staging: &Path, output: &Path) -> Result<()> {
    tokio::fs::rename(staging, output)
        .await
        .map_err(|e| JoinError::OutputFailed {
            path: output.to_path_buf(),
            reason: e.to_string(),
        })?;
    Ok(())
}

async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(?path, "removed partial output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(?path, error = %e, "failed to remove partial output"),
    }
}
