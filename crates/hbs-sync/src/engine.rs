//! Sync engine
//!
//! Orchestrates one synchronization run: writability probe, remote listing,
//! skip/re-download decisions against local state, download-to-temp with
//! heartbeat and per-file timeout, atomic rename, and aggregate statistics.
//!
//! Local state is implicit: a file of the same name and exact nonzero size
//! as the remote entry counts as already synchronized. No manifest is kept.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::client::{RemoteEntry, TransferClient};
use crate::error::SyncError;
use crate::progress::{Heartbeat, DEFAULT_HEARTBEAT_INTERVAL};
use hbs_common::format::{format_bytes, format_duration};

/// Suffix marking an in-progress or interrupted download
pub const TEMP_SUFFIX: &str = ".downloading";

/// Marker file used for the writability probe
const WRITE_PROBE_NAME: &str = ".hbs-write-probe";

/// Emit an interim statistics summary every this many processed items
pub const SUMMARY_EVERY: usize = 10;

/// Running counters for one synchronization run
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SyncStats {
    pub downloaded: usize,
    pub downloaded_bytes: u64,
    pub skipped: usize,
    pub skipped_bytes: u64,
    pub failed: usize,
}

impl SyncStats {
    fn log_summary(&self, label: &str, elapsed: Duration) {
        info!(
            "{}: {} downloaded ({}), {} skipped ({}), {} failed in {}",
            label,
            self.downloaded,
            format_bytes(self.downloaded_bytes),
            self.skipped,
            format_bytes(self.skipped_bytes),
            self.failed,
            format_duration(elapsed)
        );
    }
}

/// Result of one synchronization run
#[derive(Debug)]
pub struct SyncReport {
    /// Locally materialized paths: freshly downloaded plus already-present
    /// files whose size matched. Failed items are absent, not enumerated.
    pub files: Vec<PathBuf>,

    /// Aggregate counters for the run
    pub stats: SyncStats,
}

/// Per-item outcome, recorded in the statistics
enum FileOutcome {
    Downloaded(u64),
    Skipped(u64),
    Failed,
}

/// Remote-to-local synchronization engine
///
/// Processes remote files strictly sequentially; the only concurrency is
/// the per-transfer heartbeat reporter.
pub struct SyncEngine<C: TransferClient> {
    client: C,
    extension: String,
    transfer_timeout: Duration,
    heartbeat_interval: Duration,
}

impl<C: TransferClient> SyncEngine<C> {
    /// Create an engine syncing files with the given extension
    pub fn new(client: C, extension: impl Into<String>, transfer_timeout: Duration) -> Self {
        Self {
            client,
            extension: extension.into().trim_start_matches('.').to_string(),
            transfer_timeout,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }

    /// Override the heartbeat interval (mainly for tests)
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Synchronize a remote directory into a local one
    ///
    /// Fatal errors: unwritable local directory, connection establishment.
    /// Per-file failures are recorded in the report and never abort the
    /// batch. The remote session is released in all cases.
    pub async fn synchronize(
        &mut self,
        remote_dir: &str,
        local_dir: &Path,
    ) -> Result<SyncReport, SyncError> {
        probe_writable(local_dir)?;

        let result = match self.client.connect().await {
            Ok(()) => self.run(remote_dir, local_dir).await,
            Err(e) => {
                error!("Connection to remote endpoint failed: {}", e);
                Err(e)
            },
        };

        if let Err(e) = self.client.end().await {
            warn!("Failed to release remote session: {}", e);
        }

        result
    }

    async fn run(&mut self, remote_dir: &str, local_dir: &Path) -> Result<SyncReport, SyncError> {
        let started = Instant::now();
        let entries = self.client.list(remote_dir).await?;

        let candidates: Vec<RemoteEntry> = entries
            .into_iter()
            .filter(|e| e.is_file() && self.matches_extension(&e.name))
            .collect();
        info!(
            "Remote listing of {} yielded {} candidate file(s)",
            remote_dir,
            candidates.len()
        );

        let mut stats = SyncStats::default();
        let mut files = Vec::new();

        for (index, entry) in candidates.iter().enumerate() {
            let final_path = local_dir.join(&entry.name);
            match self.sync_one(remote_dir, entry, &final_path).await {
                FileOutcome::Downloaded(bytes) => {
                    stats.downloaded += 1;
                    stats.downloaded_bytes += bytes;
                    files.push(final_path);
                },
                FileOutcome::Skipped(bytes) => {
                    stats.skipped += 1;
                    stats.skipped_bytes += bytes;
                    files.push(final_path);
                },
                FileOutcome::Failed => stats.failed += 1,
            }

            if (index + 1) % SUMMARY_EVERY == 0 {
                stats.log_summary("Sync progress", started.elapsed());
            }
        }

        stats.log_summary("Sync complete", started.elapsed());
        Ok(SyncReport { files, stats })
    }

    /// Synchronize a single remote entry; never fails the batch
    async fn sync_one(
        &mut self,
        remote_dir: &str,
        entry: &RemoteEntry,
        final_path: &Path,
    ) -> FileOutcome {
        // Skip rule: exact nonzero size match means already synchronized.
        // A zero-byte or size-mismatched local file forces a re-download.
        if let Ok(meta) = std::fs::metadata(final_path) {
            if entry.size > 0 && meta.len() == entry.size {
                debug!("{} already synchronized ({} bytes)", entry.name, entry.size);
                return FileOutcome::Skipped(entry.size);
            }
            info!(
                "{} local size {} differs from remote {}, re-downloading",
                entry.name,
                meta.len(),
                entry.size
            );
        }

        let temp_path = temp_path_for(final_path);
        if temp_path.exists() {
            debug!("Discarding stale temp file {}", temp_path.display());
            if let Err(e) = std::fs::remove_file(&temp_path) {
                warn!("Could not remove stale temp file: {}", e);
                return FileOutcome::Failed;
            }
        }

        let remote_path = join_remote(remote_dir, &entry.name);
        let heartbeat = Heartbeat::start(
            entry.name.clone(),
            temp_path.clone(),
            entry.size,
            self.heartbeat_interval,
        );

        let transfer = tokio::time::timeout(
            self.transfer_timeout,
            self.client.get(&remote_path, &temp_path),
        )
        .await;
        heartbeat.stop();

        match transfer {
            Err(_elapsed) => {
                // The loser of the race must be actively cancelled; a
                // timed-out transfer may still be writing to the temp file.
                self.client.abort();
                error!(
                    "{}",
                    SyncError::Timeout {
                        name: entry.name.clone(),
                        secs: self.transfer_timeout.as_secs(),
                    }
                );
                discard_empty_temp(&temp_path);
                FileOutcome::Failed
            },
            Ok(Err(e)) => {
                error!("Transfer of {} failed: {}", entry.name, e);
                discard_empty_temp(&temp_path);
                FileOutcome::Failed
            },
            Ok(Ok(())) => self.finalize(entry, &temp_path, final_path),
        }
    }

    /// Verify and atomically publish a completed temp file
    fn finalize(&self, entry: &RemoteEntry, temp_path: &Path, final_path: &Path) -> FileOutcome {
        let size = match std::fs::metadata(temp_path) {
            Ok(meta) => meta.len(),
            Err(e) => {
                error!("Completed transfer of {} left no temp file: {}", entry.name, e);
                return FileOutcome::Failed;
            },
        };

        // A zero-byte result is a failure even when the protocol call
        // reported success.
        if size == 0 {
            error!("{}", SyncError::ZeroByte(entry.name.clone()));
            let _ = std::fs::remove_file(temp_path);
            return FileOutcome::Failed;
        }

        if let Err(e) = std::fs::rename(temp_path, final_path) {
            error!("Could not move {} into place: {}", entry.name, e);
            return FileOutcome::Failed;
        }

        info!("Downloaded {} ({})", entry.name, format_bytes(size));
        FileOutcome::Downloaded(size)
    }

    fn matches_extension(&self, name: &str) -> bool {
        name.rsplit('.')
            .next()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.extension))
    }
}

/// Probe that the local directory is writable
///
/// Distinguishes permission/AV-interference failures from transfer
/// failures before any connection is attempted.
fn probe_writable(local_dir: &Path) -> Result<(), SyncError> {
    let probe = local_dir.join(WRITE_PROBE_NAME);
    std::fs::write(&probe, b"probe")
        .and_then(|()| std::fs::remove_file(&probe))
        .map_err(|source| SyncError::NotWritable {
            path: local_dir.to_path_buf(),
            source,
        })
}

/// Temporary sibling path for an in-progress download
fn temp_path_for(final_path: &Path) -> PathBuf {
    let mut name = final_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(TEMP_SUFFIX);
    final_path.with_file_name(name)
}

fn join_remote(remote_dir: &str, name: &str) -> String {
    format!("{}/{}", remote_dir.trim_end_matches('/'), name)
}

/// Keep a nonzero temp file for inspection, delete an empty one
fn discard_empty_temp(temp_path: &Path) {
    if let Ok(meta) = std::fs::metadata(temp_path) {
        if meta.len() == 0 {
            let _ = std::fs::remove_file(temp_path);
        } else {
            warn!(
                "Keeping partial temp file {} ({} bytes) for inspection",
                temp_path.display(),
                meta.len()
            );
        }
    }
}
