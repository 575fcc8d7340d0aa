//! Heartbeat progress reporting
//!
//! A single-file transfer gets a background reporter that samples the temp
//! file size on a fixed interval and logs elapsed time, bytes materialized
//! and percentage of the expected size. The reporter runs independently of
//! the transfer call and is cancelled deterministically when the transfer
//! settles, whichever way it settles.

use hbs_common::format::{format_bytes, format_duration, format_rate};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::info;

/// Default interval between heartbeat observations
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// Handle to a running heartbeat reporter
pub struct Heartbeat {
    handle: JoinHandle<()>,
}

impl Heartbeat {
    /// Start reporting on `path`, expecting it to grow to `expected_size`
    pub fn start(name: String, path: PathBuf, expected_size: u64, interval: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let started = Instant::now();
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick of a tokio interval fires immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let bytes = tokio::fs::metadata(&path)
                    .await
                    .map(|m| m.len())
                    .unwrap_or(0);
                let elapsed = started.elapsed();
                let percent = if expected_size > 0 {
                    (bytes as f64 / expected_size as f64) * 100.0
                } else {
                    0.0
                };
                info!(
                    "{}: {} of {} ({:.1}%) in {} at {}",
                    name,
                    format_bytes(bytes),
                    format_bytes(expected_size),
                    percent,
                    format_duration(elapsed),
                    format_rate(bytes, elapsed)
                );
            }
        });

        Self { handle }
    }

    /// Cancel the reporter; the timer never fires again after this returns
    pub fn stop(self) {
        self.handle.abort();
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
