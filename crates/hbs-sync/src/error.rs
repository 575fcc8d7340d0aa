//! Sync engine errors

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the transfer client and sync engine
///
/// `Config`, `NotWritable` and `Connect` are fatal for a whole run.
/// The remaining variants are per-file: the engine records them in the run
/// statistics and moves on to the next candidate.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("local directory {path} is not writable (permissions or AV interference): {source}")]
    NotWritable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to connect to remote endpoint: {0}")]
    Connect(String),

    #[error("transfer client is not connected")]
    NotConnected,

    #[error("remote protocol error: {0}")]
    Protocol(String),

    #[error("transfer of {0} was aborted")]
    Aborted(String),

    #[error("transfer of {name} exceeded {secs}s limit")]
    Timeout { name: String, secs: u64 },

    #[error("completed download of {0} is zero bytes")]
    ZeroByte(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
