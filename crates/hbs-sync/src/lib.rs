//! Remote-to-local synchronization of backup artifacts
//!
//! Lists a remote FTP directory, compares each entry against local state and
//! materializes missing or size-mismatched files through a resumable
//! download-to-temp-then-rename pipeline with heartbeat progress reporting
//! and per-file timeout enforcement.

pub mod client;
pub mod engine;
pub mod error;
pub mod pool;
pub mod progress;

pub use client::{EntryKind, FtpTransferClient, RemoteEntry, TransferClient};
pub use engine::{SyncEngine, SyncReport, SyncStats};
pub use error::SyncError;
