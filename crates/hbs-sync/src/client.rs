//! Transfer client capability
//!
//! The sync engine consumes a remote file-transfer endpoint through the
//! [`TransferClient`] trait: connect, list, get, end, plus an abort handle
//! for cancelling an in-flight transfer. [`FtpTransferClient`] is the
//! production implementation over a blocking FTP session driven through
//! `spawn_blocking`, using Extended Passive Mode and binary transfers.

use async_trait::async_trait;
use hbs_common::config::FtpProfile;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use suppaftp::FtpStream;
use tracing::{debug, warn};

use crate::error::SyncError;

/// Read/write chunk size for streaming downloads
const COPY_CHUNK_SIZE: usize = 64 * 1024;

fn lock_ignore_poison<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Kind of a remote directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// One entry of a remote directory listing
///
/// Transient; produced by `list` and never persisted.
#[derive(Debug, Clone)]
pub struct RemoteEntry {
    /// Entry name (filename or directory name)
    pub name: String,

    /// File or directory
    pub kind: EntryKind,

    /// Size in bytes (0 when the listing did not carry one)
    pub size: u64,

    /// Modification time as reported by the listing, if available
    pub modified: Option<String>,
}

impl RemoteEntry {
    /// Parse a Unix-style FTP LIST line
    ///
    /// `-rw-r--r--   1 ftp ftp  1234 Jan 15 12:00 nightly.bak`
    pub fn parse(line: &str) -> Option<Self> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 9 {
            return None;
        }

        let kind = if parts[0].starts_with('d') {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        let size = parts[4].parse().unwrap_or(0);
        let modified = Some(parts[5..8].join(" "));
        // Names may contain spaces; everything after the time field is the name.
        let name = parts[8..].join(" ");

        Some(Self {
            name,
            kind,
            size,
            modified,
        })
    }

    /// Whether this entry is a regular file
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// Remote file-transfer capability consumed by the sync engine
#[async_trait]
pub trait TransferClient: Send {
    /// Establish the remote session
    async fn connect(&mut self) -> Result<(), SyncError>;

    /// List a remote directory
    async fn list(&mut self, remote_dir: &str) -> Result<Vec<RemoteEntry>, SyncError>;

    /// Download a remote file, writing the full content to `local_path`
    /// before returning
    async fn get(&mut self, remote_path: &str, local_path: &Path) -> Result<(), SyncError>;

    /// Abort the in-flight transfer, if any
    ///
    /// The transfer loop observes the abort and tears down its data
    /// connection; a timed-out transfer must not keep writing to the
    /// local temp file.
    fn abort(&self);

    /// Release the remote session
    async fn end(&mut self) -> Result<(), SyncError>;
}

/// FTP-backed transfer client
///
/// Holds one control session across calls. An aborted transfer tears the
/// session down; the next operation transparently re-establishes it.
pub struct FtpTransferClient {
    profile: FtpProfile,
    stream: Option<FtpStream>,
    // Token of the transfer currently in flight. Each `get` installs a
    // fresh one so aborting a timed-out transfer cannot outlive it and
    // cancel a later transfer by accident.
    abort_flag: std::sync::Mutex<Arc<AtomicBool>>,
}

impl FtpTransferClient {
    pub fn new(profile: FtpProfile) -> Self {
        Self {
            profile,
            stream: None,
            abort_flag: std::sync::Mutex::new(Arc::new(AtomicBool::new(false))),
        }
    }

    /// Open a fresh control session
    fn connect_sync(profile: &FtpProfile) -> Result<FtpStream, SyncError> {
        debug!("Connecting to FTP server: {}:{}", profile.host, profile.port);

        let mut stream = FtpStream::connect(format!("{}:{}", profile.host, profile.port))
            .map_err(|e| SyncError::Connect(e.to_string()))?;

        // Extended Passive Mode works better behind NAT/containers.
        stream.set_mode(suppaftp::Mode::ExtendedPassive);

        stream
            .login(&profile.username, &profile.password)
            .map_err(|e| SyncError::Connect(format!("login failed: {e}")))?;

        stream
            .transfer_type(suppaftp::types::FileType::Binary)
            .map_err(|e| SyncError::Connect(format!("failed to set binary mode: {e}")))?;

        Ok(stream)
    }

    /// Take the cached session, reconnecting if an abort tore it down
    fn take_session(&mut self) -> Result<FtpStream, SyncError> {
        match self.stream.take() {
            Some(stream) => Ok(stream),
            None => {
                warn!("FTP session not available, re-establishing");
                Self::connect_sync(&self.profile)
            },
        }
    }

    fn download_sync(
        stream: &mut FtpStream,
        remote_path: &str,
        local_path: &Path,
        abort: &AtomicBool,
    ) -> Result<(), SyncError> {
        let mut reader = stream
            .retr_as_stream(remote_path)
            .map_err(|e| SyncError::Protocol(format!("RETR {remote_path} failed: {e}")))?;

        let mut file = std::fs::File::create(local_path)?;
        let mut buf = [0u8; COPY_CHUNK_SIZE];
        loop {
            if abort.load(Ordering::Relaxed) {
                // Dropping the data stream closes the connection.
                return Err(SyncError::Aborted(remote_path.to_string()));
            }
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n])?;
        }

        stream
            .finalize_retr_stream(reader)
            .map_err(|e| SyncError::Protocol(format!("RETR {remote_path} did not finalize: {e}")))?;
        file.flush()?;
        Ok(())
    }
}

#[async_trait]
impl TransferClient for FtpTransferClient {
    async fn connect(&mut self) -> Result<(), SyncError> {
        let profile = self.profile.clone();
        let stream = tokio::task::spawn_blocking(move || Self::connect_sync(&profile))
            .await
            .map_err(|e| SyncError::Connect(format!("connect task panicked: {e}")))??;
        self.stream = Some(stream);
        Ok(())
    }

    async fn list(&mut self, remote_dir: &str) -> Result<Vec<RemoteEntry>, SyncError> {
        let mut stream = self.take_session()?;
        let remote_dir = remote_dir.to_string();

        let (stream, result) = tokio::task::spawn_blocking(move || {
            let result = stream
                .list(Some(&remote_dir))
                .map_err(|e| SyncError::Protocol(format!("LIST {remote_dir} failed: {e}")));
            (stream, result)
        })
        .await
        .map_err(|e| SyncError::Protocol(format!("LIST task panicked: {e}")))?;

        self.stream = Some(stream);
        let lines = result?;
        Ok(lines.iter().filter_map(|l| RemoteEntry::parse(l)).collect())
    }

    async fn get(&mut self, remote_path: &str, local_path: &Path) -> Result<(), SyncError> {
        let mut stream = self.take_session()?;
        let remote_path = remote_path.to_string();
        let local_path: PathBuf = local_path.to_path_buf();
        let abort = Arc::new(AtomicBool::new(false));
        *lock_ignore_poison(&self.abort_flag) = Arc::clone(&abort);

        let (stream, result) = tokio::task::spawn_blocking(move || {
            let result = Self::download_sync(&mut stream, &remote_path, &local_path, &abort);
            (stream, result)
        })
        .await
        .map_err(|e| SyncError::Protocol(format!("RETR task panicked: {e}")))?;

        self.stream = Some(stream);
        result
    }

    fn abort(&self) {
        lock_ignore_poison(&self.abort_flag).store(true, Ordering::Relaxed);
    }

    async fn end(&mut self) -> Result<(), SyncError> {
        if let Some(mut stream) = self.stream.take() {
            let quit = tokio::task::spawn_blocking(move || stream.quit())
                .await
                .map_err(|e| SyncError::Protocol(format!("QUIT task panicked: {e}")))?;
            if let Err(e) = quit {
                warn!("Failed to quit FTP session gracefully: {}", e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_file_entry() {
        let entry =
            RemoteEntry::parse("-rw-r--r--   1 ftp ftp  123456 Jan 15 12:00 nightly.bak").unwrap();
        assert_eq!(entry.name, "nightly.bak");
        assert!(entry.is_file());
        assert_eq!(entry.size, 123456);
        assert_eq!(entry.modified.as_deref(), Some("Jan 15 12:00"));
    }

    #[test]
    fn test_parse_directory_entry() {
        let entry =
            RemoteEntry::parse("drwxr-xr-x   2 ftp ftp  4096 Jan 15 12:00 archive").unwrap();
        assert_eq!(entry.name, "archive");
        assert_eq!(entry.kind, EntryKind::Directory);
        assert!(!entry.is_file());
    }

    #[test]
    fn test_parse_name_with_spaces() {
        let entry =
            RemoteEntry::parse("-rw-r--r--   1 ftp ftp  99 Jan 15 12:00 weekly full.bak").unwrap();
        assert_eq!(entry.name, "weekly full.bak");
        assert_eq!(entry.size, 99);
    }

    #[test]
    fn test_parse_short_line() {
        assert!(RemoteEntry::parse("").is_none());
        assert!(RemoteEntry::parse("total 12").is_none());
    }
}
