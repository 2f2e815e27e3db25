//! Error types for pwalk
//!
//! This module defines the error hierarchy that covers:
//! - Configuration and CLI errors
//! - Output sink errors (write, compression, finalize ordering)
//! - Worker thread errors
//! - Recoverable per-entry and per-directory scan errors
//!
//! Design philosophy:
//! - Use thiserror for structured error types in library code
//! - Sink failures are fatal and unwind to the caller
//! - Scan errors never unwind; they are collected and returned with the result

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::{debug, warn};

/// Top-level error type for pwalk
#[derive(Error, Debug)]
pub enum WalkerError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Output sink errors (always fatal)
    #[error("Output error: {0}")]
    Sink(#[from] SinkError),

    /// Worker/concurrency errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    /// I/O errors outside the sink (reading an existing output, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid thread count
    #[error("Invalid thread count {count}: must be between 1 and {max}")]
    InvalidThreadCount { count: usize, max: usize },

    /// Invalid buffer size
    #[error("Invalid buffer size {size}: must be between {min} and {max} bytes")]
    InvalidBufferSize { size: usize, min: usize, max: usize },

    /// Invalid compression level
    #[error("Invalid compression level {level}: must be between {min} and {max}")]
    InvalidCompressionLevel { level: i32, min: i32, max: i32 },

    /// Invalid exclude pattern
    #[error("Invalid exclude pattern '{pattern}': {reason}")]
    InvalidExcludePattern { pattern: String, reason: String },

    /// Scan root missing or not a directory
    #[error("Invalid scan root '{path}': {reason}")]
    InvalidRoot { path: PathBuf, reason: String },

    /// Output path error
    #[error("Invalid output path '{path}': {reason}")]
    InvalidOutputPath { path: PathBuf, reason: String },
}

/// Output sink errors
///
/// Any of these aborts the scan: a half-written compressed stream cannot be
/// resumed.
#[derive(Error, Debug)]
pub enum SinkError {
    /// Failed to create or write the output file
    #[error("Failed to write '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Compression stream failed
    #[error("Compression failed: {0}")]
    Compression(String),

    /// An earlier flush failed; the stream is no longer usable
    #[error("Output stream is poisoned by an earlier failure: {0}")]
    Poisoned(String),

    /// Write or finalize attempted after the sink was finalized
    #[error("Output stream already finalized")]
    Finalized,
}

/// Worker thread errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Could not start the root worker thread
    #[error("Failed to spawn worker for '{path}': {reason}")]
    SpawnFailed { path: PathBuf, reason: String },

    /// One or more workers panicked
    #[error("{count} worker thread(s) panicked; output is incomplete")]
    Panicked { count: usize },
}

/// Result type alias for WalkerError
pub type Result<T> = std::result::Result<T, WalkerError>;

/// Result type alias for SinkError
pub type SinkResult<T> = std::result::Result<T, SinkError>;

/// Where a recoverable error happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanErrorKind {
    /// Opening or reading a directory failed; its subtree was skipped
    ReadDir,
    /// Metadata lookup for a single entry failed; the entry was skipped
    Metadata,
}

/// A recoverable error reported while walking
#[derive(Debug, Clone)]
pub struct ScanError {
    /// Path of the entry or directory
    pub path: PathBuf,

    /// Which operation failed
    pub kind: ScanErrorKind,

    /// OS error code, when there is one
    pub code: Option<i32>,

    /// Portable classification of the failure
    pub io_kind: io::ErrorKind,

    /// Human readable message
    pub message: String,
}

impl ScanError {
    pub fn new(path: &Path, kind: ScanErrorKind, err: &io::Error) -> Self {
        Self {
            path: path.to_path_buf(),
            kind,
            code: err.raw_os_error(),
            io_kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// Permission denied and vanished entries are expected on live filesystems
    pub fn is_routine(&self) -> bool {
        matches!(
            self.io_kind,
            io::ErrorKind::PermissionDenied | io::ErrorKind::NotFound
        )
    }
}

/// Sink for recoverable `(path, error)` pairs
///
/// Backed by an unbounded channel so reporting never takes a lock and never
/// blocks a worker.
#[derive(Debug)]
pub struct ErrorCollector {
    sender: Sender<ScanError>,
    receiver: Receiver<ScanError>,
    count: AtomicU64,
}

impl ErrorCollector {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            sender,
            receiver,
            count: AtomicU64::new(0),
        }
    }

    /// Record a failure for `path`
    pub fn report(&self, path: &Path, kind: ScanErrorKind, err: &io::Error) {
        let scan_error = ScanError::new(path, kind, err);

        if scan_error.is_routine() {
            debug!(path = %path.display(), error = %err, "Skipping entry");
        } else {
            warn!(path = %path.display(), error = %err, "Skipping entry");
        }

        self.count.fetch_add(1, Ordering::Relaxed);
        // The receiver lives in self, so the channel cannot be disconnected
        let _ = self.sender.send(scan_error);
    }

    /// Number of errors reported so far
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Take every error reported so far
    pub fn drain(&self) -> Vec<ScanError> {
        self.receiver.try_iter().collect()
    }
}

impl Default for ErrorCollector {
    fn default() -> Self {
        Self::new()
    }
}
