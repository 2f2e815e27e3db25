//! Shared output sink
//!
//! One file, one optional compression stream, one lock. Workers fill their
//! own [`RecordBuffer`] without locking and only take the output lock to hand
//! a full buffer over.
//!
//! # Lifecycle
//!
//! ```text
//! create ──► header ──► flush* ──► finalize (stream trailer, close)
//!                                      │
//!                                      └─► state moved out; later flushes
//!                                          fail with SinkError::Finalized
//! ```
//!
//! Finalize moves the file and stream out of the lock, so it can run at most
//! once and nothing can write to the file afterwards.

use crate::error::{SinkError, SinkResult};
use crate::output::buffer::RecordBuffer;
use crate::output::compress::{Compression, CompressionStream};
use crate::output::record::CSV_HEADER;
use parking_lot::Mutex;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, warn};

/// Statistics about write operations
#[derive(Debug, Default)]
pub struct SinkStats {
    /// Buffers handed to the output
    pub flushes: AtomicU64,

    /// Uncompressed bytes accepted (header included)
    pub bytes_in: AtomicU64,

    /// Bytes written to the file
    pub bytes_out: AtomicU64,

    /// Flushes rejected because the sink was already finalized
    pub late_flushes: AtomicU64,
}

impl SinkStats {
    pub fn bytes_out(&self) -> u64 {
        self.bytes_out.load(Ordering::Relaxed)
    }

    pub fn late_flushes(&self) -> u64 {
        self.late_flushes.load(Ordering::Relaxed)
    }
}

/// What finalize produced
#[derive(Debug, Clone)]
pub struct SinkSummary {
    pub path: PathBuf,
    pub compressed: bool,
    pub flushes: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

struct OutputState {
    file: File,
    stream: Option<Box<dyn CompressionStream>>,
    poisoned: Option<String>,
}

impl OutputState {
    /// Write one chunk, through the stream when compressing. Returns bytes written to the file.
    fn write_chunk(&mut self, bytes: &[u8], path: &Path) -> SinkResult<u64> {
        match self.stream.as_mut() {
            Some(stream) => {
                let compressed = stream.compress_chunk(bytes)?;
                write_file(&mut self.file, &compressed, path)?;
                Ok(compressed.len() as u64)
            }
            None => {
                write_file(&mut self.file, bytes, path)?;
                Ok(bytes.len() as u64)
            }
        }
    }
}

fn write_file(file: &mut File, bytes: &[u8], path: &Path) -> SinkResult<()> {
    file.write_all(bytes).map_err(|source| SinkError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// The output file shared by every worker
pub struct OutputSink {
    path: PathBuf,
    compressed: bool,
    state: Mutex<Option<OutputState>>,
    stats: SinkStats,
}

impl OutputSink {
    /// Create (truncate) the output file and write the header
    pub fn create(path: &Path, compression: Compression) -> SinkResult<Self> {
        let file = File::create(path).map_err(|source| SinkError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut state = OutputState {
            file,
            stream: compression.stream()?,
            poisoned: None,
        };

        let written = state.write_chunk(CSV_HEADER.as_bytes(), path)?;

        let stats = SinkStats::default();
        stats.bytes_in.store(CSV_HEADER.len() as u64, Ordering::Relaxed);
        stats.bytes_out.store(written, Ordering::Relaxed);

        debug!(path = %path.display(), compressed = compression.is_enabled(), "Output opened");

        Ok(Self {
            path: path.to_path_buf(),
            compressed: compression.is_enabled(),
            state: Mutex::new(Some(state)),
            stats,
        })
    }

    /// Append one encoded record, flushing first if it would not fit
    pub fn append(&self, buffer: &mut RecordBuffer, record: &[u8]) -> SinkResult<()> {
        if buffer.would_overflow(record.len()) {
            self.flush(buffer)?;
        }
        buffer.push(record);
        Ok(())
    }

    /// Hand the buffer's bytes to the output and reset it
    pub fn flush(&self, buffer: &mut RecordBuffer) -> SinkResult<()> {
        if buffer.is_empty() {
            return Ok(());
        }

        let mut guard = self.state.lock();
        let state = match guard.as_mut() {
            Some(state) => state,
            None => {
                self.stats.late_flushes.fetch_add(1, Ordering::Relaxed);
                warn!(bytes = buffer.len(), "Flush after finalize rejected");
                return Err(SinkError::Finalized);
            }
        };

        if let Some(reason) = &state.poisoned {
            return Err(SinkError::Poisoned(reason.clone()));
        }

        match state.write_chunk(buffer.as_bytes(), &self.path) {
            Ok(written) => {
                self.stats.flushes.fetch_add(1, Ordering::Relaxed);
                self.stats.bytes_in.fetch_add(buffer.len() as u64, Ordering::Relaxed);
                self.stats.bytes_out.fetch_add(written, Ordering::Relaxed);
            }
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "Output write failed");
                state.poisoned = Some(e.to_string());
                return Err(e);
            }
        }
        drop(guard);

        buffer.clear();
        Ok(())
    }

    /// Write the stream trailer and close the file. Succeeds at most once.
    pub fn finalize(&self) -> SinkResult<SinkSummary> {
        let mut guard = self.state.lock();
        let mut state = guard.take().ok_or(SinkError::Finalized)?;

        if let Some(reason) = state.poisoned.take() {
            return Err(SinkError::Poisoned(reason));
        }

        if let Some(stream) = state.stream.as_mut() {
            let trailer = stream.finish()?;
            write_file(&mut state.file, &trailer, &self.path)?;
            self.stats.bytes_out.fetch_add(trailer.len() as u64, Ordering::Relaxed);
        }

        state.file.flush().map_err(|source| SinkError::Io {
            path: self.path.clone(),
            source,
        })?;
        drop(state);

        debug!(path = %self.path.display(), "Output finalized");

        Ok(SinkSummary {
            path: self.path.clone(),
            compressed: self.compressed,
            flushes: self.stats.flushes.load(Ordering::Relaxed),
            bytes_in: self.stats.bytes_in.load(Ordering::Relaxed),
            bytes_out: self.stats.bytes_out.load(Ordering::Relaxed),
        })
    }

    pub fn stats(&self) -> &SinkStats {
        &self.stats
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
