//! Streaming compression for the output file
//!
//! The sink only depends on [`CompressionStream`]: feed ordered chunks,
//! write whatever compressed bytes come back, and call `finish` exactly once
//! at the end. Any streaming codec can sit behind it; zstd is the one we ship.

use crate::error::{SinkError, SinkResult};
use std::io::Write;

/// Valid zstd levels
pub const MIN_ZSTD_LEVEL: i32 = 1;
pub const MAX_ZSTD_LEVEL: i32 = 22;

/// Stateful streaming encoder
pub trait CompressionStream: Send {
    /// Compress one chunk, returning the bytes ready to be written (may be empty)
    fn compress_chunk(&mut self, input: &[u8]) -> SinkResult<Vec<u8>>;

    /// End the stream and return the trailing bytes. Valid once.
    fn finish(&mut self) -> SinkResult<Vec<u8>>;
}

/// Output compression setting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Plain CSV
    None,
    /// Single zstd frame
    Zstd { level: i32 },
}

impl Compression {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Compression::None)
    }

    /// Build the stream for this setting, if any
    pub fn stream(&self) -> SinkResult<Option<Box<dyn CompressionStream>>> {
        match *self {
            Compression::None => Ok(None),
            Compression::Zstd { level } => Ok(Some(Box::new(ZstdStream::new(level)?))),
        }
    }
}

/// zstd stream encoding into an in-memory staging vector
pub struct ZstdStream {
    encoder: zstd::stream::write::Encoder<'static, Vec<u8>>,
    finished: bool,
}

impl ZstdStream {
    pub fn new(level: i32) -> SinkResult<Self> {
        let encoder = zstd::stream::write::Encoder::new(Vec::new(), level)
            .map_err(|e| SinkError::Compression(format!("failed to create zstd encoder: {e}")))?;
        Ok(Self {
            encoder,
            finished: false,
        })
    }
}

impl CompressionStream for ZstdStream {
    fn compress_chunk(&mut self, input: &[u8]) -> SinkResult<Vec<u8>> {
        if self.finished {
            return Err(SinkError::Finalized);
        }
        self.encoder
            .write_all(input)
            .map_err(|e| SinkError::Compression(e.to_string()))?;
        Ok(std::mem::take(self.encoder.get_mut()))
    }

    fn finish(&mut self) -> SinkResult<Vec<u8>> {
        if self.finished {
            return Err(SinkError::Finalized);
        }
        self.finished = true;
        self.encoder
            .do_finish()
            .map_err(|e| SinkError::Compression(e.to_string()))?;
        Ok(std::mem::take(self.encoder.get_mut()))
    }
}
