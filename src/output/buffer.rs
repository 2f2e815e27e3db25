//! Per-worker record buffer
//!
//! Each spawned worker owns one [`RecordBuffer`]; inline recursions borrow
//! their ancestor's. The buffer is never shared across threads, so appending
//! a record takes no lock. Only a flush reaches the shared output.

/// Capacity-capped byte buffer of encoded records
#[derive(Debug)]
pub struct RecordBuffer {
    data: Vec<u8>,
    capacity: usize,
}

impl RecordBuffer {
    /// Create a buffer that flushes once `capacity` bytes would be exceeded
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Would appending `len` more bytes exceed the flush threshold?
    ///
    /// An empty buffer accepts any record, so flush-then-append always
    /// succeeds even for a record larger than the threshold.
    pub fn would_overflow(&self, len: usize) -> bool {
        !self.data.is_empty() && self.data.len() + len > self.capacity
    }

    /// Append encoded bytes. Callers check [`would_overflow`](Self::would_overflow) first.
    pub fn push(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Flush threshold in bytes
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop the contents, keeping the allocation
    pub fn clear(&mut self) {
        self.data.clear();
    }
}
