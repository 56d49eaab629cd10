//! Bytes received before the back transport is ready

use bytes::{Bytes, BytesMut};
use std::collections::VecDeque;
use thiserror::Error;

/// Pending queue misuse
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PendingError {
    /// Data arrived after the queue was flushed
    #[error("Pending queue already flushed")]
    Frozen,
}

/// Ordered chunks held while a session is connecting
///
/// Flushed exactly once, as a single concatenated buffer, when the back
/// transport becomes ready. After that it accepts nothing.
#[derive(Debug, Default)]
pub struct PendingQueue {
    chunks: VecDeque<Bytes>,
    len: usize,
    frozen: bool,
}

impl PendingQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk; empty chunks are ignored
    pub fn push(&mut self, chunk: &[u8]) -> Result<(), PendingError> {
        if self.frozen {
            return Err(PendingError::Frozen);
        }
        if !chunk.is_empty() {
            self.len += chunk.len();
            self.chunks.push_back(Bytes::copy_from_slice(chunk));
        }
        Ok(())
    }

    /// Total queued bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of queued chunks
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the queue has been flushed
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Concatenate everything queued, in arrival order, and refuse further data
    pub fn flush_and_freeze(&mut self) -> Result<Bytes, PendingError> {
        if self.frozen {
            return Err(PendingError::Frozen);
        }
        self.frozen = true;

        let mut out = BytesMut::with_capacity(self.len);
        for chunk in self.chunks.drain(..) {
            out.extend_from_slice(&chunk);
        }
        self.len = 0;
        Ok(out.freeze())
    }
}
