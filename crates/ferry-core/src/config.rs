//! Transfer configuration shared between client and server.

use std::time::Duration;

use crate::constants::{
    DEFAULT_CHUNK_DATA_SIZE, DEFAULT_CHUNK_TIMEOUT, DEFAULT_MAX_PENDING_BYTES,
    DEFAULT_MAX_RETRIES, DEFAULT_TRANSFER_CONTEXTS,
};

/// Configuration for a transfer endpoint (either role).
///
/// The defaults mirror the size of the chunk data buffer: the receive window
/// never grants more than the endpoint can stage locally.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Ceiling on the receive window granted to the peer.
    pub max_pending_bytes: u32,
    /// Ceiling on the payload carried by a single data chunk.
    pub max_chunk_size_bytes: u32,
    /// Retransmit attempts before a transfer fails with a deadline error.
    pub max_retries: u8,
    /// Per-chunk deadline before a retransmit attempt.
    pub chunk_timeout: Duration,
    /// Number of concurrent transfer context slots (minimum 1).
    pub transfer_contexts: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_pending_bytes: DEFAULT_MAX_PENDING_BYTES,
            max_chunk_size_bytes: DEFAULT_CHUNK_DATA_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            chunk_timeout: DEFAULT_CHUNK_TIMEOUT,
            transfer_contexts: DEFAULT_TRANSFER_CONTEXTS,
        }
    }
}

impl TransferConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the receive window ceiling.
    pub fn with_max_pending_bytes(mut self, max: u32) -> Self {
        self.max_pending_bytes = max;
        self
    }

    /// Set the per-chunk payload ceiling.
    pub fn with_max_chunk_size_bytes(mut self, max: u32) -> Self {
        self.max_chunk_size_bytes = max;
        self
    }

    /// Set the retransmit attempt limit.
    pub fn with_max_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the per-chunk deadline.
    pub fn with_chunk_timeout(mut self, timeout: Duration) -> Self {
        self.chunk_timeout = timeout;
        self
    }

    /// Set the number of transfer context slots (clamped to at least 1).
    pub fn with_transfer_contexts(mut self, contexts: usize) -> Self {
        self.transfer_contexts = contexts.max(1);
        self
    }

    /// The window to grant a sender given the local sink's spare capacity.
    pub fn grant_window(&self, sink_capacity: u64) -> u32 {
        u64::from(self.max_pending_bytes).min(sink_capacity) as u32
    }
}
