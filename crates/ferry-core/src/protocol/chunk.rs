//! The chunk message, unit of protocol exchange.

use bytes::Bytes;

use super::Status;

/// A single protocol message within a transfer.
///
/// Three semantic categories share this one shape:
///
/// - **parameters chunk**: receiver to sender, carries `pending_bytes` and
///   optionally `max_chunk_size_bytes` / `min_delay_microseconds`; grants a
///   flow-control window starting at `offset`.
/// - **data chunk**: sender to receiver, carries `data` at `offset`;
///   `remaining_bytes = 0` marks the last data chunk.
/// - **terminal chunk**: either direction, carries `status`; ends the
///   transfer. A chunk may combine data with `remaining_bytes = 0` or with a
///   final `status`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chunk {
    /// Transfer this chunk belongs to. Required on the wire.
    pub transfer_id: u32,
    /// Receiver to sender: additional bytes accepted starting at `offset`.
    pub pending_bytes: Option<u32>,
    /// Receiver to sender: ceiling for `data` length per chunk.
    pub max_chunk_size_bytes: Option<u32>,
    /// Receiver to sender: optional pacing delay between data chunks.
    pub min_delay_microseconds: Option<u32>,
    /// Byte offset of `data` within the blob (or of the window being granted).
    pub offset: u64,
    /// Payload bytes.
    pub data: Bytes,
    /// Sender to receiver: bytes still to come after this chunk; 0 means
    /// this is the last data chunk.
    pub remaining_bytes: Option<u64>,
    /// Final status of the transfer.
    pub status: Option<Status>,
}

impl Chunk {
    /// The bare chunk a client sends to start a write transfer.
    pub fn initiating(transfer_id: u32) -> Self {
        Self {
            transfer_id,
            ..Default::default()
        }
    }

    /// A window grant from receiver to sender.
    pub fn parameters(transfer_id: u32, offset: u64, pending_bytes: u32, max_chunk: u32) -> Self {
        Self {
            transfer_id,
            offset,
            pending_bytes: Some(pending_bytes),
            max_chunk_size_bytes: Some(max_chunk),
            ..Default::default()
        }
    }

    /// A terminal chunk ending the transfer with `status`.
    pub fn terminal(transfer_id: u32, status: Status) -> Self {
        Self {
            transfer_id,
            status: Some(status),
            ..Default::default()
        }
    }

    /// A payload-bearing chunk. `remaining` is 0 on the last data chunk.
    pub fn data(transfer_id: u32, offset: u64, data: Bytes, remaining: Option<u64>) -> Self {
        Self {
            transfer_id,
            offset,
            data,
            remaining_bytes: remaining,
            ..Default::default()
        }
    }

    /// Whether this is the first chunk of a (re)started transfer: window
    /// position zero, no payload, no end-of-data marker, no status. A
    /// read-initiating chunk also carries the initial window fields; a
    /// write-initiating chunk is bare.
    pub fn is_initiating(&self) -> bool {
        self.offset == 0
            && self.data.is_empty()
            && self.remaining_bytes.is_none()
            && self.status.is_none()
    }

    /// Whether this chunk ends the transfer.
    pub fn is_terminal(&self) -> bool {
        self.status.is_some()
    }

    /// Whether this chunk grants a transmission window.
    pub fn requests_transmission(&self) -> bool {
        self.pending_bytes.is_some()
    }

    /// Whether this is the last data chunk of the blob.
    pub fn is_final_data(&self) -> bool {
        self.remaining_bytes == Some(0)
    }
}
