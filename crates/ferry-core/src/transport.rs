//! Transport seams between the orchestrators and the framing layer.
//!
//! The transport owns packetization and delivery; the core only needs a way
//! to enqueue an encoded chunk on one of the two named streams, and the
//! transport calls back into the orchestrator with each inbound frame.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::protocol::{Chunk, ChunkCodec};

/// The two named bidirectional streams a channel carries.
///
/// `Read` moves blob data from server to client (client-origin window
/// grants); `Write` moves blob data from client to server (server-origin
/// window grants). Handler capabilities are keyed by the same direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamDirection {
    /// Server sends data; client receives.
    Read,
    /// Client sends data; server receives.
    Write,
}

impl fmt::Display for StreamDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamDirection::Read => f.write_str("read"),
            StreamDirection::Write => f.write_str("write"),
        }
    }
}

/// Outbound half of a stream: enqueue one encoded chunk frame.
pub trait ChunkSink: Send + Sync {
    /// Enqueue a framed message for delivery. Ordering is preserved per
    /// stream; delivery itself may fail later without notice (the protocol's
    /// retransmission handles loss).
    fn send(&self, frame: Bytes) -> Result<()>;
}

/// Encode `chunk` and enqueue it on `sink`.
pub fn send_chunk(sink: &dyn ChunkSink, chunk: &Chunk) -> Result<()> {
    sink.send(ChunkCodec::encode(chunk)?)
}

/// Factory for the outbound halves of the two streams.
///
/// Orchestrators open each direction lazily, on the first transfer that
/// needs it.
pub trait StreamTransport: Send + Sync {
    /// Open (or return the existing) outbound half for `direction`.
    fn open(&self, direction: StreamDirection) -> Result<Arc<dyn ChunkSink>>;
}

/// A lazily opened, closeable handle to one outbound stream.
///
/// Once closed, every operation fails with [`Error::StreamClosed`] until the
/// handle is reopened; transfers racing a close observe a failed
/// precondition rather than a hung stream.
pub struct StreamHandle {
    direction: StreamDirection,
    state: Mutex<HandleState>,
}

enum HandleState {
    Unopened,
    Open(Arc<dyn ChunkSink>),
    Closed,
}

impl StreamHandle {
    /// Create an unopened handle for `direction`.
    pub fn new(direction: StreamDirection) -> Self {
        Self {
            direction,
            state: Mutex::new(HandleState::Unopened),
        }
    }

    /// The direction this handle serves.
    pub fn direction(&self) -> StreamDirection {
        self.direction
    }

    /// Return the sink, opening the stream on first use.
    pub fn get_or_open(&self, transport: &dyn StreamTransport) -> Result<Arc<dyn ChunkSink>> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match &*state {
            HandleState::Open(sink) => Ok(Arc::clone(sink)),
            HandleState::Closed => Err(Error::StreamClosed),
            HandleState::Unopened => {
                let sink = transport.open(self.direction)?;
                *state = HandleState::Open(Arc::clone(&sink));
                Ok(sink)
            }
        }
    }

    /// Return the sink only if the stream is already open.
    pub fn get(&self) -> Result<Arc<dyn ChunkSink>> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match &*state {
            HandleState::Open(sink) => Ok(Arc::clone(sink)),
            _ => Err(Error::StreamClosed),
        }
    }

    /// Whether the stream is currently open.
    pub fn is_open(&self) -> bool {
        matches!(
            &*self.state.lock().unwrap_or_else(PoisonError::into_inner),
            HandleState::Open(_)
        )
    }

    /// Close the handle. Subsequent operations fail until [`Self::reopen`].
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state = HandleState::Closed;
    }

    /// Allow the handle to be opened again.
    pub fn reopen(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(&*state, HandleState::Closed) {
            *state = HandleState::Unopened;
        }
    }
}
