//! Test doubles for ferry: an in-memory chunk transport, instrumented
//! handlers, and completion probes.
//!
//! Nothing here touches a real network; frames land in shared queues that
//! tests inspect or pump into the opposite endpoint.

use std::sync::{Arc, Mutex};

use bytes::Bytes;

use ferry_core::error::Result;
use ferry_core::handler::{ReadHandler, WriteHandler};
use ferry_core::protocol::{Chunk, ChunkCodec, Status};
use ferry_core::stream::{MemoryReader, MemoryWriter, TransferReader, TransferWriter};
use ferry_core::transfer::CompletionCallback;
use ferry_core::transport::{ChunkSink, StreamDirection, StreamTransport};

// =============================================================================
// Chunk Queues
// =============================================================================

/// Shared FIFO of encoded frames; doubles as a capture sink.
///
/// Every frame ever sent is kept for inspection; [`ChunkQueue::drain_new`]
/// hands out only the frames not yet pumped to the other endpoint.
#[derive(Clone, Default)]
pub struct ChunkQueue {
    inner: Arc<Mutex<QueueInner>>,
}

#[derive(Default)]
struct QueueInner {
    frames: Vec<Bytes>,
    pumped: usize,
}

impl ChunkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every chunk sent so far, decoded, in order.
    pub fn chunks(&self) -> Vec<Chunk> {
        self.inner
            .lock()
            .unwrap()
            .frames
            .iter()
            .map(|frame| ChunkCodec::decode(frame).expect("captured frame decodes"))
            .collect()
    }

    /// The most recent chunk.
    pub fn last(&self) -> Chunk {
        self.chunks().last().expect("no chunks captured").clone()
    }

    /// Number of chunks sent so far.
    pub fn total(&self) -> usize {
        self.inner.lock().unwrap().frames.len()
    }

    /// Frames sent since the last drain, for pumping to the peer.
    pub fn drain_new(&self) -> Vec<Bytes> {
        let mut inner = self.inner.lock().unwrap();
        let fresh = inner.frames[inner.pumped..].to_vec();
        inner.pumped = inner.frames.len();
        fresh
    }
}

impl ChunkSink for ChunkQueue {
    fn send(&self, frame: Bytes) -> Result<()> {
        self.inner.lock().unwrap().frames.push(frame);
        Ok(())
    }
}

/// Transport whose streams deliver into per-direction [`ChunkQueue`]s.
pub struct QueueTransport {
    read: ChunkQueue,
    write: ChunkQueue,
}

impl QueueTransport {
    /// Build a transport plus handles to what gets sent on each stream.
    pub fn new() -> (Arc<Self>, ChunkQueue, ChunkQueue) {
        let read = ChunkQueue::new();
        let write = ChunkQueue::new();
        let transport = Arc::new(Self {
            read: read.clone(),
            write: write.clone(),
        });
        (transport, read, write)
    }
}

impl StreamTransport for QueueTransport {
    fn open(&self, direction: StreamDirection) -> Result<Arc<dyn ChunkSink>> {
        Ok(match direction {
            StreamDirection::Read => Arc::new(self.read.clone()),
            StreamDirection::Write => Arc::new(self.write.clone()),
        })
    }
}

// =============================================================================
// Instrumented Handlers
// =============================================================================

enum Source {
    Seekable(MemoryReader),
    NonSeekable(ferry_core::stream::NonSeekableReader<MemoryReader>),
}

/// Read endpoint over an in-memory blob, with hook accounting.
pub struct TestReadHandler {
    source: Source,
    /// Status returned by the next prepare call.
    pub prepare_result: Status,
    pub prepare_calls: usize,
    pub finalize_calls: usize,
    pub finalize_status: Option<Status>,
}

impl TestReadHandler {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            source: Source::Seekable(MemoryReader::new(data.into())),
            prepare_result: Status::Ok,
            prepare_calls: 0,
            finalize_calls: 0,
            finalize_status: None,
        }
    }

    /// A handler whose source refuses to seek.
    pub fn non_seekable(data: impl Into<Bytes>) -> Self {
        let mut handler = Self::new(data);
        let Source::Seekable(reader) = handler.source else {
            unreachable!()
        };
        handler.source = Source::NonSeekable(ferry_core::stream::NonSeekableReader(reader));
        handler
    }

    pub fn shared(data: impl Into<Bytes>) -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Self::new(data)))
    }
}

impl ReadHandler for TestReadHandler {
    fn prepare_read(&mut self) -> Status {
        self.prepare_calls += 1;
        if !self.prepare_result.is_ok() {
            return self.prepare_result;
        }
        match &mut self.source {
            Source::Seekable(reader) => reader.seek(0).map_or(Status::DataLoss, |_| Status::Ok),
            Source::NonSeekable(reader) => {
                reader.0.seek(0).map_or(Status::DataLoss, |_| Status::Ok)
            }
        }
    }

    fn finalize_read(&mut self, status: Status) {
        self.finalize_calls += 1;
        self.finalize_status = Some(status);
    }

    fn reader(&mut self) -> &mut dyn TransferReader {
        match &mut self.source {
            Source::Seekable(reader) => reader,
            Source::NonSeekable(reader) => reader,
        }
    }
}

/// Write endpoint over an in-memory buffer, with hook accounting.
pub struct TestWriteHandler {
    writer: MemoryWriter,
    /// Status returned by the next prepare call.
    pub prepare_result: Status,
    /// Status returned by finalize itself (not the recorded argument).
    pub finalize_result: Status,
    pub prepare_calls: usize,
    pub finalize_calls: usize,
    pub finalize_status: Option<Status>,
}

impl TestWriteHandler {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            writer: MemoryWriter::with_capacity(capacity),
            prepare_result: Status::Ok,
            finalize_result: Status::Ok,
            prepare_calls: 0,
            finalize_calls: 0,
            finalize_status: None,
        }
    }

    pub fn shared(capacity: usize) -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Self::with_capacity(capacity)))
    }

    /// Bytes landed so far.
    pub fn written(&self) -> Vec<u8> {
        self.writer.written().to_vec()
    }
}

impl WriteHandler for TestWriteHandler {
    fn prepare_write(&mut self) -> Status {
        self.prepare_calls += 1;
        if !self.prepare_result.is_ok() {
            return self.prepare_result;
        }
        self.writer.seek(0).map_or(Status::DataLoss, |_| Status::Ok)
    }

    fn finalize_write(&mut self, status: Status) -> Status {
        self.finalize_calls += 1;
        self.finalize_status = Some(status);
        self.finalize_result
    }

    fn writer(&mut self) -> &mut dyn TransferWriter {
        &mut self.writer
    }
}

// =============================================================================
// Client-Side Doubles
// =============================================================================

/// Writer handle the test keeps while the client owns the boxed copy.
#[derive(Clone)]
pub struct SharedWriter(Arc<Mutex<MemoryWriter>>);

impl SharedWriter {
    pub fn with_capacity(capacity: usize) -> Self {
        Self(Arc::new(Mutex::new(MemoryWriter::with_capacity(capacity))))
    }

    pub fn boxed(&self) -> Box<dyn TransferWriter> {
        Box::new(self.clone())
    }

    pub fn written(&self) -> Vec<u8> {
        self.0.lock().unwrap().written().to_vec()
    }
}

impl TransferWriter for SharedWriter {
    fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.0.lock().unwrap().write(buf)
    }

    fn remaining_capacity(&self) -> u64 {
        self.0.lock().unwrap().remaining_capacity()
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        self.0.lock().unwrap().seek(offset)
    }
}

/// Records the completion status a transfer finished with.
#[derive(Clone, Default)]
pub struct StatusProbe(Arc<Mutex<Option<Status>>>);

impl StatusProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// A completion callback feeding this probe.
    pub fn callback(&self) -> CompletionCallback {
        let probe = self.clone();
        Box::new(move |status| {
            *probe.0.lock().unwrap() = Some(status);
        })
    }

    /// The recorded status, if the transfer finished.
    pub fn get(&self) -> Option<Status> {
        *self.0.lock().unwrap()
    }
}

/// A deterministic test blob: bytes 0, 1, 2, ... truncated to `len`.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| i as u8).collect()
}
