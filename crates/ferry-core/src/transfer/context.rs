//! The per-transfer context record and chunk routing.

use std::sync::PoisonError;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::TransferConfig;
use crate::error::{Error, Result};
use crate::handler::{SharedReadHandler, SharedWriteHandler};
use crate::protocol::{Chunk, Status};
use crate::stream::{TransferReader, TransferWriter};
use crate::transport::{send_chunk, ChunkSink, StreamDirection};

/// Invoked exactly once when a client-originated transfer finishes.
pub type CompletionCallback = Box<dyn FnOnce(Status) + Send>;

/// The byte store bound to a transfer.
///
/// Client transfers own their reader/writer outright; server transfers
/// borrow the endpoint from the registered handler so that prepare/finalize
/// hooks and the byte store stay together.
pub enum Endpoint {
    /// Client-owned source (write transfers).
    Reader(Box<dyn TransferReader>),
    /// Client-owned sink (read transfers).
    Writer(Box<dyn TransferWriter>),
    /// Server-side source borrowed from a read handler.
    ReadHandler(SharedReadHandler),
    /// Server-side sink borrowed from a write handler.
    WriteHandler(SharedWriteHandler),
}

impl Endpoint {
    pub(crate) fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self {
            Endpoint::Reader(reader) => reader.read(buf),
            Endpoint::ReadHandler(handler) => handler
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .reader()
                .read(buf),
            _ => Err(Error::Protocol {
                message: "endpoint is not readable".into(),
            }),
        }
    }

    pub(crate) fn seek_source(&mut self, offset: u64) -> Result<()> {
        match self {
            Endpoint::Reader(reader) => reader.seek(offset),
            Endpoint::ReadHandler(handler) => handler
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .reader()
                .seek(offset),
            _ => Err(Error::Protocol {
                message: "endpoint is not readable".into(),
            }),
        }
    }

    pub(crate) fn write(&mut self, buf: &[u8]) -> Result<()> {
        match self {
            Endpoint::Writer(writer) => writer.write(buf),
            Endpoint::WriteHandler(handler) => handler
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .writer()
                .write(buf),
            _ => Err(Error::Protocol {
                message: "endpoint is not writable".into(),
            }),
        }
    }

    pub(crate) fn sink_capacity(&self) -> u64 {
        match self {
            Endpoint::Writer(writer) => writer.remaining_capacity(),
            Endpoint::WriteHandler(handler) => handler
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .writer()
                .remaining_capacity(),
            _ => 0,
        }
    }
}

/// Which quadrant of the protocol this context runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferRole {
    /// Server side of a read transfer: sends blob data.
    ReadServer,
    /// Server side of a write transfer: receives blob data.
    WriteServer,
    /// Client side of a read transfer: receives blob data.
    ReadClient,
    /// Client side of a write transfer: sends blob data.
    WriteClient,
}

impl TransferRole {
    /// Whether this role emits data chunks.
    pub fn is_sender(self) -> bool {
        matches!(self, TransferRole::ReadServer | TransferRole::WriteClient)
    }

    /// The named stream this role's transfer runs on.
    pub fn direction(self) -> StreamDirection {
        match self {
            TransferRole::ReadServer | TransferRole::ReadClient => StreamDirection::Read,
            TransferRole::WriteServer | TransferRole::WriteClient => StreamDirection::Write,
        }
    }
}

/// Lifecycle of a transfer context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    /// Slot is free.
    Inactive,
    /// Receiver: window granted, no data seen yet.
    Pending,
    /// Receiver: accepting in-order data.
    Receiving,
    /// Receiver: a drop was detected; discarding until the expected offset
    /// comes back around.
    Recovery,
    /// Sender: actively emitting data chunks.
    Transmitting,
    /// Sender: window exhausted (or not yet granted), waiting on the peer.
    AwaitingWindow,
    /// Sender: final data chunk emitted, waiting for the terminal status.
    Terminating,
    /// Terminal status emitted; the context lingers to resend it to a
    /// retrying peer, then the slot is reclaimed on timeout.
    Completed,
}

impl TransferState {
    /// Whether the slot is occupied at all.
    pub fn is_live(self) -> bool {
        self != TransferState::Inactive
    }

    /// Whether the engine is still exchanging data (not parked).
    pub fn is_active(self) -> bool {
        !matches!(self, TransferState::Inactive | TransferState::Completed)
    }
}

/// State for one live transfer. See the module docs for the event model.
pub struct TransferContext {
    pub(crate) id: u32,
    pub(crate) role: TransferRole,
    pub(crate) state: TransferState,
    /// Receiver: bytes landed in the sink. Sender: bytes emitted.
    pub(crate) offset: u64,
    /// Remaining window: granted (receiver) or usable (sender).
    pub(crate) pending_bytes: u32,
    pub(crate) max_chunk_size: u32,
    pub(crate) min_delay: Duration,
    pub(crate) endpoint: Option<Endpoint>,
    pub(crate) on_completion: Option<CompletionCallback>,
    /// Staging buffer for outbound payload reads, sized to the chunk budget.
    pub(crate) scratch: Vec<u8>,
    /// One recovery grant per drop; reset on forward progress.
    pub(crate) recovery_params_sent: bool,
    /// Offset of the most recent out-of-order chunk, for detecting the peer
    /// re-sending the same chunk (its copy of our grant was lost).
    pub(crate) last_bad_offset: Option<u64>,
    /// Terminal status already emitted, resent to a retrying peer.
    pub(crate) final_status: Option<Status>,
    pub(crate) finalized: bool,
    pub(crate) retries: u8,
    pub(crate) deadline: Option<Instant>,
}

impl TransferContext {
    /// An empty slot.
    pub fn inactive() -> Self {
        Self {
            id: 0,
            role: TransferRole::ReadClient,
            state: TransferState::Inactive,
            offset: 0,
            pending_bytes: 0,
            max_chunk_size: 0,
            min_delay: Duration::ZERO,
            endpoint: None,
            on_completion: None,
            scratch: Vec::new(),
            recovery_params_sent: false,
            last_bad_offset: None,
            final_status: None,
            finalized: false,
            retries: 0,
            deadline: None,
        }
    }

    /// Reserve this slot for `id` before full activation. Keeps the slot
    /// from being claimed twice between the pool scan and activation.
    pub(crate) fn reserve(&mut self, id: u32, role: TransferRole) {
        self.id = id;
        self.role = role;
        self.state = if role.is_sender() {
            TransferState::AwaitingWindow
        } else {
            TransferState::Pending
        };
        self.deadline = None;
    }

    /// Bind the endpoint and reset all per-transfer progress.
    pub fn activate(
        &mut self,
        id: u32,
        role: TransferRole,
        endpoint: Endpoint,
        on_completion: Option<CompletionCallback>,
        config: &TransferConfig,
        now: Instant,
    ) {
        self.reserve(id, role);
        self.offset = 0;
        self.pending_bytes = 0;
        self.max_chunk_size = config.max_chunk_size_bytes;
        self.min_delay = Duration::ZERO;
        self.endpoint = Some(endpoint);
        self.on_completion = on_completion;
        self.scratch = if role.is_sender() {
            vec![0; config.max_chunk_size_bytes as usize]
        } else {
            Vec::new()
        };
        self.recovery_params_sent = false;
        self.last_bad_offset = None;
        self.final_status = None;
        self.finalized = false;
        self.retries = 0;
        self.deadline = Some(now + config.chunk_timeout);
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn role(&self) -> TransferRole {
        self.role
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    /// Bytes landed (receiver) or emitted (sender) so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Remaining flow-control window.
    pub fn pending_bytes(&self) -> u32 {
        self.pending_bytes
    }

    /// Route an inbound chunk to the right half of the engine.
    pub fn handle_chunk(
        &mut self,
        config: &TransferConfig,
        chunk: Chunk,
        sink: &dyn ChunkSink,
        now: Instant,
    ) -> Result<()> {
        if self.state == TransferState::Completed {
            return self.handle_when_completed(&chunk, sink);
        }

        if let Some(status) = chunk.status {
            // A receiver applies any payload riding along with the final
            // confirmation; for a sender the status alone ends the transfer.
            if self.role.is_sender() || chunk.data.is_empty() {
                debug!(
                    transfer_id = self.id,
                    %status,
                    "transfer terminated by peer"
                );
                self.finish_local(status);
                return Ok(());
            }
        }

        if self.role.is_sender() {
            if !chunk.data.is_empty() {
                warn!(transfer_id = self.id, "data chunk received by sending side");
                return self.fail_send(Status::InvalidArgument, sink);
            }
            self.handle_parameters(config, &chunk, sink, now)
        } else {
            self.handle_inbound_data(config, chunk, sink, now)
        }
    }

    /// Chunks arriving after this side already emitted a terminal status.
    fn handle_when_completed(&mut self, chunk: &Chunk, sink: &dyn ChunkSink) -> Result<()> {
        if chunk.is_terminal() {
            // Peer echoing the end of the transfer; nothing left to do.
            return Ok(());
        }
        if chunk.is_final_data() {
            // The peer retried its last chunk, so our terminal status was
            // lost. Repeat it without reopening the transfer.
            let status = self.final_status.unwrap_or(Status::Ok);
            debug!(transfer_id = self.id, %status, "re-sending terminal status");
            return send_chunk(sink, &Chunk::terminal(self.id, status));
        }
        send_chunk(sink, &Chunk::terminal(self.id, Status::FailedPrecondition))
    }

    /// Run the lifecycle hooks exactly once and report the hook's verdict.
    pub fn finalize(&mut self, status: Status) -> Status {
        if self.finalized {
            return Status::Ok;
        }
        self.finalized = true;

        let verdict = match &self.endpoint {
            Some(Endpoint::ReadHandler(handler)) => {
                handler
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .finalize_read(status);
                Status::Ok
            }
            Some(Endpoint::WriteHandler(handler)) => handler
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .finalize_write(status),
            _ => Status::Ok,
        };

        if let Some(on_completion) = self.on_completion.take() {
            on_completion(status);
        }
        verdict
    }

    /// Finish without emitting anything: the peer already knows.
    pub fn finish_local(&mut self, status: Status) {
        self.finalize(status);
        self.release();
    }

    /// Sender-side failure: tell the peer, finalize, free the slot.
    pub(crate) fn fail_send(&mut self, status: Status, sink: &dyn ChunkSink) -> Result<()> {
        let result = send_chunk(sink, &Chunk::terminal(self.id, status));
        self.finalize(status);
        self.release();
        result
    }

    /// Receiver-side failure: tell the peer, finalize, park in `Completed`
    /// so the terminal status can be repeated to a retrying sender.
    pub(crate) fn fail_receive(
        &mut self,
        config: &TransferConfig,
        status: Status,
        sink: &dyn ChunkSink,
        now: Instant,
    ) -> Result<()> {
        let result = send_chunk(sink, &Chunk::terminal(self.id, status));
        self.finalize(status);
        self.final_status = Some(status);
        self.state = TransferState::Completed;
        self.arm_deadline(config, now);
        result
    }

    /// Return the slot to the pool.
    pub fn release(&mut self) {
        self.state = TransferState::Inactive;
        self.endpoint = None;
        self.on_completion = None;
        self.scratch = Vec::new();
        self.deadline = None;
    }

    pub(crate) fn arm_deadline(&mut self, config: &TransferConfig, now: Instant) {
        self.deadline = Some(now + config.chunk_timeout);
    }

    /// Drive retransmission and expiry. Called periodically by the
    /// orchestrator's timer.
    pub fn on_tick(
        &mut self,
        config: &TransferConfig,
        now: Instant,
        sink: &dyn ChunkSink,
    ) -> Result<()> {
        let Some(deadline) = self.deadline else {
            return Ok(());
        };
        if now < deadline {
            return Ok(());
        }

        match self.state {
            TransferState::Pending | TransferState::Receiving | TransferState::Recovery => {
                if self.retries >= config.max_retries {
                    warn!(transfer_id = self.id, "receive deadline exhausted");
                    return self.fail_receive(config, Status::DeadlineExceeded, sink, now);
                }
                self.retries += 1;
                debug!(
                    transfer_id = self.id,
                    retries = self.retries,
                    "re-sending window grant after timeout"
                );
                self.send_parameters(config, sink, now)
            }
            TransferState::Terminating => {
                if self.retries >= config.max_retries {
                    warn!(transfer_id = self.id, "no terminal status from peer");
                    self.finish_local(Status::DeadlineExceeded);
                    return Ok(());
                }
                self.retries += 1;
                self.arm_deadline(config, now);
                debug!(
                    transfer_id = self.id,
                    retries = self.retries,
                    "re-sending final chunk after timeout"
                );
                send_chunk(
                    sink,
                    &Chunk::data(self.id, self.offset, bytes::Bytes::new(), Some(0)),
                )
            }
            TransferState::Transmitting | TransferState::AwaitingWindow => {
                if self.retries >= config.max_retries {
                    warn!(transfer_id = self.id, "no window grant from peer");
                    self.finish_local(Status::DeadlineExceeded);
                    return Ok(());
                }
                self.retries += 1;
                self.arm_deadline(config, now);
                if self.role == TransferRole::WriteClient && self.offset == 0 {
                    // The initiating chunk may have been lost before any
                    // grant arrived; repeating it restarts the handshake.
                    debug!(transfer_id = self.id, "re-sending initiating chunk");
                    return send_chunk(sink, &Chunk::initiating(self.id));
                }
                Ok(())
            }
            TransferState::Completed => {
                debug!(transfer_id = self.id, "idempotent-status window closed");
                self.release();
                Ok(())
            }
            TransferState::Inactive => Ok(()),
        }
    }
}
