//! Server-side transfer orchestration.

use std::sync::{Arc, PoisonError};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use ferry_core::config::TransferConfig;
use ferry_core::error::Result;
use ferry_core::handler::{Handler, SharedReadHandler, SharedWriteHandler};
use ferry_core::protocol::{Chunk, ChunkCodec, Status};
use ferry_core::transfer::{ContextPool, Endpoint, TransferContext, TransferRole, TransferState};
use ferry_core::transport::{send_chunk, ChunkSink, StreamDirection, StreamHandle, StreamTransport};
use ferry_core::work_queue::WorkQueue;

use crate::registry::HandlerRegistry;

/// Serving endpoint for one channel.
///
/// The transport feeds inbound frames to [`TransferService::process_chunk`];
/// any chunk that starts a transfer binds a context to the registered
/// handler for its ID. A new initiation for an already-active ID aborts the
/// prior transfer and restarts it (the aborted transfer's finalize runs
/// before the restart's prepare).
pub struct TransferService {
    config: TransferConfig,
    transport: Arc<dyn StreamTransport>,
    read_stream: StreamHandle,
    write_stream: StreamHandle,
    registry: HandlerRegistry,
    contexts: ContextPool,
    work_queue: Option<Arc<dyn WorkQueue>>,
}

/// Endpoint resolved for a new transfer, before activation.
enum ResolvedEndpoint {
    Read(SharedReadHandler),
    Write(SharedWriteHandler),
}

impl TransferService {
    /// Create a service over `transport`.
    pub fn new(config: TransferConfig, transport: Arc<dyn StreamTransport>) -> Self {
        let contexts = ContextPool::new(config.transfer_contexts);
        Self {
            config,
            transport,
            read_stream: StreamHandle::new(StreamDirection::Read),
            write_stream: StreamHandle::new(StreamDirection::Write),
            registry: HandlerRegistry::new(),
            contexts,
            work_queue: None,
        }
    }

    /// Offload payload processing to `work_queue` instead of running it on
    /// the transport thread.
    pub fn with_work_queue(mut self, work_queue: Arc<dyn WorkQueue>) -> Self {
        self.work_queue = Some(work_queue);
        self
    }

    /// Register a handler for its transfer ID.
    pub fn register_handler(&self, handler: Handler) -> Result<()> {
        self.registry.register(handler)
    }

    /// Remove the handler for `id`. Transfers already running keep their
    /// borrowed endpoint until they finish.
    pub fn unregister_handler(&self, id: u32) {
        self.registry.unregister(id);
    }

    /// The handler registry.
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Feed one inbound frame from the transport.
    pub fn process_chunk(&self, direction: StreamDirection, frame: &[u8]) -> Result<()> {
        // Decoding copies the payload out of the transport's buffer, so the
        // chunk can cross to a work queue without the original frame.
        let chunk = ChunkCodec::decode(frame)?;
        let transfer_id = chunk.transfer_id;
        let now = Instant::now();

        if let Some(slot) = self.contexts.find(transfer_id) {
            if chunk.is_initiating() {
                // A fresh initiation replaces the running transfer. The old
                // transfer's finalize runs before the new one's prepare.
                {
                    let mut ctx = slot.lock().unwrap_or_else(PoisonError::into_inner);
                    if ctx.state().is_active() {
                        debug!(transfer_id, "transfer replaced by new initiation");
                        ctx.finalize(Status::Aborted);
                    }
                    ctx.release();
                }
                return self.start_transfer(direction, chunk, now);
            }

            let sink = self.handle_for(direction).get_or_open(self.transport.as_ref())?;
            {
                let ctx = slot.lock().unwrap_or_else(PoisonError::into_inner);
                if ctx.role().direction() != direction {
                    drop(ctx);
                    warn!(transfer_id, %direction, "chunk on the wrong stream");
                    return send_chunk(
                        sink.as_ref(),
                        &Chunk::terminal(transfer_id, Status::FailedPrecondition),
                    );
                }
            }

            return match &self.work_queue {
                Some(work_queue) => {
                    let config = self.config.clone();
                    work_queue.enqueue(Box::new(move || {
                        let mut ctx = slot.lock().unwrap_or_else(PoisonError::into_inner);
                        if let Err(error) = drive(&mut ctx, &config, chunk, sink.as_ref()) {
                            warn!(transfer_id, %error, "deferred chunk processing failed");
                        }
                    }));
                    Ok(())
                }
                None => {
                    let mut ctx = slot.lock().unwrap_or_else(PoisonError::into_inner);
                    drive(&mut ctx, &self.config, chunk, sink.as_ref())
                }
            };
        }

        if chunk.is_initiating() {
            return self.start_transfer(direction, chunk, now);
        }

        if chunk.is_terminal() {
            // A status for a transfer already gone. Answering a terminal
            // with a terminal would bounce between endpoints forever.
            debug!(transfer_id, "terminal chunk for inactive transfer dropped");
            return Ok(());
        }

        warn!(transfer_id, %direction, "chunk for inactive transfer");
        self.send_status(direction, transfer_id, Status::FailedPrecondition)
    }

    /// Drive retransmission and expiry across all live transfers.
    pub fn tick(&self, now: Instant) {
        for slot in self.contexts.snapshot() {
            let mut ctx = slot.lock().unwrap_or_else(PoisonError::into_inner);
            if !ctx.state().is_live() {
                continue;
            }
            let Ok(sink) = self
                .handle_for(ctx.role().direction())
                .get_or_open(self.transport.as_ref())
            else {
                continue;
            };
            let transfer_id = ctx.id();
            if let Err(error) = ctx.on_tick(&self.config, now, sink.as_ref()) {
                warn!(transfer_id, %error, "timer processing failed");
            }
        }
    }

    /// Spawn a tokio task calling [`TransferService::tick`] every `period`.
    pub fn spawn_timer(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                service.tick(Instant::now());
            }
        })
    }

    /// Number of transfers currently holding a context slot.
    pub fn live_transfers(&self) -> usize {
        self.contexts.live_count()
    }

    fn handle_for(&self, direction: StreamDirection) -> &StreamHandle {
        match direction {
            StreamDirection::Read => &self.read_stream,
            StreamDirection::Write => &self.write_stream,
        }
    }

    fn send_status(&self, direction: StreamDirection, id: u32, status: Status) -> Result<()> {
        let sink = self.handle_for(direction).get_or_open(self.transport.as_ref())?;
        send_chunk(sink.as_ref(), &Chunk::terminal(id, status))
    }

    /// Bind a context for a newly initiated transfer and run its entry.
    fn start_transfer(&self, direction: StreamDirection, chunk: Chunk, now: Instant) -> Result<()> {
        let transfer_id = chunk.transfer_id;
        let sink = self.handle_for(direction).get_or_open(self.transport.as_ref())?;

        let resolved = match direction {
            StreamDirection::Read => self.registry.lookup_read(transfer_id).map(ResolvedEndpoint::Read),
            StreamDirection::Write => self
                .registry
                .lookup_write(transfer_id)
                .map(ResolvedEndpoint::Write),
        };
        let Some(resolved) = resolved else {
            let status = if self.registry.contains(transfer_id) {
                Status::PermissionDenied
            } else {
                Status::NotFound
            };
            warn!(transfer_id, %direction, %status, "cannot serve transfer");
            return send_chunk(sink.as_ref(), &Chunk::terminal(transfer_id, status));
        };

        let role = match direction {
            StreamDirection::Read => TransferRole::ReadServer,
            StreamDirection::Write => TransferRole::WriteServer,
        };
        let Ok(slot) = self.contexts.claim(transfer_id, role) else {
            warn!(transfer_id, "no free transfer context");
            return send_chunk(
                sink.as_ref(),
                &Chunk::terminal(transfer_id, Status::ResourceExhausted),
            );
        };

        let prepared = match &resolved {
            ResolvedEndpoint::Read(handler) => handler
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .prepare_read(),
            ResolvedEndpoint::Write(handler) => handler
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .prepare_write(),
        };
        if !prepared.is_ok() {
            warn!(transfer_id, status = %prepared, "handler prepare failed");
            slot.lock().unwrap_or_else(PoisonError::into_inner).release();
            return send_chunk(
                sink.as_ref(),
                &Chunk::terminal(transfer_id, Status::DataLoss),
            );
        }

        let endpoint = match resolved {
            ResolvedEndpoint::Read(handler) => Endpoint::ReadHandler(handler),
            ResolvedEndpoint::Write(handler) => Endpoint::WriteHandler(handler),
        };

        let mut ctx = slot.lock().unwrap_or_else(PoisonError::into_inner);
        ctx.activate(transfer_id, role, endpoint, None, &self.config, now);
        debug!(transfer_id, %direction, "transfer started");

        match direction {
            // The initiating chunk of a read transfer is the first window
            // grant; run it through the sending engine immediately.
            StreamDirection::Read => ctx.handle_chunk(&self.config, chunk, sink.as_ref(), now),
            // A write transfer starts with the service granting a window.
            StreamDirection::Write => ctx.start_receive(&self.config, sink.as_ref(), now),
        }
    }
}

/// Run one chunk through an established context.
fn drive(
    ctx: &mut TransferContext,
    config: &TransferConfig,
    chunk: Chunk,
    sink: &dyn ChunkSink,
) -> Result<()> {
    if ctx.state() == TransferState::Inactive {
        return Ok(());
    }
    ctx.handle_chunk(config, chunk, sink, Instant::now())
}
