//! Client-side transfer orchestration.

use std::sync::{Arc, PoisonError};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use ferry_core::config::TransferConfig;
use ferry_core::error::{Error, Result};
use ferry_core::protocol::{Chunk, ChunkCodec, Status};
use ferry_core::stream::{TransferReader, TransferWriter};
use ferry_core::transfer::{
    CompletionCallback, ContextPool, Endpoint, TransferContext, TransferRole, TransferState,
};
use ferry_core::transport::{send_chunk, ChunkSink, StreamDirection, StreamHandle, StreamTransport};
use ferry_core::work_queue::WorkQueue;

/// Client endpoint for initiating transfers over one channel.
///
/// Inbound frames are fed in by the transport via [`Client::process_chunk`];
/// retransmission and expiry are driven by [`Client::tick`] (or the
/// [`Client::spawn_timer`] helper). Both streams are opened lazily, on the
/// first transfer that needs them.
pub struct Client {
    config: TransferConfig,
    transport: Arc<dyn StreamTransport>,
    read_stream: StreamHandle,
    write_stream: StreamHandle,
    contexts: ContextPool,
    work_queue: Option<Arc<dyn WorkQueue>>,
}

impl Client {
    /// Create a client over `transport`.
    pub fn new(config: TransferConfig, transport: Arc<dyn StreamTransport>) -> Self {
        let contexts = ContextPool::new(config.transfer_contexts);
        Self {
            config,
            transport,
            read_stream: StreamHandle::new(StreamDirection::Read),
            write_stream: StreamHandle::new(StreamDirection::Write),
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

    /// Start a read transfer: the peer's blob for `transfer_id` is written
    /// to `writer`, and `on_done` fires once with the final status.
    pub fn read(
        &self,
        transfer_id: u32,
        writer: Box<dyn TransferWriter>,
        on_done: CompletionCallback,
    ) -> Result<()> {
        self.reclaim_or_reject(transfer_id)?;
        let sink = self.read_stream.get_or_open(self.transport.as_ref())?;
        let slot = self.contexts.claim(transfer_id, TransferRole::ReadClient)?;

        let now = Instant::now();
        let mut ctx = slot.lock().unwrap_or_else(PoisonError::into_inner);
        ctx.activate(
            transfer_id,
            TransferRole::ReadClient,
            Endpoint::Writer(writer),
            Some(on_done),
            &self.config,
            now,
        );
        debug!(transfer_id, "starting read transfer");
        ctx.start_receive(&self.config, sink.as_ref(), now)
    }

    /// Start a write transfer: the blob from `reader` is sent to the peer
    /// under `transfer_id`, and `on_done` fires once with the final status.
    pub fn write(
        &self,
        transfer_id: u32,
        reader: Box<dyn TransferReader>,
        on_done: CompletionCallback,
    ) -> Result<()> {
        self.reclaim_or_reject(transfer_id)?;
        let sink = self.write_stream.get_or_open(self.transport.as_ref())?;
        let slot = self.contexts.claim(transfer_id, TransferRole::WriteClient)?;

        let now = Instant::now();
        let mut ctx = slot.lock().unwrap_or_else(PoisonError::into_inner);
        ctx.activate(
            transfer_id,
            TransferRole::WriteClient,
            Endpoint::Reader(reader),
            Some(on_done),
            &self.config,
            now,
        );
        debug!(transfer_id, "starting write transfer");
        send_chunk(sink.as_ref(), &Chunk::initiating(transfer_id))
    }

    /// Cancel an active transfer: the peer is told `Cancelled` and the
    /// completion callback fires with the same status.
    pub fn cancel(&self, transfer_id: u32) -> Result<()> {
        let Some(slot) = self.contexts.find(transfer_id) else {
            return Err(Error::Protocol {
                message: format!("transfer {transfer_id} is not active"),
            });
        };

        let mut ctx = slot.lock().unwrap_or_else(PoisonError::into_inner);
        let sink = self.handle_for(ctx.role().direction()).get()?;
        debug!(transfer_id, "cancelling transfer");
        let result = send_chunk(sink.as_ref(), &Chunk::terminal(transfer_id, Status::Cancelled));
        ctx.finish_local(Status::Cancelled);
        result
    }

    /// Feed one inbound frame from the transport.
    pub fn process_chunk(&self, direction: StreamDirection, frame: &[u8]) -> Result<()> {
        // Decoding copies the payload out of the transport's buffer, so the
        // chunk can cross to a work queue without the original frame.
        let chunk = ChunkCodec::decode(frame)?;
        let transfer_id = chunk.transfer_id;

        let Some(slot) = self.contexts.find(transfer_id) else {
            if chunk.is_terminal() {
                // A status for a transfer already gone. Answering a terminal
                // with a terminal would bounce between endpoints forever.
                debug!(transfer_id, "terminal chunk for inactive transfer dropped");
                return Ok(());
            }
            return self.reject_unknown(direction, transfer_id);
        };

        {
            let mut ctx = slot.lock().unwrap_or_else(PoisonError::into_inner);
            if ctx.role().direction() != direction {
                warn!(
                    transfer_id,
                    %direction,
                    "chunk arrived on the wrong stream for this transfer"
                );
                ctx.finish_local(Status::Internal);
                return Ok(());
            }
        }

        let sink = self.handle_for(direction).get()?;
        match &self.work_queue {
            Some(work_queue) => {
                let config = self.config.clone();
                work_queue.enqueue(Box::new(move || {
                    let mut ctx = slot.lock().unwrap_or_else(PoisonError::into_inner);
                    if let Err(error) = dispatch(&mut ctx, &config, chunk, sink.as_ref()) {
                        warn!(transfer_id, %error, "deferred chunk processing failed");
                    }
                }));
                Ok(())
            }
            None => {
                let mut ctx = slot.lock().unwrap_or_else(PoisonError::into_inner);
                dispatch(&mut ctx, &self.config, chunk, sink.as_ref())
            }
        }
    }

    /// Drive retransmission and expiry across all live transfers.
    pub fn tick(&self, now: Instant) {
        for slot in self.contexts.snapshot() {
            let mut ctx = slot.lock().unwrap_or_else(PoisonError::into_inner);
            if !ctx.state().is_live() {
                continue;
            }
            let Ok(sink) = self.handle_for(ctx.role().direction()).get() else {
                continue;
            };
            let transfer_id = ctx.id();
            if let Err(error) = ctx.on_tick(&self.config, now, sink.as_ref()) {
                warn!(transfer_id, %error, "timer processing failed");
            }
        }
    }

    /// Spawn a tokio task calling [`Client::tick`] every `period`.
    pub fn spawn_timer(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let client = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                client.tick(Instant::now());
            }
        })
    }

    /// Close one outbound stream. Transfers still using it fail with a
    /// precondition error on their next send.
    pub fn close(&self, direction: StreamDirection) {
        self.handle_for(direction).close();
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

    /// A completed context can be reclaimed for a new transfer under the
    /// same ID; an active one cannot.
    fn reclaim_or_reject(&self, transfer_id: u32) -> Result<()> {
        if let Some(slot) = self.contexts.find(transfer_id) {
            let mut ctx = slot.lock().unwrap_or_else(PoisonError::into_inner);
            if ctx.state().is_active() {
                return Err(Error::TransferActive(transfer_id));
            }
            ctx.release();
        }
        Ok(())
    }

    /// A chunk for a transfer this client never started (or one already
    /// finished): answer with a terminal precondition failure.
    fn reject_unknown(&self, direction: StreamDirection, transfer_id: u32) -> Result<()> {
        warn!(transfer_id, %direction, "chunk for unknown transfer");
        match self.handle_for(direction).get() {
            Ok(sink) => send_chunk(
                sink.as_ref(),
                &Chunk::terminal(transfer_id, Status::FailedPrecondition),
            ),
            // Stream never opened: nothing useful to say, and nowhere to
            // say it.
            Err(_) => Ok(()),
        }
    }
}

/// Run one chunk through a context (possibly after a work-queue hop).
fn dispatch(
    ctx: &mut TransferContext,
    config: &TransferConfig,
    chunk: Chunk,
    sink: &dyn ChunkSink,
) -> Result<()> {
    // The transfer may have finished between enqueue and execution.
    if ctx.state() == TransferState::Inactive {
        return Ok(());
    }
    ctx.handle_chunk(config, chunk, sink, Instant::now())
}
