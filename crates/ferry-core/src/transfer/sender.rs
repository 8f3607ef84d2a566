//! Sending half of the transfer engine.
//!
//! The sender is entirely receiver-paced: it transmits only inside the most
//! recently granted window, honors the peer's chunk-size ceiling and pacing
//! delay, and repositions the source when the grant names an offset other
//! than its own (recovery).

use std::time::Instant;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::config::TransferConfig;
use crate::error::{Error, Result};
use crate::protocol::{Chunk, Status};
use crate::transport::{send_chunk, ChunkSink};

use super::context::{TransferContext, TransferState};

impl TransferContext {
    /// Apply a window grant and transmit into it.
    ///
    /// A fresh grant replaces the previous window wholesale: offset, budget,
    /// chunk-size ceiling, and pacing delay. A grant at an offset behind our
    /// own is a recovery request; serving it needs a seekable source.
    pub(crate) fn handle_parameters(
        &mut self,
        config: &TransferConfig,
        chunk: &Chunk,
        sink: &dyn ChunkSink,
        now: Instant,
    ) -> Result<()> {
        let Some(pending) = chunk.pending_bytes else {
            warn!(transfer_id = self.id, "grant chunk requests nothing");
            return self.fail_send(Status::InvalidArgument, sink);
        };
        if pending == 0 {
            warn!(transfer_id = self.id, "peer granted an empty window");
            return self.fail_send(Status::Internal, sink);
        }

        if chunk.offset != self.offset {
            let Some(endpoint) = self.endpoint.as_mut() else {
                return self.fail_send(Status::Internal, sink);
            };
            match endpoint.seek_source(chunk.offset) {
                Ok(()) => {
                    debug!(
                        transfer_id = self.id,
                        from = self.offset,
                        to = chunk.offset,
                        "repositioned source for recovery"
                    );
                    self.offset = chunk.offset;
                }
                Err(Error::NotSeekable) => {
                    warn!(transfer_id = self.id, "peer requested a seek on a non-seekable source");
                    return self.fail_send(Status::Unimplemented, sink);
                }
                Err(error) => {
                    warn!(transfer_id = self.id, %error, "source seek failed");
                    return self.fail_send(Status::DataLoss, sink);
                }
            }
        }

        self.pending_bytes = pending;
        self.max_chunk_size = chunk
            .max_chunk_size_bytes
            .map_or(config.max_chunk_size_bytes, |ceiling| {
                ceiling.min(config.max_chunk_size_bytes)
            });
        self.min_delay = std::time::Duration::from_micros(u64::from(
            chunk.min_delay_microseconds.unwrap_or(0),
        ));

        self.transmit(config, sink, now)
    }

    /// Emit data chunks until the window or the source runs out.
    fn transmit(
        &mut self,
        config: &TransferConfig,
        sink: &dyn ChunkSink,
        now: Instant,
    ) -> Result<()> {
        self.state = TransferState::Transmitting;
        let mut sent_any = false;

        while self.pending_bytes > 0 {
            if sent_any && !self.min_delay.is_zero() {
                // Receiver-requested pacing, applied on the emitting thread.
                std::thread::sleep(self.min_delay);
            }

            let budget = (self.pending_bytes as usize)
                .min(self.max_chunk_size as usize)
                .min(self.scratch.len());
            let Some(endpoint) = self.endpoint.as_mut() else {
                return self.fail_send(Status::Internal, sink);
            };
            let read = match endpoint.read(&mut self.scratch[..budget]) {
                Ok(read) => read,
                Err(error) => {
                    warn!(transfer_id = self.id, %error, "source read failed");
                    return self.fail_send(Status::DataLoss, sink);
                }
            };

            // Sources fill the buffer unless the blob has ended; a short
            // read is the end of the data.
            let at_end = read < budget;
            let chunk = Chunk::data(
                self.id,
                self.offset,
                Bytes::copy_from_slice(&self.scratch[..read]),
                at_end.then_some(0),
            );
            send_chunk(sink, &chunk)?;
            sent_any = true;
            self.offset += read as u64;
            self.pending_bytes -= read as u32;

            if at_end {
                debug!(
                    transfer_id = self.id,
                    offset = self.offset,
                    "blob fully transmitted; awaiting terminal status"
                );
                self.state = TransferState::Terminating;
                self.retries = 0;
                self.arm_deadline(config, now);
                return Ok(());
            }
        }

        debug!(
            transfer_id = self.id,
            offset = self.offset,
            "window exhausted; awaiting next grant"
        );
        self.state = TransferState::AwaitingWindow;
        self.retries = 0;
        self.arm_deadline(config, now);
        Ok(())
    }
}
