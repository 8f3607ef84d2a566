//! Receiving half of the transfer engine.
//!
//! The receiver paces the sender: it grants a window sized to the local
//! sink, lands in-order payload, detects drops by offset mismatch, and
//! answers the final data chunk with a terminal status.

use std::time::Instant;

use tracing::{debug, warn};

use crate::config::TransferConfig;
use crate::error::Result;
use crate::protocol::{Chunk, Status};
use crate::transport::{send_chunk, ChunkSink};

use super::context::{TransferContext, TransferState};

impl TransferContext {
    /// Grant the initial window for a newly started receive.
    pub fn start_receive(
        &mut self,
        config: &TransferConfig,
        sink: &dyn ChunkSink,
        now: Instant,
    ) -> Result<()> {
        self.state = TransferState::Pending;
        self.send_parameters(config, sink, now)
    }

    /// Emit a parameters chunk granting a window at the current offset.
    ///
    /// The grant is `min(configured ceiling, sink spare capacity)`. A zero
    /// grant cannot make progress: at entry that is a broken configuration
    /// (`Internal`); mid-transfer it means the sink ran out of room
    /// (`ResourceExhausted`).
    pub(crate) fn send_parameters(
        &mut self,
        config: &TransferConfig,
        sink: &dyn ChunkSink,
        now: Instant,
    ) -> Result<()> {
        let capacity = self
            .endpoint
            .as_ref()
            .map_or(0, |endpoint| endpoint.sink_capacity());
        let window = config.grant_window(capacity);
        if window == 0 {
            let status = if self.offset == 0 {
                Status::Internal
            } else {
                Status::ResourceExhausted
            };
            warn!(transfer_id = self.id, %status, "cannot grant a window");
            return self.fail_receive(config, status, sink, now);
        }

        self.pending_bytes = window;
        debug!(
            transfer_id = self.id,
            offset = self.offset,
            window,
            "granting window"
        );
        let grant = Chunk::parameters(
            self.id,
            self.offset,
            window,
            config.max_chunk_size_bytes,
        );
        self.arm_deadline(config, now);
        send_chunk(sink, &grant)
    }

    /// Apply one inbound data chunk.
    pub(crate) fn handle_inbound_data(
        &mut self,
        config: &TransferConfig,
        chunk: Chunk,
        sink: &dyn ChunkSink,
        now: Instant,
    ) -> Result<()> {
        if chunk.data.is_empty() && chunk.remaining_bytes.is_none() {
            // Neither payload, end-of-data marker, nor status: the chunk
            // requests nothing a receiver can act on.
            warn!(transfer_id = self.id, "malformed chunk on receiving side");
            return self.fail_receive(config, Status::InvalidArgument, sink, now);
        }

        if chunk.offset != self.offset {
            return self.handle_dropped_chunk(config, &chunk, sink, now);
        }

        // Forward progress: recovery (if any) is over.
        self.state = TransferState::Receiving;
        self.recovery_params_sent = false;
        self.last_bad_offset = None;
        self.retries = 0;

        if chunk.data.len() as u64 > u64::from(self.pending_bytes) {
            warn!(
                transfer_id = self.id,
                len = chunk.data.len(),
                window = self.pending_bytes,
                "sender overran the granted window"
            );
            return self.fail_receive(config, Status::Internal, sink, now);
        }

        if !chunk.data.is_empty() {
            let Some(endpoint) = self.endpoint.as_mut() else {
                return self.fail_receive(config, Status::Internal, sink, now);
            };
            if let Err(error) = endpoint.write(&chunk.data) {
                warn!(transfer_id = self.id, %error, "sink write failed");
                return self.fail_receive(config, Status::DataLoss, sink, now);
            }
            self.offset += chunk.data.len() as u64;
            self.pending_bytes -= chunk.data.len() as u32;
        }

        if let Some(status) = chunk.status {
            // Combined final confirmation: payload plus the sender's own
            // terminal status. Terminal chunks are not answered.
            self.finalize(status);
            self.final_status = Some(status);
            self.state = TransferState::Completed;
            self.arm_deadline(config, now);
            return Ok(());
        }

        if chunk.is_final_data() {
            return self.complete_receive(config, sink, now);
        }

        if self.pending_bytes == 0 {
            return self.send_parameters(config, sink, now);
        }

        self.arm_deadline(config, now);
        Ok(())
    }

    /// An out-of-order chunk: something in between was dropped.
    ///
    /// One re-grant is sent per drop. The exception is the peer repeating
    /// the chunk at the same wrong offset, which means it never saw the
    /// re-grant (dropped parameters rather than dropped data), so the grant
    /// goes out again.
    fn handle_dropped_chunk(
        &mut self,
        config: &TransferConfig,
        chunk: &Chunk,
        sink: &dyn ChunkSink,
        now: Instant,
    ) -> Result<()> {
        let repeated = self.last_bad_offset == Some(chunk.offset);
        self.state = TransferState::Recovery;
        self.last_bad_offset = Some(chunk.offset);

        if self.recovery_params_sent && !repeated {
            debug!(
                transfer_id = self.id,
                offset = chunk.offset,
                expected = self.offset,
                "discarding out-of-order chunk"
            );
            return Ok(());
        }

        debug!(
            transfer_id = self.id,
            offset = chunk.offset,
            expected = self.offset,
            repeated,
            "drop detected; re-requesting expected offset"
        );
        self.recovery_params_sent = true;
        self.send_parameters(config, sink, now)
    }

    /// All data landed: run finalize and answer with the terminal status.
    fn complete_receive(
        &mut self,
        config: &TransferConfig,
        sink: &dyn ChunkSink,
        now: Instant,
    ) -> Result<()> {
        let verdict = self.finalize(Status::Ok);
        let status = if verdict.is_ok() {
            Status::Ok
        } else {
            warn!(transfer_id = self.id, %verdict, "finalize rejected the data");
            Status::DataLoss
        };

        debug!(transfer_id = self.id, offset = self.offset, %status, "receive complete");
        self.final_status = Some(status);
        self.state = TransferState::Completed;
        self.arm_deadline(config, now);
        send_chunk(sink, &Chunk::terminal(self.id, status))
    }
}
