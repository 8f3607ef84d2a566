//! Application-supplied transfer endpoints.
//!
//! A handler binds a transfer ID to a local byte store and a pair of
//! lifecycle hooks. Rather than a class hierarchy, capabilities are a small
//! struct of optional read/write halves: a read-only handler carries only
//! the read half, a write-only handler only the write half, and a
//! read-write handler both (a given transfer still uses one direction).
//!
//! The application owns its handlers; the service holds shared references
//! for the lifetime of the transfers that use them.

use std::sync::{Arc, Mutex};

use crate::protocol::Status;
use crate::stream::{TransferReader, TransferWriter};
use crate::transport::StreamDirection;

/// Server-side source endpoint for read transfers.
pub trait ReadHandler: Send {
    /// Called before the first byte of every (re)started read transfer.
    /// Must reset the source position to zero. A non-OK status aborts the
    /// transfer with a data-loss error on the wire.
    fn prepare_read(&mut self) -> Status;

    /// Called exactly once per successful prepare, with the final status.
    fn finalize_read(&mut self, status: Status);

    /// The byte source for the active transfer.
    fn reader(&mut self) -> &mut dyn TransferReader;
}

/// Server-side sink endpoint for write transfers.
pub trait WriteHandler: Send {
    /// Called before the first byte of every (re)started write transfer.
    /// Must reset the sink position to zero.
    fn prepare_write(&mut self) -> Status;

    /// Called exactly once per successful prepare, with the data-completion
    /// status. Returning non-OK downgrades the transfer's wire status to a
    /// data-loss error (the finalize itself is not retried).
    fn finalize_write(&mut self, status: Status) -> Status;

    /// The byte sink for the active transfer.
    fn writer(&mut self) -> &mut dyn TransferWriter;
}

/// Shared reference to a read endpoint.
pub type SharedReadHandler = Arc<Mutex<dyn ReadHandler>>;

/// Shared reference to a write endpoint.
pub type SharedWriteHandler = Arc<Mutex<dyn WriteHandler>>;

/// Capability record binding a transfer ID to its endpoints.
#[derive(Clone)]
pub struct Handler {
    id: u32,
    read: Option<SharedReadHandler>,
    write: Option<SharedWriteHandler>,
}

impl Handler {
    /// A handler serving only read transfers.
    pub fn read_only(id: u32, read: SharedReadHandler) -> Self {
        Self {
            id,
            read: Some(read),
            write: None,
        }
    }

    /// A handler serving only write transfers.
    pub fn write_only(id: u32, write: SharedWriteHandler) -> Self {
        Self {
            id,
            read: None,
            write: Some(write),
        }
    }

    /// A handler serving both directions.
    pub fn read_write(id: u32, read: SharedReadHandler, write: SharedWriteHandler) -> Self {
        Self {
            id,
            read: Some(read),
            write: Some(write),
        }
    }

    /// The transfer ID this handler serves.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Whether this handler can serve `direction`.
    pub fn supports(&self, direction: StreamDirection) -> bool {
        match direction {
            StreamDirection::Read => self.read.is_some(),
            StreamDirection::Write => self.write.is_some(),
        }
    }

    /// The read endpoint, if present.
    pub fn read_endpoint(&self) -> Option<&SharedReadHandler> {
        self.read.as_ref()
    }

    /// The write endpoint, if present.
    pub fn write_endpoint(&self) -> Option<&SharedWriteHandler> {
        self.write.as_ref()
    }
}
