//! Error types for ferry-core.

use thiserror::Error;

use crate::protocol::Status;

/// Main error type for ferry operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from underlying system calls.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Codec error during chunk encoding/decoding.
    #[error("codec error: {message}")]
    Codec { message: String },

    /// Protocol violation or malformed chunk.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// A transfer with this ID is already active on the channel.
    #[error("transfer {0} is already active")]
    TransferActive(u32),

    /// All transfer context slots are in use.
    #[error("no free transfer context")]
    ContextsExhausted,

    /// A different handler already claims this transfer ID and direction.
    #[error("handler conflict for transfer {0}")]
    HandlerConflict(u32),

    /// The byte source or sink does not support repositioning.
    #[error("stream is not seekable")]
    NotSeekable,

    /// The local sink has no room for the requested bytes.
    #[error("out of space: need {needed} bytes, {available} available")]
    OutOfSpace { needed: u64, available: u64 },

    /// The stream handle has been closed.
    #[error("stream is closed")]
    StreamClosed,

    /// Transport layer error.
    #[error("transport error: {message}")]
    Transport { message: String },
}

impl Error {
    /// The wire status that describes this error to the peer.
    pub fn status(&self) -> Status {
        match self {
            Error::Io(_) | Error::OutOfSpace { .. } => Status::DataLoss,
            Error::Codec { .. } | Error::Protocol { .. } => Status::InvalidArgument,
            Error::TransferActive(_) | Error::StreamClosed => Status::FailedPrecondition,
            Error::ContextsExhausted => Status::ResourceExhausted,
            Error::HandlerConflict(_) => Status::AlreadyExists,
            Error::NotSeekable => Status::Unimplemented,
            Error::Transport { .. } => Status::Unavailable,
        }
    }
}

/// Convenience result type for ferry operations.
pub type Result<T> = std::result::Result<T, Error>;
