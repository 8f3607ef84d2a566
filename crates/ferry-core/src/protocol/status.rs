//! Canonical status codes carried by terminal chunks.

use std::fmt;

/// Status of a transfer, exchanged on the wire as a small integer.
///
/// The numbering follows the canonical RPC status space so that codes are
/// stable across implementations. Unknown codes decode as [`Status::Unknown`]
/// rather than failing, which keeps old endpoints talking to newer peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Status {
    /// All data delivered.
    #[default]
    Ok,
    /// Peer requested termination.
    Cancelled,
    /// Unrecognized status code from the peer.
    Unknown,
    /// Malformed chunk or missing required field.
    InvalidArgument,
    /// Retry budget exhausted while waiting for the peer.
    DeadlineExceeded,
    /// No handler registered for the transfer ID.
    NotFound,
    /// A conflicting registration already exists.
    AlreadyExists,
    /// Handler does not support the requested direction.
    PermissionDenied,
    /// No free context slot, or the sink is out of space.
    ResourceExhausted,
    /// Chunk for a transfer that is not active, or arrived after completion.
    FailedPrecondition,
    /// Transfer replaced by a new initiation.
    Aborted,
    /// Offset or length outside the valid range.
    OutOfRange,
    /// Peer requested a seek on a non-seekable source.
    Unimplemented,
    /// Protocol invariant violated.
    Internal,
    /// Endpoint is temporarily unable to serve the transfer.
    Unavailable,
    /// Local reader or writer failure.
    DataLoss,
    /// Peer is not authenticated.
    Unauthenticated,
}

impl Status {
    /// The wire representation of this status.
    pub fn code(self) -> u32 {
        match self {
            Status::Ok => 0,
            Status::Cancelled => 1,
            Status::Unknown => 2,
            Status::InvalidArgument => 3,
            Status::DeadlineExceeded => 4,
            Status::NotFound => 5,
            Status::AlreadyExists => 6,
            Status::PermissionDenied => 7,
            Status::ResourceExhausted => 8,
            Status::FailedPrecondition => 9,
            Status::Aborted => 10,
            Status::OutOfRange => 11,
            Status::Unimplemented => 12,
            Status::Internal => 13,
            Status::Unavailable => 14,
            Status::DataLoss => 15,
            Status::Unauthenticated => 16,
        }
    }

    /// Decode a wire status code. Unknown codes map to [`Status::Unknown`].
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => Status::Ok,
            1 => Status::Cancelled,
            2 => Status::Unknown,
            3 => Status::InvalidArgument,
            4 => Status::DeadlineExceeded,
            5 => Status::NotFound,
            6 => Status::AlreadyExists,
            7 => Status::PermissionDenied,
            8 => Status::ResourceExhausted,
            9 => Status::FailedPrecondition,
            10 => Status::Aborted,
            11 => Status::OutOfRange,
            12 => Status::Unimplemented,
            13 => Status::Internal,
            14 => Status::Unavailable,
            15 => Status::DataLoss,
            16 => Status::Unauthenticated,
            _ => Status::Unknown,
        }
    }

    /// Whether this is the success status.
    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Ok => "ok",
            Status::Cancelled => "cancelled",
            Status::Unknown => "unknown",
            Status::InvalidArgument => "invalid argument",
            Status::DeadlineExceeded => "deadline exceeded",
            Status::NotFound => "not found",
            Status::AlreadyExists => "already exists",
            Status::PermissionDenied => "permission denied",
            Status::ResourceExhausted => "resource exhausted",
            Status::FailedPrecondition => "failed precondition",
            Status::Aborted => "aborted",
            Status::OutOfRange => "out of range",
            Status::Unimplemented => "unimplemented",
            Status::Internal => "internal",
            Status::Unavailable => "unavailable",
            Status::DataLoss => "data loss",
            Status::Unauthenticated => "unauthenticated",
        };
        f.write_str(name)
    }
}
