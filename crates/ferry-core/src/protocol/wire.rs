//! Wire codec for chunk messages.
//!
//! Chunks are encoded as tagged, varint-delimited records (protobuf wire
//! format) so that fields may appear in any order and unknown fields are
//! skipped on decode. Field tags are fixed for on-the-wire compatibility:
//!
//! | tag | field |
//! |-----|-------|
//! | 1   | transfer_id |
//! | 2   | pending_bytes |
//! | 3   | max_chunk_size_bytes |
//! | 4   | min_delay_microseconds |
//! | 5   | offset |
//! | 6   | data |
//! | 7   | remaining_bytes |
//! | 8   | status |
//!
//! A chunk without a `transfer_id` is malformed. Framing (length prefixes,
//! packetization) belongs to the transport; this codec handles one message.

use bytes::{Bytes, BytesMut};
use prost::Message;

use crate::constants::MAX_FRAME_SIZE;
use crate::error::{Error, Result};
use crate::protocol::{Chunk, Status};

/// Wire-level mirror of [`Chunk`]. All fields are optional so that decode
/// can distinguish absent fields from zero values.
#[derive(Clone, PartialEq, Message)]
struct WireChunk {
    #[prost(uint32, optional, tag = "1")]
    transfer_id: Option<u32>,
    #[prost(uint32, optional, tag = "2")]
    pending_bytes: Option<u32>,
    #[prost(uint32, optional, tag = "3")]
    max_chunk_size_bytes: Option<u32>,
    #[prost(uint32, optional, tag = "4")]
    min_delay_microseconds: Option<u32>,
    #[prost(uint64, optional, tag = "5")]
    offset: Option<u64>,
    #[prost(bytes = "bytes", optional, tag = "6")]
    data: Option<Bytes>,
    #[prost(uint64, optional, tag = "7")]
    remaining_bytes: Option<u64>,
    #[prost(uint32, optional, tag = "8")]
    status: Option<u32>,
}

impl From<&Chunk> for WireChunk {
    fn from(chunk: &Chunk) -> Self {
        Self {
            transfer_id: Some(chunk.transfer_id),
            pending_bytes: chunk.pending_bytes,
            max_chunk_size_bytes: chunk.max_chunk_size_bytes,
            min_delay_microseconds: chunk.min_delay_microseconds,
            offset: (chunk.offset != 0).then_some(chunk.offset),
            data: (!chunk.data.is_empty()).then(|| chunk.data.clone()),
            remaining_bytes: chunk.remaining_bytes,
            status: chunk.status.map(Status::code),
        }
    }
}

/// Codec for the chunk wire format.
pub struct ChunkCodec;

impl ChunkCodec {
    /// Encode a chunk into a freshly allocated buffer.
    pub fn encode(chunk: &Chunk) -> Result<Bytes> {
        let wire = WireChunk::from(chunk);
        let len = wire.encoded_len();
        if len > MAX_FRAME_SIZE {
            return Err(Error::Codec {
                message: format!("chunk too large: {} bytes (max {})", len, MAX_FRAME_SIZE),
            });
        }

        let mut buf = BytesMut::with_capacity(len);
        wire.encode(&mut buf).map_err(|e| Error::Codec {
            message: format!("encoding failed: {e}"),
        })?;
        Ok(buf.freeze())
    }

    /// Encode a chunk into a fixed-size buffer, returning the encoded length.
    ///
    /// Fails with a codec error when the buffer is too small; the buffer
    /// contents are unspecified on failure.
    pub fn encode_into(chunk: &Chunk, buf: &mut [u8]) -> Result<usize> {
        let wire = WireChunk::from(chunk);
        let len = wire.encoded_len();
        if len > buf.len() {
            return Err(Error::Codec {
                message: format!("buffer too small: need {} bytes, have {}", len, buf.len()),
            });
        }

        let mut dst = &mut buf[..];
        wire.encode(&mut dst).map_err(|e| Error::Codec {
            message: format!("encoding failed: {e}"),
        })?;
        Ok(len)
    }

    /// Decode a chunk from a complete frame.
    ///
    /// Unknown fields are skipped. A frame without a `transfer_id` is
    /// malformed. Unrecognized status codes decode as [`Status::Unknown`].
    pub fn decode(frame: &[u8]) -> Result<Chunk> {
        if frame.len() > MAX_FRAME_SIZE {
            return Err(Error::Codec {
                message: format!(
                    "frame of {} bytes exceeds maximum {}",
                    frame.len(),
                    MAX_FRAME_SIZE
                ),
            });
        }

        let wire = WireChunk::decode(frame).map_err(|e| Error::Codec {
            message: format!("decoding failed: {e}"),
        })?;

        let transfer_id = wire.transfer_id.ok_or_else(|| Error::Codec {
            message: "chunk is missing transfer_id".into(),
        })?;

        Ok(Chunk {
            transfer_id,
            pending_bytes: wire.pending_bytes,
            max_chunk_size_bytes: wire.max_chunk_size_bytes,
            min_delay_microseconds: wire.min_delay_microseconds,
            offset: wire.offset.unwrap_or(0),
            data: wire.data.unwrap_or_default(),
            remaining_bytes: wire.remaining_bytes,
            status: wire.status.map(Status::from_code),
        })
    }
}
