//! Protocol types and wire format for ferry chunks.
//!
//! A transfer is a conversation of [`Chunk`] messages between a sender and a
//! receiver. The receiver paces the sender with parameters chunks (window
//! grants); the sender answers with data chunks; either side may end the
//! transfer with a terminal status chunk.

mod chunk;
mod status;
mod wire;

#[cfg(test)]
mod proptest;

pub use chunk::Chunk;
pub use status::Status;
pub use wire::ChunkCodec;
