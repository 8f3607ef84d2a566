//! ferry-core: protocol and transfer engines for ferry.
//!
//! This crate provides:
//! - Chunk message definitions and wire format codec
//! - Canonical status codes exchanged on the wire
//! - Reader/writer abstractions over local byte stores
//! - Handler capability types for server-side endpoints
//! - The sender and receiver transfer state machines
//! - Transport and work-queue seams
//! - Configuration, error types, and logging setup

pub mod config;
pub mod constants;
pub mod error;
pub mod handler;
pub mod logging;
pub mod protocol;
pub mod stream;
pub mod transfer;
pub mod transport;
pub mod work_queue;

pub use config::TransferConfig;
pub use error::{Error, Result};
pub use logging::{init_logging, LogFormat};
pub use protocol::{Chunk, ChunkCodec, Status};
