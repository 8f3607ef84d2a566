//! ferry-client: the client half of the ferry transfer protocol.
//!
//! A [`Client`] multiplexes transfers over the two named streams of one
//! channel. `read` pulls a blob from the peer into a local writer; `write`
//! pushes a blob from a local reader to the peer. Completion is reported
//! through a per-transfer callback.

mod client;

pub use client::Client;
