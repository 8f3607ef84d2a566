//! ferry-server: the serving half of the ferry transfer protocol.
//!
//! Applications register [`ferry_core::handler::Handler`] capabilities with
//! a [`TransferService`]; the transport feeds inbound frames to the service,
//! which runs the per-transfer engines against the registered endpoints.

mod registry;
mod service;

pub use registry::HandlerRegistry;
pub use service::TransferService;
