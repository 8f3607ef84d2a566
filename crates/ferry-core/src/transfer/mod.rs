//! Per-transfer state machines.
//!
//! A [`TransferContext`] owns everything one live transfer needs: role,
//! state, progress offsets, the flow-control window, and the bound endpoint.
//! The receiver half ([`receiver`]) paces the peer and lands bytes in the
//! local sink; the sender half ([`sender`]) honors window grants and emits
//! data chunks. Contexts live in a fixed-capacity [`ContextPool`] owned by
//! the orchestrator.
//!
//! Engines are event-driven and synchronous: they react to an inbound chunk
//! or a timer tick and emit zero or more outbound chunks before returning.

mod context;
mod pool;
mod receiver;
mod sender;

pub use context::{CompletionCallback, Endpoint, TransferContext, TransferRole, TransferState};
pub use pool::ContextPool;
