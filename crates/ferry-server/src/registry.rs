//! Registry mapping transfer IDs to handler capabilities.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use ferry_core::error::{Error, Result};
use ferry_core::handler::{Handler, SharedReadHandler, SharedWriteHandler};
use ferry_core::transport::StreamDirection;

/// Thread-safe lookup table from transfer ID to [`Handler`].
///
/// Registration is idempotent per (id, direction) for the same endpoint
/// object; registering a *different* endpoint for an already-claimed
/// (id, direction) fails. Complementary directions for one ID may be
/// registered separately and are merged.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: Mutex<HashMap<u32, Handler>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or merge) a handler for its transfer ID.
    pub fn register(&self, handler: Handler) -> Result<()> {
        let id = handler.id();
        let mut handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);

        match handlers.entry(id) {
            Entry::Vacant(entry) => {
                debug!(transfer_id = id, "handler registered");
                entry.insert(handler);
                Ok(())
            }
            Entry::Occupied(mut entry) => {
                let merged = merge(entry.get(), &handler)?;
                entry.insert(merged);
                debug!(transfer_id = id, "handler registration merged");
                Ok(())
            }
        }
    }

    /// Remove the handler for `id`, if any.
    pub fn unregister(&self, id: u32) {
        let mut handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
        if handlers.remove(&id).is_some() {
            debug!(transfer_id = id, "handler unregistered");
        }
    }

    /// Whether any handler claims `id` (in either direction).
    pub fn contains(&self, id: u32) -> bool {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }

    /// The read endpoint for `id`, if registered.
    pub fn lookup_read(&self, id: u32) -> Option<SharedReadHandler> {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .and_then(|handler| handler.read_endpoint().cloned())
    }

    /// The write endpoint for `id`, if registered.
    pub fn lookup_write(&self, id: u32) -> Option<SharedWriteHandler> {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .and_then(|handler| handler.write_endpoint().cloned())
    }

    /// Whether the handler for `id` supports `direction`.
    pub fn supports(&self, id: u32, direction: StreamDirection) -> bool {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .is_some_and(|handler| handler.supports(direction))
    }
}

/// Combine an existing registration with a new one for the same ID.
fn merge(existing: &Handler, incoming: &Handler) -> Result<Handler> {
    let id = existing.id();

    let read = combine(
        id,
        existing.read_endpoint().cloned(),
        incoming.read_endpoint().cloned(),
        |a, b| Arc::ptr_eq(a, b),
    )?;
    let write = combine(
        id,
        existing.write_endpoint().cloned(),
        incoming.write_endpoint().cloned(),
        |a, b| Arc::ptr_eq(a, b),
    )?;

    Ok(match (read, write) {
        (Some(read), Some(write)) => Handler::read_write(id, read, write),
        (Some(read), None) => Handler::read_only(id, read),
        (None, Some(write)) => Handler::write_only(id, write),
        (None, None) => {
            // Handlers always carry at least one capability.
            return Err(Error::HandlerConflict(id));
        }
    })
}

fn combine<T>(
    id: u32,
    existing: Option<T>,
    incoming: Option<T>,
    same: impl Fn(&T, &T) -> bool,
) -> Result<Option<T>> {
    match (existing, incoming) {
        (Some(a), Some(b)) if same(&a, &b) => Ok(Some(a)),
        (Some(_), Some(_)) => Err(Error::HandlerConflict(id)),
        (Some(a), None) => Ok(Some(a)),
        (None, b) => Ok(b),
    }
}
