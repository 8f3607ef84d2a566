//! Fixed-capacity pool of transfer context slots.
//!
//! The pool index is guarded by one short-critical-section mutex; a located
//! context is then driven under its own lock, which is never held while the
//! pool lock is. Handler callbacks run with only the context lock held.

use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{Error, Result};

use super::context::{TransferContext, TransferRole};

/// Shared handle to one context slot.
pub type ContextSlot = Arc<Mutex<TransferContext>>;

/// Pool of per-transfer state, sized at construction.
pub struct ContextPool {
    slots: Mutex<Vec<ContextSlot>>,
}

impl ContextPool {
    /// Create a pool with `capacity` slots (clamped to at least 1).
    pub fn new(capacity: usize) -> Self {
        let slots = (0..capacity.max(1))
            .map(|_| Arc::new(Mutex::new(TransferContext::inactive())))
            .collect();
        Self {
            slots: Mutex::new(slots),
        }
    }

    /// Find the live context for `id`, if any.
    pub fn find(&self, id: u32) -> Option<ContextSlot> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots
            .iter()
            .find(|slot| {
                let ctx = slot.lock().unwrap_or_else(PoisonError::into_inner);
                ctx.state().is_live() && ctx.id() == id
            })
            .cloned()
    }

    /// Reserve a free slot for `id`. The slot is marked live before the pool
    /// lock drops so concurrent claims cannot double-book it; the caller
    /// completes activation under the slot's own lock.
    ///
    /// A `Completed` context is only a courtesy window for repeating its
    /// terminal status; a new transfer takes priority and evicts it. Only
    /// transfers still moving data count toward exhaustion.
    pub fn claim(&self, id: u32, role: TransferRole) -> Result<ContextSlot> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        for slot in slots.iter() {
            let mut ctx = slot.lock().unwrap_or_else(PoisonError::into_inner);
            if !ctx.state().is_live() {
                ctx.reserve(id, role);
                drop(ctx);
                return Ok(Arc::clone(slot));
            }
        }
        for slot in slots.iter() {
            let mut ctx = slot.lock().unwrap_or_else(PoisonError::into_inner);
            if !ctx.state().is_active() {
                ctx.release();
                ctx.reserve(id, role);
                drop(ctx);
                return Ok(Arc::clone(slot));
            }
        }
        Err(Error::ContextsExhausted)
    }

    /// Snapshot every slot, for timer sweeps.
    pub fn snapshot(&self) -> Vec<ContextSlot> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.iter().cloned().collect()
    }

    /// Number of occupied slots.
    pub fn live_count(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots
            .iter()
            .filter(|slot| {
                slot.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .state()
                    .is_live()
            })
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::TransferState;

    #[test]
    fn capacity_is_clamped_to_one() {
        let pool = ContextPool::new(0);
        assert!(pool.claim(1, TransferRole::ReadClient).is_ok());
        assert!(matches!(
            pool.claim(2, TransferRole::ReadClient),
            Err(Error::ContextsExhausted)
        ));
    }

    #[test]
    fn claim_and_find() {
        let pool = ContextPool::new(2);
        assert!(pool.find(5).is_none());

        let slot = pool.claim(5, TransferRole::WriteServer).unwrap();
        assert_eq!(slot.lock().unwrap().id(), 5);
        assert_eq!(pool.live_count(), 1);

        let found = pool.find(5).expect("claimed context is findable");
        assert!(Arc::ptr_eq(&slot, &found));
    }

    #[test]
    fn released_slot_is_reusable() {
        let pool = ContextPool::new(1);
        let slot = pool.claim(5, TransferRole::WriteServer).unwrap();
        assert!(pool.claim(6, TransferRole::WriteServer).is_err());

        slot.lock().unwrap().release();
        assert_eq!(pool.live_count(), 0);
        assert!(pool.find(5).is_none());

        let slot = pool.claim(6, TransferRole::WriteServer).unwrap();
        assert_eq!(slot.lock().unwrap().id(), 6);
        assert_eq!(slot.lock().unwrap().state(), TransferState::Pending);
    }

    #[test]
    fn completed_slot_is_evicted_by_a_new_claim() {
        let pool = ContextPool::new(1);
        let slot = pool.claim(5, TransferRole::WriteServer).unwrap();
        slot.lock().unwrap().state = TransferState::Completed;

        // A parked terminal-status window does not block fresh transfers.
        let slot = pool.claim(6, TransferRole::WriteServer).unwrap();
        assert_eq!(slot.lock().unwrap().id(), 6);
        assert!(pool.find(5).is_none());
    }

    #[test]
    fn snapshot_returns_every_slot() {
        let pool = ContextPool::new(3);
        pool.claim(1, TransferRole::ReadClient).unwrap();
        assert_eq!(pool.snapshot().len(), 3);
    }
}
