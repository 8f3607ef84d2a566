//! Injected executor seam for offloading payload work.
//!
//! The transport thread must never be held for local I/O. When an
//! orchestrator is configured with a work queue, the decoded (owned) chunk
//! and the engine step cross to the queue as a job; the inbound framed
//! buffer is never needed past the decode. Jobs for one channel are executed
//! in submission order, which preserves per-transfer chunk ordering.
//!
//! There is no global executor: the queue is a capability handed to the
//! orchestrator at construction.

use tokio::sync::mpsc;
use tracing::debug;

/// A unit of deferred work.
pub type Job = Box<dyn FnOnce() + Send>;

/// Executor capability for payload copying and reader/writer I/O.
pub trait WorkQueue: Send + Sync {
    /// Enqueue a job. Jobs are run in submission order.
    fn enqueue(&self, job: Job);
}

/// Runs jobs immediately on the calling thread. The default when no
/// executor is injected.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineWorkQueue;

impl WorkQueue for InlineWorkQueue {
    fn enqueue(&self, job: Job) {
        job();
    }
}

/// Serial work queue draining on a dedicated blocking task.
///
/// A single consumer preserves submission order. Must be started from
/// within a tokio runtime.
pub struct TokioWorkQueue {
    tx: mpsc::UnboundedSender<Job>,
}

impl TokioWorkQueue {
    /// Start the queue's worker task.
    pub fn start() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        tokio::task::spawn_blocking(move || {
            while let Some(job) = rx.blocking_recv() {
                job();
            }
            debug!("work queue drained and closed");
        });
        Self { tx }
    }
}

impl WorkQueue for TokioWorkQueue {
    fn enqueue(&self, job: Job) {
        // A closed queue means shutdown; late jobs are dropped with it.
        let _ = self.tx.send(job);
    }
}
