//! Admission gate bounding concurrently served search batches.
//!
//! The gate is a counting semaphore sized by `network.max_requests`. A caller
//! that finds no free slot waits in FIFO order instead of failing. Slots are
//! handed out as [`GatePermit`]s that return their slot exactly once, either
//! through [`GatePermit::release`] or when dropped, so a cancelled request or
//! an error path can never leak a slot or free one twice.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("admission gate is closed")]
pub struct GateClosed;

#[derive(Debug, Clone)]
pub struct AdmissionGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl AdmissionGate {
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "admission gate capacity must be > 0");

        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Free slots right now. Never exceeds [`capacity`](Self::capacity).
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn in_use(&self) -> usize {
        self.capacity - self.available()
    }

    /// Waits for a free slot. The wait is cancel safe: dropping the future
    /// gives up the place in the queue without taking a slot.
    pub async fn acquire(&self) -> Result<GatePermit, GateClosed> {
        tracing::trace!(
            available = self.available(),
            capacity = self.capacity,
            "Waiting for admission gate"
        );

        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| GateClosed)?;

        Ok(GatePermit {
            permit: Some(permit),
        })
    }

    /// Stops admitting. Pending and future `acquire` calls fail with [`GateClosed`];
    /// permits already handed out stay valid.
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }
}

/// One occupied gate slot.
#[derive(Debug)]
pub struct GatePermit {
    permit: Option<OwnedSemaphorePermit>,
}

impl GatePermit {
    /// Returns the slot to the gate. Returns `false` if it was already released.
    pub fn release(&mut self) -> bool {
        match self.permit.take() {
            Some(permit) => {
                drop(permit);
                true
            }
            None => {
                tracing::trace!("Admission gate slot was already released");
                false
            }
        }
    }
}
