//! Admission gate with backpressure.
//!
//! # Responsibilities
//! - Enforce the concurrency limit via semaphore
//! - Block submitters while the limit is reached
//! - Offer a non-blocking path that fails when saturated
//! - Stop admitting once closed

use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

use super::error::DispatchError;

/// A counting gate that limits how many tasks run at once.
///
/// When the limit is reached, `acquire` waits until a slot becomes
/// available. Slots return to the gate when their permit is dropped.
#[derive(Debug)]
pub struct AdmissionGate {
    slots: Arc<Semaphore>,
    limit: usize,
}

impl AdmissionGate {
    pub fn new(limit: NonZeroUsize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(limit.get())),
            limit: limit.get(),
        }
    }

    /// Wait for a slot.
    ///
    /// Returns a permit that must be held for the unit's lifetime.
    pub async fn acquire(&self) -> Result<AdmissionPermit, DispatchError> {
        let permit = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| DispatchError::Closed)?;

        tracing::trace!(
            available_slots = self.slots.available_permits(),
            "Admission slot acquired"
        );

        Ok(AdmissionPermit { _permit: permit })
    }

    /// Take a slot only if one is free right now.
    pub fn try_acquire(&self) -> Result<AdmissionPermit, DispatchError> {
        match self.slots.clone().try_acquire_owned() {
            Ok(permit) => Ok(AdmissionPermit { _permit: permit }),
            Err(TryAcquireError::NoPermits) => Err(DispatchError::Saturated),
            Err(TryAcquireError::Closed) => Err(DispatchError::Closed),
        }
    }

    /// Stop admitting. Waiting submitters are woken with `Closed`;
    /// permits already handed out stay valid.
    pub fn close(&self) {
        self.slots.close();
    }

    pub fn is_closed(&self) -> bool {
        self.slots.is_closed()
    }

    /// Get current free slots.
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    /// Get configured concurrency limit.
    pub fn limit(&self) -> usize {
        self.limit
    }
}

/// A permit representing one admission slot.
///
/// Dropping it releases the slot, including when the unit panics.
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}
