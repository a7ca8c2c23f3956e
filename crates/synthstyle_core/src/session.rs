//! crates/synthstyle_core/src/session.rs
//!
//! Defines the state owned by the background context for its long-running
//! operations (virtual try-on and body scans) along with the product cache.

use crate::cache::ProductCache;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Idle,
    Requested,
    InProgress,
    Completed,
    Failed,
}

impl OperationState {
    pub fn is_busy(self) -> bool {
        matches!(self, OperationState::Requested | OperationState::InProgress)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("{0} already in progress")]
    AlreadyInProgress(&'static str),
}

//=========================================================================================
// Operation Slot
//=========================================================================================

/// Tracks one kind of long-running operation. At most one may be active at a time;
/// a second request while one is active is rejected, never queued.
#[derive(Debug, Clone)]
pub struct OperationSlot {
    name: &'static str,
    state: Arc<Mutex<OperationState>>,
}

impl OperationSlot {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Arc::new(Mutex::new(OperationState::Idle)),
        }
    }

    pub fn state(&self) -> OperationState {
        *self.lock()
    }

    /// Claims the slot, moving it to `Requested`.
    pub fn begin(&self) -> Result<OperationTicket, SessionError> {
        let mut state = self.lock();
        if state.is_busy() {
            return Err(SessionError::AlreadyInProgress(self.name));
        }
        *state = OperationState::Requested;
        debug!("{} requested.", self.name);
        Ok(OperationTicket {
            slot: self.clone(),
            finished: false,
        })
    }

    fn set(&self, next: OperationState) {
        *self.lock() = next;
        debug!("{} is now {:?}.", self.name, next);
    }

    fn lock(&self) -> MutexGuard<'_, OperationState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Proof of a claimed slot. Dropping an unfinished ticket marks the operation failed.
#[derive(Debug)]
pub struct OperationTicket {
    slot: OperationSlot,
    finished: bool,
}

impl OperationTicket {
    pub fn start(&self) {
        self.slot.set(OperationState::InProgress);
    }

    pub fn complete(mut self) {
        self.finished = true;
        self.slot.set(OperationState::Completed);
    }

    pub fn fail(mut self) {
        self.finished = true;
        self.slot.set(OperationState::Failed);
    }
}

impl Drop for OperationTicket {
    fn drop(&mut self) {
        if !self.finished {
            self.slot.set(OperationState::Failed);
        }
    }
}

//=========================================================================================
// Background Session
//=========================================================================================

/// Everything the background context keeps between messages. Created once at
/// start-up and shared with handlers by reference.
#[derive(Debug, Clone)]
pub struct BackgroundSession {
    pub product_cache: ProductCache,
    pub try_on: OperationSlot,
    pub scan: OperationSlot,
}

impl BackgroundSession {
    pub fn new() -> Self {
        Self {
            product_cache: ProductCache::new(),
            try_on: OperationSlot::new("Try-on"),
            scan: OperationSlot::new("Scan"),
        }
    }
}

impl Default for BackgroundSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_walks_through_its_states() {
        let slot = OperationSlot::new("Try-on");
        assert_eq!(slot.state(), OperationState::Idle);

        let ticket = slot.begin().unwrap();
        assert_eq!(slot.state(), OperationState::Requested);
        ticket.start();
        assert_eq!(slot.state(), OperationState::InProgress);
        ticket.complete();
        assert_eq!(slot.state(), OperationState::Completed);

        // A finished operation may be started again.
        let ticket = slot.begin().unwrap();
        ticket.fail();
        assert_eq!(slot.state(), OperationState::Failed);
    }

    #[test]
    fn busy_slot_rejects_reentry() {
        let slot = OperationSlot::new("Scan");
        let ticket = slot.begin().unwrap();
        assert_eq!(slot.begin().unwrap_err(), SessionError::AlreadyInProgress("Scan"));

        ticket.start();
        assert_eq!(
            slot.begin().unwrap_err().to_string(),
            "Scan already in progress"
        );
    }

    #[test]
    fn dropped_ticket_counts_as_failure() {
        let slot = OperationSlot::new("Try-on");
        {
            let ticket = slot.begin().unwrap();
            ticket.start();
        }
        assert_eq!(slot.state(), OperationState::Failed);
        assert!(slot.begin().is_ok());
    }
}
