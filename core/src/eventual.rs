//! Cross-thread handle to a result produced on the reactor.
//!
//! # Design
//! The outcome lives in a mutex-guarded slot with a condition variable. The
//! reactor side holds a [`Resolver`] and writes the slot at most once; the
//! first write wins and every later one is ignored. Caller threads block in
//! [`Eventual::wait`] on the condition variable, optionally with a deadline,
//! and read the recorded outcome by cloning it, so the same result can be
//! retrieved again after a wait that timed out. A resolver dropped without
//! writing, for instance when its task is discarded with the runtime, records
//! [`FetchError::TaskFailed`] so no waiter blocks forever.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::FetchError;
use crate::response::Response;

/// Eventual result of a fetch.
pub type EventualResponse = Eventual<Response>;

struct Slot<T> {
    outcome: Mutex<Option<Result<T, FetchError>>>,
    resolved: Condvar,
}

/// Caller-side handle: pending until the reactor records an outcome.
pub struct Eventual<T> {
    slot: Arc<Slot<T>>,
}

/// Reactor-side write end of an [`Eventual`].
pub(crate) struct Resolver<T> {
    slot: Arc<Slot<T>>,
}

impl<T> Eventual<T> {
    pub(crate) fn new() -> (Self, Resolver<T>) {
        let slot = Arc::new(Slot {
            outcome: Mutex::new(None),
            resolved: Condvar::new(),
        });
        (
            Self {
                slot: Arc::clone(&slot),
            },
            Resolver { slot },
        )
    }

    /// Whether an outcome, success or failure, has been recorded.
    pub fn is_resolved(&self) -> bool {
        self.slot.outcome.lock().is_some()
    }

    /// The recorded failure, if the operation has already failed. Never blocks
    /// on the operation itself.
    pub fn peek_error(&self) -> Option<FetchError> {
        match self.slot.outcome.lock().as_ref() {
            Some(Err(err)) => Some(err.clone()),
            _ => None,
        }
    }
}

impl<T: Clone> Eventual<T> {
    /// Block until the outcome is recorded and return it.
    ///
    /// With `timeout`, gives up after that long with
    /// [`FetchError::WaitTimeout`]. Giving up leaves the operation running;
    /// a later `wait` can still observe its result.
    pub fn wait(&self, timeout: Option<Duration>) -> Result<T, FetchError> {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let mut outcome = self.slot.outcome.lock();
        loop {
            if let Some(recorded) = outcome.as_ref() {
                return recorded.clone();
            }
            match (deadline, timeout) {
                (Some(deadline), Some(waited)) => {
                    if self.slot.resolved.wait_until(&mut outcome, deadline).timed_out()
                        && outcome.is_none()
                    {
                        return Err(FetchError::WaitTimeout { waited });
                    }
                }
                _ => self.slot.resolved.wait(&mut outcome),
            }
        }
    }
}

impl<T> std::fmt::Debug for Eventual<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Eventual")
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

impl<T> Resolver<T> {
    /// Record `outcome` unless one is already there. Returns whether this call won.
    pub(crate) fn resolve(&self, outcome: Result<T, FetchError>) -> bool {
        let mut slot = self.slot.outcome.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(outcome);
        drop(slot);
        self.slot.resolved.notify_all();
        true
    }
}

impl<T> Drop for Resolver<T> {
    fn drop(&mut self) {
        if self.resolve(Err(FetchError::TaskFailed(
            "fetch task was dropped before completing".to_string(),
        ))) {
            tracing::warn!("result slot abandoned without an outcome");
        }
    }
}
