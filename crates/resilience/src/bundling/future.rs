// crates/resilience/src/bundling/future.rs
//! Single-assignment, waitable, cancellable result cell

use crate::error::CallResult;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Action that withdraws a pending request from its bundle
pub trait Cancel: Send + Sync {
    /// Returns true if the request was found and withdrawn
    fn cancel(&self) -> bool;
}

/// Result of a bundled request, delivered when its bundle is sent
///
/// The result is assigned at most once. A successful [`cancel`] leaves the
/// future unset for good; waiters are released and see `false`.
///
/// [`cancel`]: ResultFuture::cancel
pub struct ResultFuture<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    slot: Mutex<Slot<T>>,
    ready: Condvar,
    canceller: Option<Box<dyn Cancel>>,
}

struct Slot<T> {
    result: Option<CallResult<T>>,
    cancelled: bool,
}

impl<T> ResultFuture<T> {
    /// Creates a future that cannot be cancelled
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Creates a future withdrawn by `canceller`
    pub fn with_canceller(canceller: Box<dyn Cancel>) -> Self {
        Self::build(Some(canceller))
    }

    fn build(canceller: Option<Box<dyn Cancel>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                slot: Mutex::new(Slot {
                    result: None,
                    cancelled: false,
                }),
                ready: Condvar::new(),
                canceller,
            }),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Slot<T>> {
        self.inner.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// True once a result has been assigned
    pub fn is_set(&self) -> bool {
        self.slot().result.is_some()
    }

    /// True if the request was withdrawn from its bundle
    pub fn is_cancelled(&self) -> bool {
        self.slot().cancelled
    }

    /// Assigns the result; returns false if already set or cancelled
    pub fn set_result(&self, result: CallResult<T>) -> bool {
        let mut slot = self.slot();
        if slot.result.is_some() || slot.cancelled {
            return false;
        }
        slot.result = Some(result);
        drop(slot);
        self.inner.ready.notify_all();
        true
    }

    /// Blocks until the result is set, the future is cancelled, or
    /// `timeout` elapses; returns whether the result is set
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let slot = self.slot();
        let pending = |s: &mut Slot<T>| s.result.is_none() && !s.cancelled;
        let slot = match timeout {
            None => self
                .inner
                .ready
                .wait_while(slot, pending)
                .unwrap_or_else(PoisonError::into_inner),
            Some(timeout) => {
                self.inner
                    .ready
                    .wait_timeout_while(slot, timeout, pending)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
        };
        slot.result.is_some()
    }

    /// Withdraws the request from its bundle
    ///
    /// Returns false if the result is already set, the request was already
    /// withdrawn, or its bundle is being sent.
    pub fn cancel(&self) -> bool {
        if self.is_set() {
            return false;
        }
        let Some(canceller) = &self.inner.canceller else {
            return false;
        };
        if !canceller.cancel() {
            return false;
        }
        let mut slot = self.slot();
        slot.cancelled = true;
        drop(slot);
        self.inner.ready.notify_all();
        true
    }
}

impl<T: Clone> ResultFuture<T> {
    /// Returns a copy of the result, if set
    pub fn result(&self) -> Option<CallResult<T>> {
        self.slot().result.clone()
    }

    /// Waits like [`wait`](Self::wait) and returns the result, if set
    pub fn wait_result(&self, timeout: Option<Duration>) -> Option<CallResult<T>> {
        if self.wait(timeout) {
            self.result()
        } else {
            None
        }
    }
}

impl<T> Clone for ResultFuture<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for ResultFuture<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for ResultFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.slot();
        f.debug_struct("ResultFuture")
            .field("set", &slot.result.is_some())
            .field("cancelled", &slot.cancelled)
            .finish()
    }
}
