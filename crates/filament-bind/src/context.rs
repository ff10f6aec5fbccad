#![forbid(unsafe_code)]

//! The tracking context: the shared session handle proxies are born into.
//!
//! One context per binding session (typically per UI surface). Many proxies
//! share it and it outlives any single proxy. It carries the
//! [`DispatchContext`] so deferred work always reaches the owning thread,
//! and hands out session-unique proxy ids for diagnostics.

use std::cell::Cell;
use std::rc::Rc;

use crate::dispatch::DispatchContext;

/// Shared handle to one tracking session.
pub struct TrackingContext {
    dispatch: DispatchContext,
    next_proxy_id: Cell<u64>,
}

impl TrackingContext {
    /// Create a session around an explicit execution context.
    #[must_use]
    pub fn new(dispatch: DispatchContext) -> Rc<Self> {
        Rc::new(TrackingContext {
            dispatch,
            next_proxy_id: Cell::new(1),
        })
    }

    /// Convenience constructor for deterministic tests.
    #[must_use]
    pub fn for_tests() -> Rc<Self> {
        Self::new(DispatchContext::test_mode())
    }

    /// The session's execution context.
    #[must_use]
    pub fn dispatch(&self) -> &DispatchContext {
        &self.dispatch
    }

    /// Route `action` per the session's mode: synchronously in place under
    /// a test harness, otherwise queued onto the owning thread's FIFO.
    ///
    /// Fire-and-forget: in the queued path there is no guarantee the action
    /// has run when this returns.
    pub fn defer(&self, action: impl FnOnce() + 'static) {
        if self.dispatch.is_test_mode() {
            self.dispatch.run_now(action);
        } else {
            self.dispatch.run_later(action);
        }
    }

    pub(crate) fn next_proxy_id(&self) -> u64 {
        let id = self.next_proxy_id.get();
        self.next_proxy_id.set(id + 1);
        id
    }
}

impl std::fmt::Debug for TrackingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackingContext")
            .field("dispatch", &self.dispatch)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
