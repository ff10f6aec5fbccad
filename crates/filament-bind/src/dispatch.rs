#![forbid(unsafe_code)]

//! The dispatch shim: routing actions onto the owning thread.
//!
//! Dependency invalidations may originate on background threads, but
//! everything that mutates proxy state must run on the thread that owns the
//! proxies. [`DispatchContext`] is that boundary. It is an explicit handle
//! passed at construction, never an ambient singleton, so the single-owner
//! invariant is enforceable and testable.
//!
//! Two modes:
//!
//! - **Test mode**: [`run_later`](DispatchContext::run_later) executes the
//!   action synchronously in place, making unit tests deterministic.
//! - **UI mode**: `run_later` appends to a FIFO queue owned by the
//!   constructing thread; the owner's loop calls
//!   [`pump`](DispatchContext::pump) to drain it.
//!
//! The off-thread lane is deliberately narrow: background threads hold a
//! [`RemoteDispatch`] and post opaque [`WakeToken`]s; `pump` maps each token
//! to a waker closure registered on the owning thread. Closures themselves
//! never cross threads.
//!
//! # Guarantees
//!
//! 1. Every queued action executes at most once.
//! 2. Per lane, execution order matches submission order (FIFO). A pump
//!    drains remote tokens before local actions.
//! 3. In UI mode, `run_later` never executes the action before returning.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::sync::{Arc, Mutex};

/// Opaque handle naming one registered waker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WakeToken(u64);

struct RemoteQueue {
    tokens: Mutex<VecDeque<WakeToken>>,
}

/// `Send + Sync` handle for posting wake tokens from background threads.
#[derive(Clone)]
pub struct RemoteDispatch {
    queue: Arc<RemoteQueue>,
}

impl RemoteDispatch {
    /// Post a wake token. Fire-and-forget; the owning thread's next
    /// [`DispatchContext::pump`] delivers it.
    pub fn post(&self, token: WakeToken) {
        let mut tokens = self
            .queue
            .tokens
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        tokens.push_back(token);
    }
}

impl std::fmt::Debug for RemoteDispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteDispatch").finish_non_exhaustive()
    }
}

struct DispatchInner {
    test_mode: bool,
    local: RefCell<VecDeque<Box<dyn FnOnce()>>>,
    remote: Arc<RemoteQueue>,
    wakers: RefCell<HashMap<WakeToken, Rc<dyn Fn()>>>,
    next_token: Cell<u64>,
}

/// Execution-context handle for one owning thread.
///
/// Cheaply cloneable; all clones share the same queues.
#[derive(Clone)]
pub struct DispatchContext {
    inner: Rc<DispatchInner>,
}

impl DispatchContext {
    fn with_mode(test_mode: bool) -> Self {
        DispatchContext {
            inner: Rc::new(DispatchInner {
                test_mode,
                local: RefCell::new(VecDeque::new()),
                remote: Arc::new(RemoteQueue {
                    tokens: Mutex::new(VecDeque::new()),
                }),
                wakers: RefCell::new(HashMap::new()),
                next_token: Cell::new(1),
            }),
        }
    }

    /// Deterministic harness mode: deferred actions run in place.
    #[must_use]
    pub fn test_mode() -> Self {
        Self::with_mode(true)
    }

    /// Production mode: deferred actions queue until [`pump`](Self::pump).
    #[must_use]
    pub fn ui_mode() -> Self {
        Self::with_mode(false)
    }

    #[must_use]
    pub fn is_test_mode(&self) -> bool {
        self.inner.test_mode
    }

    /// Execute `action` immediately on the calling thread.
    pub fn run_now(&self, action: impl FnOnce()) {
        action();
    }

    /// Schedule `action`. Synchronous in test mode, queued FIFO otherwise.
    pub fn run_later(&self, action: impl FnOnce() + 'static) {
        if self.inner.test_mode {
            action();
        } else {
            self.inner.local.borrow_mut().push_back(Box::new(action));
        }
    }

    /// Register a waker for remote wake tokens.
    ///
    /// The waker runs on the owning thread during [`pump`](Self::pump)
    /// whenever its token was posted.
    pub fn register_waker(&self, waker: impl Fn() + 'static) -> WakeToken {
        let token = WakeToken(self.inner.next_token.get());
        self.inner.next_token.set(token.0 + 1);
        self.inner.wakers.borrow_mut().insert(token, Rc::new(waker));
        token
    }

    /// Remove a waker. Tokens posted after removal are dropped silently.
    pub fn unregister_waker(&self, token: WakeToken) {
        self.inner.wakers.borrow_mut().remove(&token);
    }

    /// The off-thread lane for this context.
    #[must_use]
    pub fn remote_handle(&self) -> RemoteDispatch {
        RemoteDispatch {
            queue: Arc::clone(&self.inner.remote),
        }
    }

    /// Drain both lanes: remote wake tokens first, then the local FIFO.
    ///
    /// Returns the number of actions and wakers executed. Actions scheduled
    /// while pumping are drained in the same call, so an action that
    /// perpetually reschedules itself will spin; callers own that policy.
    pub fn pump(&self) -> usize {
        let mut executed = 0usize;
        loop {
            let token = {
                let mut tokens = self
                    .inner
                    .remote
                    .tokens
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                tokens.pop_front()
            };
            let Some(token) = token else { break };
            let waker = self.inner.wakers.borrow().get(&token).cloned();
            if let Some(waker) = waker {
                waker();
                executed += 1;
            } else {
                tracing::trace!(?token, "wake token with no registered waker dropped");
            }
        }
        loop {
            let action = self.inner.local.borrow_mut().pop_front();
            let Some(action) = action else { break };
            action();
            executed += 1;
        }
        executed
    }

    /// Number of locally queued actions (diagnostics).
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.local.borrow().len()
    }
}

impl std::fmt::Debug for DispatchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchContext")
            .field("test_mode", &self.inner.test_mode)
            .field("pending", &self.inner.local.borrow().len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
