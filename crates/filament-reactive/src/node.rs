#![forbid(unsafe_code)]

//! Dependency nodes: the dependent half of the invalidation graph.
//!
//! A [`DependencyNode`] owns a re-run action and a set of edges to the
//! precedents (sources or other nodes) that action read during its last
//! execution. When any precedent changes, the node transitions to stale,
//! severs its edges, and fires its invalidation hook exactly once. The next
//! [`record_read`](DependencyNode::record_read) re-runs the action in place,
//! rebuilding the edge set from scratch.
//!
//! # Invariants
//!
//! 1. The re-run action executes at most once per staleness episode, and it
//!    observes precedent state as of execution time, not invalidation time.
//! 2. Edges are discarded before every re-run and re-recorded by whatever
//!    the action actually reads. Edges are never carried across re-runs.
//! 3. The invalidation hook fires at most once per staleness episode.
//!    Repeated invalidations while already stale are absorbed silently.
//! 4. A disposed node never re-runs its action and never fires its hook.
//!    Disposal is idempotent.
//!
//! # Edge recording
//!
//! While a node's action runs, the node sits on a thread-local update stack.
//! Every precedent read during that window attaches the updating node as a
//! dependent and is remembered on the node's precedent list so the edge can
//! be severed later. Nodes are themselves precedents: reading a node from
//! inside another node's action chains staleness upward.
//!
//! # Failure modes
//!
//! - **Action panics**: a drop guard pops the update stack, severs any
//!   partially-recorded edges, and puts the node back to stale. The next
//!   `record_read` retries the action.
//! - **Disposing a node from inside its own action**: unsupported; the
//!   action storage is borrowed for the duration of the run.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::signal::InvalidationSignal;

static NEXT_SENTRY_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a graph-wide unique sentry id (shared by sources and nodes).
pub(crate) fn next_sentry_id() -> u64 {
    NEXT_SENTRY_ID.fetch_add(1, Ordering::Relaxed)
}

/// Anything a node can depend on: a source sentry or another node.
pub(crate) trait Precedent {
    fn precedent_id(&self) -> u64;
    fn attach_dependent(&self, node: &Rc<NodeInner>);
    fn detach_dependent(&self, node_id: u64);
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum NodeState {
    /// The action must re-run before the node's output can be trusted.
    Stale,
    /// The action is executing right now.
    Updating,
    /// Edges are intact and the output is current.
    UpToDate,
    /// Terminal. The node can never fire or re-run again.
    Disposed,
}

pub(crate) struct NodeInner {
    id: u64,
    state: Cell<NodeState>,
    /// Set when an invalidation arrives mid-update; folded in afterwards.
    restale: Cell<bool>,
    action: RefCell<Option<Box<dyn Fn()>>>,
    hook: RefCell<Option<Box<dyn Fn()>>>,
    /// Edges recorded during the last run, kept so they can be severed.
    precedents: RefCell<Vec<Rc<dyn Precedent>>>,
    /// Nodes whose actions read this node during their last run.
    dependents: RefCell<Vec<Weak<NodeInner>>>,
    /// Cross-thread stale latch, shared with [`InvalidationSignal`] handles.
    remote_stale: Arc<AtomicBool>,
}

thread_local! {
    static UPDATE_STACK: RefCell<Vec<Rc<NodeInner>>> = const { RefCell::new(Vec::new()) };
}

fn current_updating() -> Option<Rc<NodeInner>> {
    UPDATE_STACK.with(|stack| stack.borrow().last().cloned())
}

/// Pops the update stack even if the action unwinds. When the run did not
/// complete, the node goes back to stale with its partially-recorded edges
/// severed, so the next read retries the action.
struct UpdateGuard {
    node: Rc<NodeInner>,
    completed: bool,
}

impl UpdateGuard {
    fn push(node: Rc<NodeInner>) -> Self {
        UPDATE_STACK.with(|stack| stack.borrow_mut().push(Rc::clone(&node)));
        UpdateGuard {
            node,
            completed: false,
        }
    }

    fn complete(mut self) {
        self.completed = true;
    }
}

impl Drop for UpdateGuard {
    fn drop(&mut self) {
        UPDATE_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
        if !self.completed {
            self.node.sever_precedents();
            self.node.state.set(NodeState::Stale);
        }
    }
}

/// Record `prec` as a precedent of the currently-updating node, if any.
///
/// Deduplicates by sentry id so a precedent read twice in one run yields a
/// single edge.
pub(crate) fn record_precedent_read(prec: &Rc<dyn Precedent>) {
    let Some(current) = current_updating() else {
        return;
    };
    if current.id == prec.precedent_id() {
        return;
    }
    let already = current
        .precedents
        .borrow()
        .iter()
        .any(|p| p.precedent_id() == prec.precedent_id());
    if already {
        return;
    }
    prec.attach_dependent(&current);
    current.precedents.borrow_mut().push(Rc::clone(prec));
}

impl NodeInner {
    fn sever_precedents(&self) {
        let precedents = self.precedents.take();
        for p in &precedents {
            p.detach_dependent(self.id);
        }
    }

    fn fire_hook(&self) {
        if let Some(hook) = self.hook.borrow().as_ref() {
            hook();
        }
    }

    /// Transition to stale, propagating to dependents.
    ///
    /// `fire_hook` is false on the remote-absorb path, where the wake was
    /// already delivered through the signal's own callback.
    pub(crate) fn mark_stale(node: &Rc<NodeInner>, fire_hook: bool) {
        match node.state.get() {
            NodeState::Disposed | NodeState::Stale => {}
            NodeState::Updating => {
                node.restale.set(true);
            }
            NodeState::UpToDate => {
                tracing::trace!(node = node.id, "node stale");
                node.state.set(NodeState::Stale);
                node.sever_precedents();
                let dependents = node.dependents.take();
                for dep in dependents {
                    if let Some(dep) = dep.upgrade() {
                        NodeInner::mark_stale(&dep, true);
                    }
                }
                if fire_hook {
                    node.fire_hook();
                }
            }
        }
    }

    /// Fold the cross-thread latch into the node's stale flag.
    fn absorb_remote(node: &Rc<NodeInner>) {
        if node.remote_stale.swap(false, Ordering::AcqRel) {
            NodeInner::mark_stale(node, false);
        }
    }

    /// Re-run the action, rebuilding the edge set.
    fn update(node: &Rc<NodeInner>) {
        if node.state.get() != NodeState::Stale {
            return;
        }
        node.sever_precedents();
        node.state.set(NodeState::Updating);
        node.restale.set(false);
        let guard = UpdateGuard::push(Rc::clone(node));
        if let Some(action) = node.action.borrow().as_ref() {
            action();
        }
        guard.complete();
        node.state.set(NodeState::UpToDate);
        if node.restale.take() {
            // A precedent changed while we were running. The episode starts
            // over so the next read observes the newer state.
            NodeInner::mark_stale(node, true);
        }
    }
}

impl Precedent for NodeInner {
    fn precedent_id(&self) -> u64 {
        self.id
    }

    fn attach_dependent(&self, node: &Rc<NodeInner>) {
        let mut dependents = self.dependents.borrow_mut();
        if !dependents
            .iter()
            .any(|d| d.upgrade().is_some_and(|d| d.id == node.id))
        {
            dependents.push(Rc::downgrade(node));
        }
    }

    fn detach_dependent(&self, node_id: u64) {
        self.dependents
            .borrow_mut()
            .retain(|d| d.upgrade().is_some_and(|d| d.id != node_id));
    }
}

/// A dependent unit of the invalidation graph.
///
/// Owns a re-run action; tracks what the action reads; goes stale when any
/// of it changes. Exclusively owned by whoever constructs it; the graph only
/// ever holds weak back-references.
pub struct DependencyNode {
    inner: Rc<NodeInner>,
}

impl DependencyNode {
    /// Create a node around `action`. The node starts stale, so the first
    /// [`record_read`](Self::record_read) runs the action.
    pub fn new(action: impl Fn() + 'static) -> Self {
        let inner = Rc::new(NodeInner {
            id: next_sentry_id(),
            state: Cell::new(NodeState::Stale),
            restale: Cell::new(false),
            action: RefCell::new(Some(Box::new(action))),
            hook: RefCell::new(None),
            precedents: RefCell::new(Vec::new()),
            dependents: RefCell::new(Vec::new()),
            remote_stale: Arc::new(AtomicBool::new(false)),
        });
        tracing::trace!(node = inner.id, "node created");
        DependencyNode { inner }
    }

    /// Stable id of this node, unique per thread of construction.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Record a read of this node.
    ///
    /// If the node is stale the action re-runs synchronously in place before
    /// this returns. If another node is currently updating, an edge from it
    /// to this node is recorded. Reads of a disposed node are no-ops.
    pub fn record_read(&self) {
        NodeInner::absorb_remote(&self.inner);
        if self.inner.state.get() == NodeState::Disposed {
            return;
        }
        if self.inner.state.get() == NodeState::Stale {
            NodeInner::update(&self.inner);
        }
        let prec: Rc<dyn Precedent> = Rc::clone(&self.inner) as Rc<dyn Precedent>;
        record_precedent_read(&prec);
    }

    /// Mark the node stale from the owning thread, firing the invalidation
    /// hook if this starts a new staleness episode.
    pub fn mark_stale(&self) {
        NodeInner::mark_stale(&self.inner, true);
    }

    /// Whether the node is currently stale (remote latch not folded in).
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.inner.state.get() == NodeState::Stale
    }

    /// Whether [`dispose`](Self::dispose) has run.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.state.get() == NodeState::Disposed
    }

    /// Install the invalidation hook, replacing any previous one.
    ///
    /// The hook fires on the owning thread when the node transitions from
    /// up-to-date to stale, at most once per staleness episode. No-op on a
    /// disposed node.
    pub fn set_invalidation_hook(&self, hook: impl Fn() + 'static) {
        if self.inner.state.get() == NodeState::Disposed {
            return;
        }
        *self.inner.hook.borrow_mut() = Some(Box::new(hook));
    }

    /// Create a cross-thread invalidation handle for this node.
    ///
    /// `wake` fires (on the signalling thread) at most once per staleness
    /// episode; the owning thread folds the latch in on its next
    /// [`record_read`](Self::record_read) or
    /// [`absorb_remote_stale`](Self::absorb_remote_stale).
    pub fn remote_signal(&self, wake: impl Fn() + Send + Sync + 'static) -> InvalidationSignal {
        InvalidationSignal::new(Arc::clone(&self.inner.remote_stale), Arc::new(wake))
    }

    /// Fold any pending cross-thread invalidation into the stale flag
    /// without firing the same-thread hook.
    pub fn absorb_remote_stale(&self) {
        NodeInner::absorb_remote(&self.inner);
    }

    /// Detach the node from the graph permanently.
    ///
    /// Severs every edge in both directions and drops the action and hook.
    /// After this, `record_read` and `mark_stale` are no-ops. Idempotent.
    pub fn dispose(&self) {
        if self.inner.state.get() == NodeState::Disposed {
            return;
        }
        tracing::trace!(node = self.inner.id, "node disposed");
        self.inner.sever_precedents();
        self.inner.dependents.take();
        self.inner.state.set(NodeState::Disposed);
        self.inner.action.borrow_mut().take();
        self.inner.hook.borrow_mut().take();
    }
}

impl std::fmt::Debug for DependencyNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyNode")
            .field("id", &self.inner.id)
            .field("state", &self.inner.state.get())
            .field("precedents", &self.inner.precedents.borrow().len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
