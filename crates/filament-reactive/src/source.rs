#![forbid(unsafe_code)]

//! Source sentries: the independent half of the invalidation graph.
//!
//! A [`Source`] marks a unit of mutable state. Reading it inside a
//! [`DependencyNode`](crate::DependencyNode) action records an edge;
//! [`changed`](Source::changed) marks every recorded dependent stale.
//! [`Tracked<T>`] couples a sentry with a value and suppresses notifications
//! for sets that compare equal.
//!
//! # Invariants
//!
//! 1. Reads outside any node update record nothing (no ambient edges).
//! 2. `Tracked::set` with a value equal to the current one is a complete
//!    no-op: no stored write, no notification.
//! 3. `changed` drains the dependent set; dependents re-attach on their
//!    next re-run.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::node::{NodeInner, Precedent, next_sentry_id, record_precedent_read};

struct SourceInner {
    id: u64,
    dependents: RefCell<Vec<Weak<NodeInner>>>,
}

impl Precedent for SourceInner {
    fn precedent_id(&self) -> u64 {
        self.id
    }

    fn attach_dependent(&self, node: &Rc<NodeInner>) {
        self.dependents.borrow_mut().push(Rc::downgrade(node));
    }

    fn detach_dependent(&self, node_id: u64) {
        self.dependents
            .borrow_mut()
            .retain(|d| d.upgrade().is_some_and(|d| d.precedent_id() != node_id));
    }
}

/// An independent sentry. Cheaply cloneable handle to shared edge state.
#[derive(Clone)]
pub struct Source {
    inner: Rc<SourceInner>,
}

impl Source {
    /// Create a sentry with no dependents.
    #[must_use]
    pub fn new() -> Self {
        Source {
            inner: Rc::new(SourceInner {
                id: next_sentry_id(),
                dependents: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Stable id of this sentry.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Record a read. If a node is currently updating, an edge from it to
    /// this sentry is recorded; otherwise this is a no-op.
    pub fn record_read(&self) {
        let prec: Rc<dyn Precedent> = Rc::clone(&self.inner) as Rc<dyn Precedent>;
        record_precedent_read(&prec);
    }

    /// Mark every dependent stale and drain the dependent set.
    pub fn changed(&self) {
        let dependents = self.inner.dependents.take();
        if !dependents.is_empty() {
            tracing::trace!(source = self.inner.id, dependents = dependents.len(), "source changed");
        }
        for dep in dependents {
            if let Some(dep) = dep.upgrade() {
                NodeInner::mark_stale(&dep, true);
            }
        }
    }

    /// Whether any live node currently depends on this sentry.
    #[must_use]
    pub fn has_dependents(&self) -> bool {
        self.inner
            .dependents
            .borrow()
            .iter()
            .any(|d| d.upgrade().is_some())
    }
}

impl Default for Source {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Source")
            .field("id", &self.inner.id)
            .field("dependents", &self.inner.dependents.borrow().len())
            .finish()
    }
}

/// A value guarded by a [`Source`].
///
/// Cloning a `Tracked` creates a new handle to the **same** value and
/// sentry, so domain objects and their mutators can share state.
pub struct Tracked<T> {
    source: Source,
    value: Rc<RefCell<T>>,
}

impl<T> Clone for Tracked<T> {
    fn clone(&self) -> Self {
        Tracked {
            source: self.source.clone(),
            value: Rc::clone(&self.value),
        }
    }
}

impl<T> Tracked<T> {
    /// Wrap `value` behind a fresh sentry.
    pub fn new(value: T) -> Self {
        Tracked {
            source: Source::new(),
            value: Rc::new(RefCell::new(value)),
        }
    }

    /// Read the value, recording the read.
    #[must_use]
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.source.record_read();
        self.value.borrow().clone()
    }

    /// Access the value by reference, recording the read.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.source.record_read();
        f(&self.value.borrow())
    }

    /// The underlying sentry.
    #[must_use]
    pub fn source(&self) -> &Source {
        &self.source
    }
}

impl<T: PartialEq> Tracked<T> {
    /// Store `value` and notify dependents, unless it equals the current
    /// value, in which case nothing happens at all.
    pub fn set(&self, value: T) {
        if *self.value.borrow() == value {
            return;
        }
        *self.value.borrow_mut() = value;
        self.source.changed();
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Tracked<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracked")
            .field("value", &*self.value.borrow())
            .field("source", &self.source.id())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
